//! Compiler configuration loaded from JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::shader_map::key::{ShaderMapKey, StaticSwitchSet};
use crate::shader_map::MaterialId;
use crate::types::{Platform, Quality};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub platform: Platform,
    pub quality: Quality,
    pub static_switches: StaticSwitchSet,
    /// Material graph substituted for materials that fail to compile. The bundled default
    /// material is used when unset.
    pub fallback_material: Option<PathBuf>,
    pub backend_workers: usize,
    pub compile_timeout_ms: u64,
    /// Run naga over emitted WGSL before it is written out.
    pub validate_output: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Desktop,
            quality: Quality::High,
            static_switches: StaticSwitchSet::new(),
            fallback_material: None,
            backend_workers: 2,
            compile_timeout_ms: 30_000,
            validate_output: true,
        }
    }
}

impl CompilerConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse config json")
    }

    pub fn key_for(&self, material_id: MaterialId) -> ShaderMapKey {
        ShaderMapKey::new(material_id)
            .with_switches(self.static_switches.clone())
            .with_platform(self.platform)
            .with_quality(self.quality)
    }

    pub fn compile_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.compile_timeout_ms)
    }
}
