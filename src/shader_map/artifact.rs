//! Compiled shader maps and their persisted form.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use super::backend::CompiledStages;
use super::key::ShaderMapKey;
use crate::types::ShaderFrequency;
use crate::uniform::UniformExpressionSet;

/// Bytecode for every compiled stage plus the uniform expressions its bindings were laid out for.
#[derive(Clone, Debug)]
pub struct ShaderMap {
    pub key: ShaderMapKey,
    pub friendly_name: String,
    pub uniform_expression_set: UniformExpressionSet,
    pub compiled_stages: CompiledStages,
    /// Empty for maps imported from a persisted entry.
    pub shader_text: String,
    pub max_texture_dependency_length: u32,
    complete: bool,
}

impl ShaderMap {
    /// A map whose bytecode has been produced. Only complete maps are ever stored in the cache.
    pub fn complete(
        key: ShaderMapKey,
        friendly_name: impl Into<String>,
        uniform_expression_set: UniformExpressionSet,
        compiled_stages: CompiledStages,
        shader_text: String,
        max_texture_dependency_length: u32,
    ) -> Self {
        Self {
            key,
            friendly_name: friendly_name.into(),
            uniform_expression_set,
            compiled_stages,
            shader_text,
            max_texture_dependency_length,
            complete: true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete && !self.compiled_stages.is_empty()
    }

    pub fn to_entry(&self) -> ShaderMapEntry {
        ShaderMapEntry {
            key: self.key.clone(),
            friendly_name: self.friendly_name.clone(),
            uniform_expression_set: self.uniform_expression_set.clone(),
            compiled_stages: self
                .compiled_stages
                .iter()
                .map(|(stage, bytes)| (*stage, general_purpose::STANDARD.encode(bytes)))
                .collect(),
            is_complete: self.is_complete(),
        }
    }

    pub fn from_entry(entry: ShaderMapEntry) -> Result<Self> {
        let mut stages = BTreeMap::new();
        for (stage, blob) in entry.compiled_stages {
            let bytes = general_purpose::STANDARD
                .decode(blob.as_bytes())
                .with_context(|| format!("invalid base64 bytecode for {stage} stage"))?;
            stages.insert(stage, bytes);
        }
        Ok(Self {
            key: entry.key,
            friendly_name: entry.friendly_name,
            uniform_expression_set: entry.uniform_expression_set,
            compiled_stages: CompiledStages::from_map(stages),
            shader_text: String::new(),
            max_texture_dependency_length: 0,
            complete: entry.is_complete,
        })
    }
}

/// Persisted cache entry. Bytecode blobs are base64 strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShaderMapEntry {
    pub key: ShaderMapKey,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub uniform_expression_set: UniformExpressionSet,
    #[serde(default)]
    pub compiled_stages: BTreeMap<ShaderFrequency, String>,
    #[serde(default)]
    pub is_complete: bool,
}

/// Why a stored map's bindings cannot be trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    /// Written before uniform expressions were persisted.
    LegacyEmptySet,
    /// A fresh translation produced different uniform expressions.
    UniformSetMismatch,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::LegacyEmptySet => f.write_str("stored uniform expression set is empty"),
            StaleReason::UniformSetMismatch => {
                f.write_str("stored uniform expression set differs from a fresh translation")
            }
        }
    }
}

/// Compare a stored uniform expression set against a freshly translated one.
pub fn staleness(stored: &UniformExpressionSet, fresh: &UniformExpressionSet) -> Option<StaleReason> {
    if stored.is_empty() {
        Some(StaleReason::LegacyEmptySet)
    } else if stored != fresh {
        Some(StaleReason::UniformSetMismatch)
    } else {
        None
    }
}
