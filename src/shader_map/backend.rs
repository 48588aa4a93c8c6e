//! The external bytecode compiler the cache submits generated shader text to.

use std::collections::BTreeMap;

use log::debug;

use super::key::ShaderMapKey;
use crate::error::BackendError;
use crate::types::ShaderFrequency;

/// Generated shader text for one key, handed to a [`ShaderBackend`].
#[derive(Clone, Debug)]
pub struct CompileJob {
    pub key: ShaderMapKey,
    pub friendly_name: String,
    pub shader_text: String,
}

/// Bytecode per shader stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledStages(BTreeMap<ShaderFrequency, Vec<u8>>);

impl CompiledStages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(stages: BTreeMap<ShaderFrequency, Vec<u8>>) -> Self {
        Self(stages)
    }

    pub fn insert(&mut self, stage: ShaderFrequency, bytecode: Vec<u8>) {
        self.0.insert(stage, bytecode);
    }

    pub fn get(&self, stage: ShaderFrequency) -> Option<&[u8]> {
        self.0.get(&stage).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ShaderFrequency, &Vec<u8>)> {
        self.0.iter()
    }
}

pub trait ShaderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn compile(&self, job: &CompileJob) -> Result<CompiledStages, BackendError>;
}

/// Entry points every generated material shader declares.
const ENTRY_POINTS: [(ShaderFrequency, naga::ShaderStage, &str); 2] = [
    (ShaderFrequency::Vertex, naga::ShaderStage::Vertex, "vs_main"),
    (ShaderFrequency::Pixel, naga::ShaderStage::Fragment, "fs_main"),
];

/// Parses and validates WGSL with naga, then writes SPIR-V for each entry point.
#[derive(Debug, Default, Clone, Copy)]
pub struct NagaBackend;

impl NagaBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ShaderBackend for NagaBackend {
    fn name(&self) -> &str {
        "naga-spirv"
    }

    fn compile(&self, job: &CompileJob) -> Result<CompiledStages, BackendError> {
        let source = job.shader_text.as_str();
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| BackendError::new(format!("WGSL parse error: {}", e.emit_to_string(source))))?;

        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&module)
        .map_err(|e| BackendError::new(format!("Validation error: {}", e.emit_to_string(source))))?;

        let options = naga::back::spv::Options::default();
        let mut stages = CompiledStages::new();
        for (frequency, stage, entry_point) in ENTRY_POINTS {
            if !module
                .entry_points
                .iter()
                .any(|ep| ep.name == entry_point && ep.stage == stage)
            {
                return Err(BackendError::new(format!(
                    "Entry point '{entry_point}' not found for stage {stage:?}"
                )));
            }
            let pipeline_options = naga::back::spv::PipelineOptions {
                shader_stage: stage,
                entry_point: entry_point.to_string(),
            };
            let words = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
                .map_err(|e| BackendError::new(format!("SPIR-V generation error: {e}")))?;
            stages.insert(frequency, bytemuck::cast_slice::<u32, u8>(&words).to_vec());
        }

        debug!(
            "Compiled '{}' ({}) to {} SPIR-V stage(s)",
            job.friendly_name,
            job.key.summary(),
            stages.len()
        );
        Ok(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader_map::key::MaterialId;

    const SPIRV_MAGIC: [u8; 4] = 0x0723_0203_u32.to_ne_bytes();

    fn job(shader_text: &str) -> CompileJob {
        CompileJob {
            key: ShaderMapKey::new(MaterialId(1)),
            friendly_name: "Test".to_string(),
            shader_text: shader_text.to_string(),
        }
    }

    #[test]
    fn compiles_both_entry_points() {
        let source = r#"
@vertex
fn vs_main(@location(0) position: vec3f) -> @builtin(position) vec4f {
    return vec4f(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4f {
    return vec4f(1.0, 0.0, 0.0, 1.0);
}
"#;
        let stages = NagaBackend::new().compile(&job(source)).unwrap();
        assert_eq!(stages.len(), 2);
        let pixel = stages.get(ShaderFrequency::Pixel).unwrap();
        assert_eq!(pixel[..4], SPIRV_MAGIC);
        assert_eq!(pixel.len() % 4, 0);
    }

    #[test]
    fn missing_entry_point_is_a_backend_error() {
        let source = "@fragment\nfn fs_main() -> @location(0) vec4f {\n    return vec4f(1.0);\n}\n";
        let err = NagaBackend::new().compile(&job(source)).unwrap_err();
        assert!(err.message.contains("vs_main"), "{}", err.message);
    }

    #[test]
    fn parse_errors_surface_as_backend_errors() {
        let err = NagaBackend::new().compile(&job("fn broken(")).unwrap_err();
        assert!(err.message.starts_with("WGSL parse error"));
    }
}
