//! Material graph to WGSL translation with a shared shader map cache.

pub mod config;
pub mod dsl;
pub mod error;
pub mod material;
pub mod node_compiler;
pub mod schema;
pub mod shader_map;
pub mod translator;
pub mod types;
pub mod uniform;
pub mod validation;

pub use config::CompilerConfig;
pub use error::{BackendError, Diagnostic, ShaderMapError, TranslationError};
pub use material::Material;
pub use shader_map::{ShaderMap, ShaderMapCache, ShaderMapKey};
pub use translator::{TranslationOutput, WgslTranslator};
