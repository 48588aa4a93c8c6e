//! Shader map compilation and caching.

pub mod artifact;
pub mod backend;
pub mod cache;
pub mod key;
pub mod queue;

pub use artifact::{ShaderMap, ShaderMapEntry, StaleReason, staleness};
pub use backend::{CompileJob, CompiledStages, NagaBackend, ShaderBackend};
pub use cache::ShaderMapCache;
pub use key::{MaterialId, ShaderMapKey, StaticSwitchSet, StaticSwitchValue};
pub use queue::{CompileQueue, PendingCompile};
