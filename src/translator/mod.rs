//! Material translator: the compiler interface nodes call into, the intermediate chunk table and
//! WGSL emission.

pub mod chunk;
pub mod coercion;
pub mod compiler;
pub mod template;
pub mod utils;
pub mod wgsl;

pub use chunk::{ChunkFlags, ChunkId, ChunkTable, CodeChunk};
pub use compiler::{
    Code, Compilable, ExpressionKey, FunctionCallSite, FunctionCompileState, MaterialCompiler,
    MaterialSource, TranslationContext,
};
pub use wgsl::{TranslationOutput, WgslTranslator, resolve_arithmetic};
