//! Uniform expressions and the per-stage sets a compiled shader map binds at draw time.

pub mod context;
pub mod expression;
pub mod set;

pub use context::{NoOverrides, ParameterOverrides, ParameterSource, RenderContext};
pub use expression::{FoldedOp, UniformExprRef, UniformExpression};
pub use set::{StageUniformExpressions, StageUniformValues, UniformExpressionSet, UniformValues};
