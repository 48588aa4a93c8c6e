//! Error taxonomy for translation, backend compilation and the shader map cache.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ShaderFrequency;

/// Errors recorded while translating a material graph. These never abort the pass.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TranslationError {
    #[error("{0}")]
    TypeMismatch(String),

    #[error("{0}")]
    CyclicReference(String),

    #[error("{operation} is not supported in the {stage} shader stage")]
    UnsupportedInStage {
        operation: String,
        stage: ShaderFrequency,
    },

    #[error("{0}")]
    InvalidGraph(String),
}

impl TranslationError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        TranslationError::TypeMismatch(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        TranslationError::InvalidGraph(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TranslationError::TypeMismatch(_) => "type mismatch",
            TranslationError::CyclicReference(_) => "cyclic reference",
            TranslationError::UnsupportedInStage { .. } => "unsupported in stage",
            TranslationError::InvalidGraph(_) => "invalid graph",
        }
    }
}

/// One translation problem, attributed to the node that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub error: TranslationError,
    pub offending_node_class: Option<String>,
    pub offending_node_id: Option<String>,
    /// Outermost function call site when the error was raised inside an inlined function.
    pub function_context: Option<String>,
}

impl Diagnostic {
    pub fn message(&self) -> String {
        match &self.function_context {
            Some(function) => format!("{function}: {}", self.error),
            None => self.error.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())?;
        if let (Some(class), Some(id)) = (&self.offending_node_class, &self.offending_node_id) {
            write!(f, " [{class} '{id}']")?;
        }
        Ok(())
    }
}

/// Failure reported by the external bytecode compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ShaderMapError {
    #[error("material '{material}' failed to translate with {} error(s)", .diagnostics.len())]
    Translation {
        material: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("backend compile of material '{material}' failed: {source}")]
    Backend {
        material: String,
        #[source]
        source: BackendError,
    },

    /// The default material failed to compile. There is nothing left to substitute.
    #[error("fallback material '{material}' failed to compile: {reason}")]
    FallbackMaterialFailed {
        material: String,
        reason: Box<ShaderMapError>,
    },

    #[error("shader map compile was cancelled before it started")]
    Cancelled,

    #[error("timed out waiting for shader map compile")]
    TimedOut,
}

impl ShaderMapError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShaderMapError::FallbackMaterialFailed { .. })
    }

    /// Translation diagnostics carried by this error, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            ShaderMapError::Translation { diagnostics, .. } => diagnostics,
            ShaderMapError::FallbackMaterialFailed { reason, .. } => reason.diagnostics(),
            _ => &[],
        }
    }
}
