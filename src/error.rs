use crate::frontend::ast::Span;
use thiserror::Error;

/// Failure raised while parsing or running unit code. Carries the already
/// rendered message plus the source span when one is known.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
    pub span: Option<Span>,
}

impl EvalError {
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    pub fn at(message: impl Into<String>, span: &Span) -> Self {
        Self::new(message, Some(span.clone()))
    }
}

/// Engine failure surface. Every variant is `Clone` so all single-flight
/// waiters can receive the same failure.
#[derive(Clone, Debug, Error)]
pub enum ComposeError {
    #[error("unit not found: {name}{}", .help.as_deref().unwrap_or(""))]
    UnitNotFound { name: String, help: Option<String> },

    #[error("invalid unit name: {name:?}")]
    InvalidName { name: String },

    #[error("read {path}: {message}")]
    Io { path: String, message: String },

    #[error("composing {mount}: {source}")]
    Execution {
        mount: String,
        #[source]
        source: EvalError,
    },

    #[error("mount {mount} already registered with {existing}, requested {requested}")]
    MountConflict {
        mount: String,
        existing: String,
        requested: String,
    },
}

impl ComposeError {
    /// Resolution failures never publish a registry record; execution
    /// failures do (and stay).
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            ComposeError::UnitNotFound { .. }
                | ComposeError::InvalidName { .. }
                | ComposeError::Io { .. }
        )
    }

    pub fn execution(mount: impl Into<String>, source: EvalError) -> Self {
        ComposeError::Execution {
            mount: mount.into(),
            source,
        }
    }
}
