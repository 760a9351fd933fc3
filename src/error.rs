use thiserror::Error;

use crate::modules::ModuleState;

/// Library errors using thiserror for structured error handling.
///
/// Runtime conditions (pool exhaustion, unknown definition id, missing clip)
/// are deliberately NOT errors: the services recover locally, log a
/// diagnostic and return `None`. Only programmer-usage violations in the
/// module lifecycle and environment failures (config I/O, backend setup)
/// surface as hard errors.

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("invalid lifecycle transition for module '{id}': cannot {action} while {from:?}")]
    InvalidTransition {
        id: String,
        from: ModuleState,
        action: &'static str,
    },

    #[error("unknown module: {0}")]
    UnknownModule(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to decode audio clip '{clip}'")]
    DecodeFailed {
        clip: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("No clip data registered for '{0}'")]
    UnknownClip(String),
}
