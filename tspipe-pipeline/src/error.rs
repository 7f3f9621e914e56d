//! Pipeline error types.

use thiserror::Error;

/// Pipeline error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid pipeline configuration.
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A plugin rejected its start call; nothing was processed.
    #[error("Plugin '{name}' failed to start: {source}")]
    StartFailed {
        name: String,
        #[source]
        source: tspipe_plugin::Error,
    },

    /// Plugin resolution or configuration error.
    #[error(transparent)]
    Plugin(#[from] tspipe_plugin::Error),

    /// A stage worker failed in a way it could not report itself.
    #[error("Stage '{name}' fatal error: {message}")]
    StageFatal { name: String, message: String },

    /// IO error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, PipelineError>;
