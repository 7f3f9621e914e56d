//! Plugin error types.

use thiserror::Error;

use crate::api::PluginRole;

/// Errors raised by the plugin repository, loader and plugin implementations.
#[derive(Error, Debug)]
pub enum Error {
    /// No plugin registered (or loadable) under this name.
    #[error("{role} plugin '{name}' not found")]
    NotFound { role: PluginRole, name: String },

    /// A shared object could not be loaded.
    #[error("Failed to load plugin from {path}: {message}")]
    LoadFailed { path: String, message: String },

    /// A located file is not a loadable plugin module.
    #[error("Invalid plugin binary: {message}")]
    InvalidBinary { message: String },

    /// A plugin rejected its command line arguments.
    #[error("Plugin '{plugin}': {message}")]
    InvalidArgument { plugin: String, message: String },

    /// A plugin failed at runtime.
    #[error("Plugin '{plugin}' error: {message}")]
    Plugin { plugin: String, message: String },

    /// IO error inside a plugin.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error.
    #[error(transparent)]
    Core(#[from] tspipe_core::Error),
}

impl Error {
    /// Create a plugin runtime error.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Check for a graceful end-of-stream condition rather than a failure.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Core(tspipe_core::Error::EndOfStream))
    }
}

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, Error>;
