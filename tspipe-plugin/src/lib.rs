//! # tspipe Plugin
//!
//! Plugin infrastructure for the tspipe transport stream toolkit.
//!
//! A pipeline is assembled from three plugin roles (one input, any number of
//! packet processors, one output) resolved by name through the
//! [`PluginRepository`]. Plugins are registered explicitly (built-ins and
//! embedders) or loaded from shared objects following the `tsplugin_<name>`
//! naming convention.
//!
//! # Example
//!
//! ```
//! use tspipe_plugin::{builtin, Plugin, PluginRepository};
//!
//! let repo = PluginRepository::new();
//! builtin::register_builtins(&repo);
//!
//! // Resolve a registered plugin by name.
//! let allocator = repo.get_processor("null").unwrap();
//! let plugin = allocator();
//! assert_eq!(plugin.description(), "Pass packets through unchanged");
//! ```

pub mod api;
pub mod builtin;
pub mod error;
pub mod loader;
pub mod registry;

pub use api::{
    InputPlugin, OutputPlugin, Plugin, PluginRole, ProcessorPlugin, StageContext, Verdict,
};
pub use error::{Error, Result};
pub use loader::{ModuleRegistration, ModuleResolver, PluginLoader, PLUGIN_FILE_PREFIX};
pub use registry::{NewInput, NewOutput, NewProcessor, PluginRepository};
