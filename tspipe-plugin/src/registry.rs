//! The plugin repository.
//!
//! One repository maps plugin names to allocator functions, one map per role.
//! Lookups fall back to loading a shared object named after the plugin when
//! dynamic loading is allowed; a loaded module registers its own allocators.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::api::{InputPlugin, OutputPlugin, Plugin, PluginRole, ProcessorPlugin};
use crate::error::{Error, Result};
use crate::loader::{ModuleResolver, PluginLoader};

/// Allocator for input plugins.
pub type NewInput = Arc<dyn Fn() -> Box<dyn InputPlugin> + Send + Sync>;

/// Allocator for processor plugins.
pub type NewProcessor = Arc<dyn Fn() -> Box<dyn ProcessorPlugin> + Send + Sync>;

/// Allocator for output plugins.
pub type NewOutput = Arc<dyn Fn() -> Box<dyn OutputPlugin> + Send + Sync>;

#[derive(Default)]
struct Maps {
    inputs: HashMap<String, NewInput>,
    processors: HashMap<String, NewProcessor>,
    outputs: HashMap<String, NewOutput>,
}

/// A repository of pipeline plugins, statically registered or dynamically
/// loaded.
pub struct PluginRepository {
    maps: RwLock<Maps>,
    loader: Mutex<PluginLoader>,
    shared_library_allowed: AtomicBool,
}

impl PluginRepository {
    /// Create a repository with the default loader search path.
    pub fn new() -> Self {
        Self::with_loader(PluginLoader::new())
    }

    /// Create a repository around a specific loader.
    pub fn with_loader(loader: PluginLoader) -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            loader: Mutex::new(loader),
            shared_library_allowed: AtomicBool::new(true),
        }
    }

    /// The process-wide repository instance.
    pub fn global() -> &'static PluginRepository {
        static INSTANCE: OnceLock<PluginRepository> = OnceLock::new();
        INSTANCE.get_or_init(PluginRepository::new)
    }

    /// Allow or disallow loading plugins from shared objects.
    ///
    /// When disabled, only explicitly registered plugins resolve. Enabled by
    /// default.
    pub fn set_shared_library_allowed(&self, allowed: bool) {
        self.shared_library_allowed.store(allowed, Ordering::Relaxed);
    }

    /// Prepend a directory to the module search path.
    pub fn add_search_path(&self, path: impl Into<std::path::PathBuf>) {
        self.loader.lock().add_search_path(path);
    }

    /// Install the capability that binds shared objects.
    pub fn set_module_resolver(&self, resolver: Box<dyn ModuleResolver>) {
        self.loader.lock().set_resolver(resolver);
    }

    /// Register an input plugin, replacing any previous allocator under the
    /// same name.
    pub fn register_input(&self, name: impl Into<String>, allocator: NewInput) {
        let name = name.into();
        debug!(name = %name, "registered input plugin");
        self.maps.write().inputs.insert(name, allocator);
    }

    /// Register a packet processor plugin.
    pub fn register_processor(&self, name: impl Into<String>, allocator: NewProcessor) {
        let name = name.into();
        debug!(name = %name, "registered processor plugin");
        self.maps.write().processors.insert(name, allocator);
    }

    /// Register an output plugin.
    pub fn register_output(&self, name: impl Into<String>, allocator: NewOutput) {
        let name = name.into();
        debug!(name = %name, "registered output plugin");
        self.maps.write().outputs.insert(name, allocator);
    }

    /// Get an input plugin allocator by name, loading its module on a miss
    /// when dynamic loading is allowed.
    pub fn get_input(&self, name: &str) -> Result<NewInput> {
        self.get_with_fallback(name, PluginRole::Input, |maps| maps.inputs.get(name).cloned())
    }

    /// Get a packet processor plugin allocator by name.
    pub fn get_processor(&self, name: &str) -> Result<NewProcessor> {
        self.get_with_fallback(name, PluginRole::Processor, |maps| {
            maps.processors.get(name).cloned()
        })
    }

    /// Get an output plugin allocator by name.
    pub fn get_output(&self, name: &str) -> Result<NewOutput> {
        self.get_with_fallback(name, PluginRole::Output, |maps| {
            maps.outputs.get(name).cloned()
        })
    }

    fn get_with_fallback<T>(
        &self,
        name: &str,
        role: PluginRole,
        lookup: impl Fn(&Maps) -> Option<T>,
    ) -> Result<T> {
        if let Some(found) = lookup(&self.maps.read()) {
            return Ok(found);
        }
        if self.shared_library_allowed.load(Ordering::Relaxed) {
            match self.load_module(name) {
                Ok(()) => {
                    if let Some(found) = lookup(&self.maps.read()) {
                        return Ok(found);
                    }
                }
                Err(e) => {
                    debug!(name = %name, error = %e, "dynamic plugin load failed");
                }
            }
        }
        Err(Error::NotFound {
            role,
            name: name.into(),
        })
    }

    fn load_module(&self, name: &str) -> Result<()> {
        let registration = self.loader.lock().load_by_name(name)?;
        if let Some(registration) = registration {
            registration(self);
        }
        Ok(())
    }

    /// Load every discoverable plugin module. Does nothing when dynamic
    /// loading is disabled.
    pub fn load_all_plugins(&self) {
        if !self.shared_library_allowed.load(Ordering::Relaxed) {
            return;
        }
        let registrations = self.loader.lock().load_all();
        for registration in registrations {
            registration(self);
        }
    }

    /// Number of registered input plugins.
    pub fn input_count(&self) -> usize {
        self.maps.read().inputs.len()
    }

    /// Number of registered processor plugins.
    pub fn processor_count(&self) -> usize {
        self.maps.read().processors.len()
    }

    /// Number of registered output plugins.
    pub fn output_count(&self) -> usize {
        self.maps.read().outputs.len()
    }

    /// Build the textual plugin inventory, one aligned name/description line
    /// per plugin. With `load_all`, discoverable modules are loaded first.
    pub fn list_plugins(&self, load_all: bool) -> String {
        if load_all {
            self.load_all_plugins();
        }

        // Each plugin is instantiated once to ask for its description.
        let maps = self.maps.read();
        let mut inputs: Vec<(&str, String)> = maps
            .inputs
            .iter()
            .map(|(name, alloc)| (name.as_str(), alloc().description().to_owned()))
            .collect();
        let mut processors: Vec<(&str, String)> = maps
            .processors
            .iter()
            .map(|(name, alloc)| (name.as_str(), alloc().description().to_owned()))
            .collect();
        let mut outputs: Vec<(&str, String)> = maps
            .outputs
            .iter()
            .map(|(name, alloc)| (name.as_str(), alloc().description().to_owned()))
            .collect();

        let width = inputs
            .iter()
            .chain(&processors)
            .chain(&outputs)
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for (title, list) in [
            ("Input plugins", &mut inputs),
            ("Packet processor plugins", &mut processors),
            ("Output plugins", &mut outputs),
        ] {
            list.sort_by(|a, b| a.0.cmp(b.0));
            let _ = writeln!(out, "{title}:");
            for (name, description) in list.iter() {
                let _ = writeln!(out, "  {name:width$}  {description}");
            }
            let _ = writeln!(out);
        }
        out
    }
}

impl Default for PluginRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{StageContext, Verdict};
    use crate::loader::ModuleRegistration;
    use std::path::Path;
    use tspipe_core::TsPacket;

    struct Passthrough;

    impl Plugin for Passthrough {
        fn description(&self) -> &str {
            "Pass packets through unchanged"
        }
    }

    impl ProcessorPlugin for Passthrough {
        fn process(&mut self, _ctx: &dyn StageContext, _packet: &mut TsPacket) -> Verdict {
            Verdict::Ok
        }
    }

    fn repo() -> PluginRepository {
        PluginRepository::with_loader(PluginLoader::empty())
    }

    #[test]
    fn test_registered_plugin_wins_over_dynamic_load() {
        // A registered name must resolve without touching the loader.
        struct NoResolver;
        impl ModuleResolver for NoResolver {
            fn resolve(&self, _path: &Path) -> crate::Result<ModuleRegistration> {
                panic!("resolver must not be consulted for registered plugins");
            }
        }

        let repo = repo();
        repo.set_module_resolver(Box::new(NoResolver));
        repo.register_processor("null", Arc::new(|| Box::new(Passthrough)));

        assert!(repo.get_processor("null").is_ok());
    }

    #[test]
    fn test_unknown_plugin_not_found() {
        let repo = repo();
        let err = repo.get_input("missing").err().unwrap();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(err.to_string(), "input plugin 'missing' not found");
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let repo = repo();
        repo.register_processor("null", Arc::new(|| Box::new(Passthrough)));
        assert!(repo.get_processor("null").is_ok());
        assert!(repo.get_processor("Null").is_err());
    }

    #[test]
    fn test_registration_overwrites() {
        let repo = repo();
        repo.register_processor("p", Arc::new(|| Box::new(Passthrough)));
        repo.register_processor("p", Arc::new(|| Box::new(Passthrough)));
        assert_eq!(repo.processor_count(), 1);
    }

    #[test]
    fn test_dynamic_load_registers_plugin() {
        struct Registering;
        impl ModuleResolver for Registering {
            fn resolve(&self, _path: &Path) -> crate::Result<ModuleRegistration> {
                Ok(Box::new(|repo: &PluginRepository| {
                    repo.register_processor("dyn", Arc::new(|| Box::new(Passthrough)));
                }))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path()
                .join(PluginLoader::module_file_name("dyn")),
            b"module",
        )
        .unwrap();

        let repo = repo();
        repo.add_search_path(dir.path());
        repo.set_module_resolver(Box::new(Registering));

        assert!(repo.get_processor("dyn").is_ok());
        assert_eq!(repo.processor_count(), 1);
    }

    #[test]
    fn test_shared_library_disallowed() {
        let repo = repo();
        repo.set_shared_library_allowed(false);
        assert!(repo.get_processor("anything").is_err());
    }

    #[test]
    fn test_list_plugins_alignment() {
        let repo = repo();
        repo.register_processor("null", Arc::new(|| Box::new(Passthrough)));
        repo.register_processor("verylongname", Arc::new(|| Box::new(Passthrough)));

        let listing = repo.list_plugins(false);
        let lines: Vec<&str> = listing
            .lines()
            .filter(|l| l.trim_start().starts_with("null") || l.trim_start().starts_with("verylongname"))
            .collect();
        assert_eq!(lines.len(), 2);
        // Description columns line up.
        let col0 = lines[0].find("Pass packets").unwrap();
        let col1 = lines[1].find("Pass packets").unwrap();
        assert_eq!(col0, col1);
    }
}
