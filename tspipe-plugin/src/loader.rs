//! Discovery and loading of plugin shared objects.
//!
//! Loadable plugins follow a naming convention: `tsplugin_<name>` with the
//! platform shared-library extension, searched in the `TSPIPE_PLUGIN_PATH`
//! directories and next to the executable. Binding a located file to its
//! registration entry point goes through the [`ModuleResolver`] capability so
//! the loader itself never case-splits on the host platform; embedders
//! provide the resolver, and the default build declines dynamic loading.
//! Once resolved, a module stays resident for the lifetime of the process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::registry::PluginRepository;

/// File name prefix of loadable plugin modules.
pub const PLUGIN_FILE_PREFIX: &str = "tsplugin_";

/// Shared library extension on this platform.
pub fn shared_library_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// A module's registration entry point: called once with the repository the
/// module registers its allocators into.
pub type ModuleRegistration = Box<dyn FnOnce(&PluginRepository) + Send>;

/// Capability that binds a located shared object to its registration entry
/// point.
pub trait ModuleResolver: Send + Sync {
    /// Bind the module at `path` and return its registration function.
    fn resolve(&self, path: &Path) -> Result<ModuleRegistration>;
}

/// Locates and loads plugin modules from the search path.
pub struct PluginLoader {
    search_paths: Vec<PathBuf>,
    resolver: Option<Box<dyn ModuleResolver>>,
    loaded: HashSet<PathBuf>,
}

impl PluginLoader {
    /// Create a loader with the default search path: the directories in
    /// `TSPIPE_PLUGIN_PATH` followed by the executable's directory.
    pub fn new() -> Self {
        let mut search_paths = Vec::new();
        if let Ok(var) = std::env::var("TSPIPE_PLUGIN_PATH") {
            search_paths.extend(std::env::split_paths(&var));
        }
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                search_paths.push(dir.to_path_buf());
            }
        }
        Self {
            search_paths,
            resolver: None,
            loaded: HashSet::new(),
        }
    }

    /// Create a loader with no search path (for embedding and tests).
    pub fn empty() -> Self {
        Self {
            search_paths: Vec::new(),
            resolver: None,
            loaded: HashSet::new(),
        }
    }

    /// Prepend a directory to the search path.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.insert(0, path.into());
    }

    /// Install the capability that binds shared objects.
    pub fn set_resolver(&mut self, resolver: Box<dyn ModuleResolver>) {
        self.resolver = Some(resolver);
    }

    /// The module file name for a plugin name.
    pub fn module_file_name(name: &str) -> String {
        format!("{PLUGIN_FILE_PREFIX}{name}.{}", shared_library_extension())
    }

    /// Extract the plugin name from a module path, when it follows the
    /// naming convention.
    pub fn plugin_name(path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        let ext = path.extension()?.to_str()?;
        if ext != shared_library_extension() {
            return None;
        }
        stem.strip_prefix(PLUGIN_FILE_PREFIX).map(str::to_owned)
    }

    fn is_plugin_file(path: &Path) -> bool {
        Self::plugin_name(path).is_some()
    }

    /// Find the module file for a plugin name in the search path.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let file_name = Self::module_file_name(name);
        self.search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }

    /// List every module file in the search path following the naming
    /// convention.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in &self.search_paths {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(path = %dir.display(), error = %e, "skipping plugin directory");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if Self::is_plugin_file(&path) {
                    found.push(path);
                }
            }
        }
        found
    }

    /// Load the module for a plugin name.
    ///
    /// Returns `Ok(None)` when the module was already loaded (its
    /// registrations are in effect for the rest of the process).
    pub fn load_by_name(&mut self, name: &str) -> Result<Option<ModuleRegistration>> {
        let path = self.locate(name).ok_or_else(|| Error::LoadFailed {
            path: Self::module_file_name(name),
            message: "not found in plugin search path".into(),
        })?;
        self.load_file(path)
    }

    /// Load one module file, once.
    pub fn load_file(&mut self, path: PathBuf) -> Result<Option<ModuleRegistration>> {
        if self.loaded.contains(&path) {
            return Ok(None);
        }
        let resolver = self.resolver.as_ref().ok_or_else(|| Error::LoadFailed {
            path: path.display().to_string(),
            message: "dynamic plugin loading is not available in this build".into(),
        })?;
        let registration = resolver.resolve(&path)?;
        debug!(path = %path.display(), "loaded plugin module");
        self.loaded.insert(path);
        Ok(Some(registration))
    }

    /// Load every discoverable module, collecting the registration entry
    /// points of the newly loaded ones. Failures are logged and skipped.
    pub fn load_all(&mut self) -> Vec<ModuleRegistration> {
        let mut registrations = Vec::new();
        for path in self.discover() {
            match self.load_file(path.clone()) {
                Ok(Some(registration)) => registrations.push(registration),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load plugin module");
                }
            }
        }
        registrations
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}
