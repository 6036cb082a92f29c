//! The catalog of loadable plugin libraries. Mirrors `neu_plugin_manager_t`:
//! one entry per loaded library, reference-counted by live instances so a
//! plugin backing a running node can't be pulled out from under it.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{GatewayError, GatewayResult};
use crate::plugin::abi::Plugin;
use crate::plugin::descriptor::ModuleDescriptor;
use crate::plugin::loader::{DispatchingLoader, LibraryToken, PluginLoader};

struct PluginEntry {
    library_path: String,
    descriptor: ModuleDescriptor,
    factory: crate::plugin::loader::PluginFactory,
    token: LibraryToken,
    instances: usize,
}

/// One instance created from a plugin entry: the boxed `Plugin` the
/// requesting `Adapter` (or `Template`) now owns exclusively.
pub struct PluginInstance {
    pub plugin: Box<dyn Plugin>,
    pub descriptor: ModuleDescriptor,
}

pub struct PluginRegistry {
    loader: Box<dyn PluginLoader>,
    plugins: Mutex<HashMap<String, PluginEntry>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            loader: Box::new(DispatchingLoader::default()),
            plugins: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn with_loader(loader: Box<dyn PluginLoader>) -> Self {
        Self {
            loader,
            plugins: Mutex::new(HashMap::new()),
        }
    }

    /// Loads `library_path`, registering it under the name its own
    /// descriptor reports.
    pub fn add(&self, library_path: &str) -> GatewayResult<ModuleDescriptor> {
        let loaded = self.loader.load(library_path)?;
        let name = loaded.descriptor.name.clone();
        let mut plugins = self.plugins.lock();
        if plugins.contains_key(&name) {
            // Re-adding the same library is a no-op on the descriptor; the
            // freshly opened handle is released immediately.
            self.loader.unload(&loaded.token);
            return Ok(plugins[&name].descriptor.clone());
        }
        let descriptor = loaded.descriptor.clone();
        plugins.insert(
            name,
            PluginEntry {
                library_path: library_path.to_string(),
                descriptor: loaded.descriptor,
                factory: loaded.factory,
                token: loaded.token,
                instances: 0,
            },
        );
        Ok(descriptor)
    }

    pub fn del(&self, name: &str) -> GatewayResult<()> {
        let mut plugins = self.plugins.lock();
        let entry = plugins
            .get(name)
            .ok_or_else(|| GatewayError::PluginNotFound(name.to_string()))?;
        if entry.instances > 0 {
            return Err(GatewayError::LibraryInUse(name.to_string(), entry.instances));
        }
        let entry = plugins.remove(name).expect("checked above");
        self.loader.unload(&entry.token);
        Ok(())
    }

    pub fn find(&self, name: &str) -> GatewayResult<ModuleDescriptor> {
        self.plugins
            .lock()
            .get(name)
            .map(|e| e.descriptor.clone())
            .ok_or_else(|| GatewayError::PluginNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.plugins.lock().contains_key(name)
    }

    pub fn is_single(&self, name: &str) -> GatewayResult<bool> {
        Ok(self.find(name)?.single)
    }

    pub fn get_plugins(&self) -> Vec<(String, ModuleDescriptor)> {
        self.plugins
            .lock()
            .values()
            .map(|e| (e.library_path.clone(), e.descriptor.clone()))
            .collect()
    }

    /// Creates one new instance from `name`'s factory, bumping the
    /// in-use count. The caller (an `Adapter` or `Template`) owns the
    /// returned instance exclusively; call `release` when it is dropped.
    pub fn create_instance(&self, name: &str) -> GatewayResult<PluginInstance> {
        let mut plugins = self.plugins.lock();
        let entry = plugins
            .get_mut(name)
            .ok_or_else(|| GatewayError::PluginNotFound(name.to_string()))?;
        if entry.descriptor.single {
            return Err(GatewayError::LibraryNotAllowCreateInstance(
                name.to_string(),
            ));
        }
        let plugin = (entry.factory)()
            .map_err(|_| GatewayError::LibraryFailedToOpen(name.to_string(), "factory failed".into()))?;
        let descriptor = entry.descriptor.clone();
        entry.instances += 1;
        Ok(PluginInstance { plugin, descriptor })
    }

    /// Releases one instance previously obtained from `create_instance`,
    /// allowing `del` to proceed once the count reaches zero.
    pub fn release(&self, name: &str) {
        if let Some(entry) = self.plugins.lock().get_mut(name) {
            entry.instances = entry.instances.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::descriptor::NodeKind;
    use crate::plugin::loader::{register_builtin, BuiltinLoader};

    fn noop_plugin(name: &str, kind: NodeKind, single: bool) -> Box<dyn Plugin> {
        struct NoopPlugin(ModuleDescriptor);
        impl Plugin for NoopPlugin {
            fn descriptor(&self) -> ModuleDescriptor {
                self.0.clone()
            }
        }
        Box::new(NoopPlugin(ModuleDescriptor {
            name: name.to_string(),
            kind,
            single,
        }))
    }

    fn registry_with(name: &'static str, kind: NodeKind, single: bool) -> PluginRegistry {
        register_builtin(
            name,
            ModuleDescriptor {
                name: name.to_string(),
                kind,
                single,
            },
            move || Ok(noop_plugin(name, kind, single)),
        );
        PluginRegistry::with_loader(Box::new(BuiltinLoader))
    }

    #[test]
    fn add_and_find_round_trips_descriptor() {
        let registry = registry_with("test.add_and_find", NodeKind::Driver, false);
        let descriptor = registry.add("builtin://test.add_and_find").unwrap();
        assert_eq!(descriptor.name, "test.add_and_find");
        assert!(registry.exists("test.add_and_find"));
    }

    #[test]
    fn del_while_instance_live_is_rejected() {
        let registry = registry_with("test.del_in_use", NodeKind::Driver, false);
        registry.add("builtin://test.del_in_use").unwrap();
        let _inst = registry.create_instance("test.del_in_use").unwrap();
        let err = registry.del("test.del_in_use").unwrap_err();
        assert!(matches!(err, GatewayError::LibraryInUse(_, 1)));
    }

    #[test]
    fn del_after_release_succeeds() {
        let registry = registry_with("test.del_after_release", NodeKind::Driver, false);
        registry.add("builtin://test.del_after_release").unwrap();
        registry.create_instance("test.del_after_release").unwrap();
        registry.release("test.del_after_release");
        registry.del("test.del_after_release").unwrap();
        assert!(!registry.exists("test.del_after_release"));
    }

    #[test]
    fn single_plugin_rejects_create_instance() {
        let registry = registry_with("test.single", NodeKind::Driver, true);
        registry.add("builtin://test.single").unwrap();
        let err = registry.create_instance("test.single").unwrap_err();
        assert!(matches!(
            err,
            GatewayError::LibraryNotAllowCreateInstance(_)
        ));
    }

    #[test]
    fn create_instance_unknown_plugin_not_found() {
        let registry = PluginRegistry::with_loader(Box::new(BuiltinLoader));
        let err = registry.create_instance("nope").unwrap_err();
        assert!(matches!(err, GatewayError::PluginNotFound(_)));
    }
}
