//! Plugin loading backends.
//!
//! The spec treats the dynamic loader as an external collaborator exposing
//! `load(path) -> handle+module_descriptor` / `unload(handle)`. Two backends
//! implement that contract here:
//!
//! - [`DynamicLoader`] actually `dlopen`s a `cdylib` via `libloading` and
//!   calls its exported factory symbol, for real field-protocol plugins
//!   shipped as shared libraries.
//! - [`BuiltinLoader`] resolves a `builtin://name` pseudo-path against an
//!   in-process, `once_cell`-backed registry of statically linked plugins —
//!   the reference OPC UA driver, and anything a test registers — so the
//!   core can be exercised without a real shared-object on disk.
//!
//! `PluginRegistry` dispatches on the path's scheme and is agnostic to which
//! backend actually produced the instance.

use std::collections::HashMap;
use std::sync::Arc;

use libloading::{Library, Symbol};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{GatewayError, GatewayResult};
use crate::plugin::abi::{Plugin, PluginHandle};
use crate::plugin::descriptor::ModuleDescriptor;

/// A factory that produces one fresh plugin instance per call.
pub type PluginFactory = Arc<dyn Fn() -> GatewayResult<Box<dyn Plugin>> + Send + Sync>;

/// What `load` hands back to the registry: the descriptor plus a factory
/// closure the registry calls once per `create_instance`, and an opaque
/// token the loader needs to `unload` later.
pub struct LoadedLibrary {
    pub descriptor: ModuleDescriptor,
    pub factory: PluginFactory,
    pub token: LibraryToken,
}

pub enum LibraryToken {
    Dynamic(Arc<Library>),
    Builtin(String),
}

pub trait PluginLoader: Send + Sync {
    fn load(&self, library_path: &str) -> GatewayResult<LoadedLibrary>;
    fn unload(&self, token: &LibraryToken);
}

/// Symbol every dynamic plugin library must export: returns a freshly
/// boxed, leaked plugin instance wrapped for the FFI boundary.
type PluginCreateFn = unsafe extern "C" fn() -> *mut PluginHandle;

/// `libloading`-backed loader for real shared-object plugins.
#[derive(Default)]
pub struct DynamicLoader;

impl PluginLoader for DynamicLoader {
    fn load(&self, library_path: &str) -> GatewayResult<LoadedLibrary> {
        let lib = unsafe { Library::new(library_path) }.map_err(|e| {
            GatewayError::LibraryFailedToOpen(library_path.to_string(), e.to_string())
        })?;
        let lib = Arc::new(lib);

        // Probe once at load time so a malformed library is rejected
        // immediately rather than on first `create_instance`.
        let descriptor = {
            let create: Symbol<PluginCreateFn> = unsafe {
                lib.get(b"gateway_plugin_create\0").map_err(|e| {
                    GatewayError::LibraryFailedToOpen(library_path.to_string(), e.to_string())
                })?
            };
            let handle = unsafe { Box::from_raw(create()) };
            let plugin = unsafe { handle.into_plugin() };
            plugin.descriptor()
        };

        let lib_for_factory = Arc::clone(&lib);
        let path_for_factory = library_path.to_string();
        let factory: PluginFactory = Arc::new(move || {
            let create: Symbol<PluginCreateFn> =
                unsafe { lib_for_factory.get(b"gateway_plugin_create\0") }.map_err(|e| {
                    GatewayError::LibraryFailedToOpen(path_for_factory.clone(), e.to_string())
                })?;
            let handle = unsafe { Box::from_raw(create()) };
            Ok(unsafe { handle.into_plugin() })
        });

        Ok(LoadedLibrary {
            descriptor,
            factory,
            token: LibraryToken::Dynamic(lib),
        })
    }

    fn unload(&self, token: &LibraryToken) {
        // Dropping the last `Arc<Library>` calls `dlclose`; nothing else to
        // do here, the registry holds the `Arc` that keeps it alive.
        let _ = token;
    }
}

type BuiltinFactory = Arc<dyn Fn() -> GatewayResult<Box<dyn Plugin>> + Send + Sync>;

static BUILTIN_PLUGINS: Lazy<Mutex<HashMap<String, (ModuleDescriptor, BuiltinFactory)>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers a statically-linked plugin under `builtin://{name}`. Called at
/// process start-up for the bundled reference driver, and by tests for
/// fixture plugins.
pub fn register_builtin<F>(name: &str, descriptor: ModuleDescriptor, factory: F)
where
    F: Fn() -> GatewayResult<Box<dyn Plugin>> + Send + Sync + 'static,
{
    BUILTIN_PLUGINS
        .lock()
        .insert(name.to_string(), (descriptor, Arc::new(factory)));
}

pub const BUILTIN_SCHEME: &str = "builtin://";

#[derive(Default)]
pub struct BuiltinLoader;

impl PluginLoader for BuiltinLoader {
    fn load(&self, library_path: &str) -> GatewayResult<LoadedLibrary> {
        let name = library_path
            .strip_prefix(BUILTIN_SCHEME)
            .unwrap_or(library_path);
        let table = BUILTIN_PLUGINS.lock();
        let (descriptor, factory) = table
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::LibraryNotFound(library_path.to_string()))?;
        Ok(LoadedLibrary {
            descriptor,
            factory,
            token: LibraryToken::Builtin(name.to_string()),
        })
    }

    fn unload(&self, _token: &LibraryToken) {
        // Builtin plugins stay registered for the process lifetime; nothing
        // to release.
    }
}

/// Picks `BuiltinLoader` for `builtin://...` paths and `DynamicLoader` for
/// everything else, so `PluginRegistry` can stay backend-agnostic.
pub struct DispatchingLoader {
    builtin: BuiltinLoader,
    dynamic: DynamicLoader,
}

impl Default for DispatchingLoader {
    fn default() -> Self {
        Self {
            builtin: BuiltinLoader,
            dynamic: DynamicLoader,
        }
    }
}

impl PluginLoader for DispatchingLoader {
    fn load(&self, library_path: &str) -> GatewayResult<LoadedLibrary> {
        if library_path.starts_with(BUILTIN_SCHEME) {
            self.builtin.load(library_path)
        } else {
            self.dynamic.load(library_path)
        }
    }

    fn unload(&self, token: &LibraryToken) {
        match token {
            LibraryToken::Dynamic(_) => self.dynamic.unload(token),
            LibraryToken::Builtin(_) => self.builtin.unload(token),
        }
    }
}
