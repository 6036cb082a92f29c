//! The plugin ABI consumed by the core: every loaded plugin, whether linked
//! in statically or `dlopen`ed from a shared library, is reduced to one
//! `Plugin` trait object plus (for drivers) a `DriverIo` trait object.

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::plugin::descriptor::ModuleDescriptor;
use crate::tags::group::TagDef;
use crate::value::TagValue;

/// The interface every plugin instance exposes, regardless of node kind.
///
/// `tag_validator` is only meaningful for driver-kind plugins (it backs
/// `interface.driver.tag_validator` in the spec's ABI); app/ndriver plugins
/// accept the default no-op validator.
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> ModuleDescriptor;

    fn tag_validator(&self, _tag: &TagDef) -> GatewayResult<()> {
        Ok(())
    }

    /// Called once when the owning adapter transitions out of `Init`.
    fn open(&self) -> GatewayResult<()> {
        Ok(())
    }

    /// Called once when the owning adapter is torn down.
    fn close(&self) -> GatewayResult<()> {
        Ok(())
    }

    /// Driver-kind plugins override this to expose polling I/O; app/ndriver
    /// plugins leave it `None`.
    fn as_driver_io(&self) -> Option<&dyn DriverIo> {
        None
    }
}

/// The subset of a driver plugin's behavior the per-node worker drives: one
/// round-trip read of a group's tags against the field device.
#[async_trait]
pub trait DriverIo: Send + Sync {
    async fn read_group(
        &self,
        group: &str,
        tags: &[TagDef],
    ) -> GatewayResult<Vec<(String, TagValue)>>;
}

/// FFI-safe carrier for a boxed `Plugin` trait object, passed across the
/// `dlopen` boundary by the dynamic loader. A fat pointer (`*mut dyn Plugin`)
/// cannot cross an `extern "C"` boundary directly, so the library-side
/// factory boxes the plugin, leaks it into this handle, and the core
/// reclaims ownership with `into_plugin` immediately after the call.
#[repr(C)]
pub struct PluginHandle {
    plugin: *mut dyn Plugin,
}

impl PluginHandle {
    pub fn new(plugin: Box<dyn Plugin>) -> Self {
        Self {
            plugin: Box::into_raw(plugin),
        }
    }

    /// # Safety
    /// Must be called at most once per handle, and only on a handle
    /// produced by `new` from a still-valid `Box<dyn Plugin>`.
    pub unsafe fn into_plugin(self) -> Box<dyn Plugin> {
        Box::from_raw(self.plugin)
    }
}

// The raw pointer only ever carries a `Send + Sync` trait object across the
// loader boundary for the duration of one `create_instance` call.
unsafe impl Send for PluginHandle {}
