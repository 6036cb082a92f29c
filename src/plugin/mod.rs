//! Plugin loading and the catalog of loaded libraries.

pub mod abi;
pub mod descriptor;
pub mod loader;
pub mod registry;

pub use abi::{DriverIo, Plugin, PluginHandle};
pub use descriptor::{ModuleDescriptor, NodeKind};
pub use registry::{PluginInstance, PluginRegistry};
