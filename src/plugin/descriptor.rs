//! Module descriptors: the metadata a plugin library exposes about itself
//! once loaded, mirroring `neu_plugin_module_t` in the original manager.

use serde::{Deserialize, Serialize};

/// What kind of node a plugin instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Driver,
    App,
    NDriver,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Driver => "driver",
            NodeKind::App => "app",
            NodeKind::NDriver => "ndriver",
        }
    }
}

/// Static description of a loaded plugin library: its name, what kind of
/// node it produces, and whether it may only ever back a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub kind: NodeKind,
    /// `single` plugins (e.g. the built-in monitor) may not be instantiated
    /// through `add_node`, nor bound to a template.
    pub single: bool,
}
