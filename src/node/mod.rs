//! `NodeRegistry`: the map of running node name to `Adapter`, mirroring
//! `neu_node_manager_t`. An `Adapter` is a plugin instance bound to a name,
//! a transport pipe, and — for driver-kind nodes — one `TagCache` plus the
//! set of `Group`s materialized on it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};
use crate::plugin::{ModuleDescriptor, NodeKind, Plugin, PluginInstance};
use crate::tags::cache::TagCache;
use crate::tags::group::{Group, TagDef, GROUP_INTERVAL_LIMIT};
use crate::transport::PipeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeState {
    Init,
    Running,
    Stopped,
}

/// Driver-only state: the tag cache and the live set of groups, kept in
/// insertion order like `Group`'s own tags.
pub struct DriverState {
    pub cache: TagCache,
    groups: Vec<(String, Group)>,
}

impl DriverState {
    fn new() -> Self {
        Self {
            cache: TagCache::new(),
            groups: Vec::new(),
        }
    }

    pub fn add_group(&mut self, name: &str, interval_ms: u32) -> GatewayResult<()> {
        if interval_ms < GROUP_INTERVAL_LIMIT {
            return Err(GatewayError::GroupParameterInvalid {
                interval: interval_ms,
                limit: GROUP_INTERVAL_LIMIT,
            });
        }
        if self.groups.iter().any(|(n, _)| n == name) {
            return Err(GatewayError::GroupExist(name.to_string()));
        }
        self.groups.push((name.to_string(), Group::new(name, interval_ms)));
        Ok(())
    }

    pub fn update_group(&mut self, name: &str, interval_ms: u32) -> GatewayResult<()> {
        let group = self.group_mut(name)?;
        group.set_interval(interval_ms);
        Ok(())
    }

    pub fn del_group(&mut self, name: &str) {
        self.groups.retain(|(n, _)| n != name);
    }

    pub fn group(&self, name: &str) -> GatewayResult<&Group> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, g)| g)
            .ok_or_else(|| GatewayError::GroupNotExist(name.to_string()))
    }

    pub fn group_mut(&mut self, name: &str) -> GatewayResult<&mut Group> {
        self.groups
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, g)| g)
            .ok_or_else(|| GatewayError::GroupNotExist(name.to_string()))
    }

    pub fn group_exists(&self, name: &str) -> bool {
        self.groups.iter().any(|(n, _)| n == name)
    }

    pub fn groups(&self) -> &[(String, Group)] {
        &self.groups
    }

    pub fn add_tag(&mut self, group: &str, tag: TagDef) -> GatewayResult<()> {
        self.group_mut(group)?.add_tag(tag)
    }
}

/// A running node: a plugin instance bound to a name, a pipe, and (for
/// drivers) the cache+groups it owns.
pub struct Adapter {
    name: String,
    plugin_name: String,
    descriptor: ModuleDescriptor,
    plugin: Arc<dyn Plugin>,
    state: NodeState,
    pipe: PipeHandle,
    driver: Option<DriverState>,
}

impl Adapter {
    pub fn new(name: impl Into<String>, instance: PluginInstance, pipe: PipeHandle) -> Self {
        let driver = matches!(instance.descriptor.kind, NodeKind::Driver).then(DriverState::new);
        Self {
            name: name.into(),
            plugin_name: instance.descriptor.name.clone(),
            descriptor: instance.descriptor,
            plugin: Arc::from(instance.plugin),
            state: NodeState::Init,
            pipe,
            driver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn kind(&self) -> NodeKind {
        self.descriptor.kind
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn pipe(&self) -> PipeHandle {
        self.pipe
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    /// A cloned handle to the plugin, so a worker can drive its async
    /// `DriverIo` methods without holding the registry lock across I/O.
    pub fn plugin_arc(&self) -> Arc<dyn Plugin> {
        Arc::clone(&self.plugin)
    }

    pub fn is_driver(&self) -> bool {
        matches!(self.descriptor.kind, NodeKind::Driver)
    }

    pub fn driver(&self) -> Option<&DriverState> {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> Option<&mut DriverState> {
        self.driver.as_mut()
    }

    /// `init -> (running)`: opens the underlying plugin and, if `start`,
    /// transitions straight to `Running`.
    pub fn init(&mut self, start: bool) -> GatewayResult<()> {
        self.plugin
            .open()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        self.state = if start {
            NodeState::Running
        } else {
            NodeState::Init
        };
        Ok(())
    }

    pub fn uninit(&mut self) -> GatewayResult<()> {
        self.plugin
            .close()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        self.state = NodeState::Stopped;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub kind: NodeKind,
    pub plugin_name: String,
    pub state: NodeState,
}

#[derive(Default)]
pub struct NodeRegistry {
    nodes: Mutex<HashMap<String, Adapter>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, adapter: Adapter) -> GatewayResult<()> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(adapter.name()) {
            return Err(GatewayError::NodeExist(adapter.name().to_string()));
        }
        nodes.insert(adapter.name().to_string(), adapter);
        Ok(())
    }

    /// Removes and returns the adapter so the caller can run `uninit` /
    /// release its plugin instance before it is dropped.
    pub fn del(&self, name: &str) -> GatewayResult<Adapter> {
        self.nodes
            .lock()
            .remove(name)
            .ok_or_else(|| GatewayError::NodeNotExist(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.nodes.lock().contains_key(name)
    }

    pub fn with_adapter<R>(&self, name: &str, f: impl FnOnce(&Adapter) -> R) -> Option<R> {
        self.nodes.lock().get(name).map(f)
    }

    pub fn with_adapter_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Adapter) -> R,
    ) -> Option<R> {
        self.nodes.lock().get_mut(name).map(f)
    }

    pub fn is_driver(&self, name: &str) -> bool {
        self.nodes
            .lock()
            .get(name)
            .map(|a| a.is_driver())
            .unwrap_or(false)
    }

    pub fn get_pipe(&self, name: &str) -> Option<PipeHandle> {
        self.nodes.lock().get(name).map(|a| a.pipe())
    }

    pub fn node_info(&self, name: &str) -> Option<NodeInfo> {
        self.nodes.lock().get(name).map(to_info)
    }

    pub fn filter(
        &self,
        kind: Option<NodeKind>,
        plugin: Option<&str>,
        name: Option<&str>,
    ) -> Vec<NodeInfo> {
        self.nodes
            .lock()
            .values()
            .filter(|a| kind.map(|k| k == a.kind()).unwrap_or(true))
            .filter(|a| plugin.map(|p| p == a.plugin_name()).unwrap_or(true))
            .filter(|a| name.map(|n| a.name().contains(n)).unwrap_or(true))
            .map(to_info)
            .collect()
    }

    pub fn get(&self, kind: NodeKind) -> Vec<NodeInfo> {
        self.filter(Some(kind), None, None)
    }

    /// Pure rename: callers must rekey `SubscriptionRegistry` themselves
    /// before calling this, so a mid-failure leaves the old name intact.
    pub fn update_name(&self, old: &str, new: &str) -> GatewayResult<()> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(new) {
            return Err(GatewayError::NodeExist(new.to_string()));
        }
        let mut adapter = nodes
            .remove(old)
            .ok_or_else(|| GatewayError::NodeNotExist(old.to_string()))?;
        adapter.name = new.to_string();
        nodes.insert(new.to_string(), adapter);
        Ok(())
    }
}

fn to_info(adapter: &Adapter) -> NodeInfo {
    NodeInfo {
        name: adapter.name().to_string(),
        kind: adapter.kind(),
        plugin_name: adapter.plugin_name().to_string(),
        state: adapter.state(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::abi::Plugin as PluginTrait;

    struct NoopDriverPlugin;
    impl PluginTrait for NoopDriverPlugin {
        fn descriptor(&self) -> ModuleDescriptor {
            ModuleDescriptor {
                name: "test.driver".into(),
                kind: NodeKind::Driver,
                single: false,
            }
        }
    }

    fn driver_adapter(name: &str) -> Adapter {
        let instance = PluginInstance {
            plugin: Box::new(NoopDriverPlugin),
            descriptor: ModuleDescriptor {
                name: "test.driver".into(),
                kind: NodeKind::Driver,
                single: false,
            },
        };
        Adapter::new(name, instance, PipeHandle::next())
    }

    #[test]
    fn add_then_del_restores_empty_registry() {
        let registry = NodeRegistry::new();
        registry.add(driver_adapter("n1")).unwrap();
        assert!(registry.exists("n1"));
        registry.del("n1").unwrap();
        assert!(!registry.exists("n1"));
    }

    #[test]
    fn add_duplicate_name_rejected() {
        let registry = NodeRegistry::new();
        registry.add(driver_adapter("n1")).unwrap();
        let err = registry.add(driver_adapter("n1")).unwrap_err();
        assert!(matches!(err, GatewayError::NodeExist(_)));
    }

    #[test]
    fn del_unknown_node_not_exist() {
        let registry = NodeRegistry::new();
        let err = registry.del("ghost").unwrap_err();
        assert!(matches!(err, GatewayError::NodeNotExist(_)));
    }

    #[test]
    fn update_name_renames_in_place() {
        let registry = NodeRegistry::new();
        registry.add(driver_adapter("old")).unwrap();
        registry.update_name("old", "new").unwrap();
        assert!(!registry.exists("old"));
        assert!(registry.exists("new"));
    }

    #[test]
    fn update_name_collision_rejected() {
        let registry = NodeRegistry::new();
        registry.add(driver_adapter("a")).unwrap();
        registry.add(driver_adapter("b")).unwrap();
        let err = registry.update_name("a", "b").unwrap_err();
        assert!(matches!(err, GatewayError::NodeExist(_)));
        assert!(registry.exists("a"));
    }

    #[test]
    fn driver_add_group_rejects_interval_below_limit() {
        let registry = NodeRegistry::new();
        registry.add(driver_adapter("drv")).unwrap();
        let err = registry
            .with_adapter_mut("drv", |a| a.driver_mut().unwrap().add_group("g", 50))
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, GatewayError::GroupParameterInvalid { .. }));
    }
}
