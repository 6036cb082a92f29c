//! The control-plane façade: composes the five registries plus a handle to
//! the transport, and exposes the operations the REST API and the
//! bootstrap sequence in `main` drive. Mirrors `neu_manager_t` /
//! `manager_internal.c`.
//!
//! Lock ordering, should more than one registry ever need to be held at
//! once: plugin -> node -> subscription -> template. In practice every
//! operation below only ever touches one registry's lock at a time plus
//! short-lived reads of another, so no operation here actually nests locks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::node::{Adapter, NodeInfo, NodeRegistry};
use crate::plugin::{ModuleDescriptor, NodeKind, PluginRegistry};
use crate::subscription::{SubGroupInfo, SubscriptionKind, SubscriptionRegistry};
use crate::tags::group::TagDef;
use crate::template::{Template, TemplateRegistry};
use crate::transport::{DataReportBody, Message, MessageBody, SubscribeGroupBody, Transport};

const MONITOR_NODE: &str = "monitor";

#[derive(Debug, Clone, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub interval: u32,
    pub tag_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateGroupSpec {
    pub name: String,
    pub interval: u32,
    pub tags: Vec<TagDef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateSnapshot {
    pub name: String,
    pub plugin: String,
    pub groups: Vec<GroupInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverGroupInfo {
    pub driver: String,
    pub group: String,
    pub interval: u32,
    pub tag_count: usize,
}

pub struct Manager {
    plugins: PluginRegistry,
    nodes: NodeRegistry,
    subscriptions: SubscriptionRegistry,
    templates: TemplateRegistry,
    transport: Arc<dyn Transport>,
}

impl Manager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            plugins: PluginRegistry::new(),
            nodes: NodeRegistry::new(),
            subscriptions: SubscriptionRegistry::new(),
            templates: TemplateRegistry::new(),
            transport,
        }
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    // ---- Plugins ----------------------------------------------------

    pub fn add_plugin(&self, library_path: &str) -> GatewayResult<ModuleDescriptor> {
        self.plugins.add(library_path)
    }

    pub fn del_plugin(&self, name: &str) -> GatewayResult<()> {
        self.plugins.del(name)
    }

    pub fn get_plugins(&self) -> Vec<(String, ModuleDescriptor)> {
        self.plugins.get_plugins()
    }

    // ---- Nodes --------------------------------------------------------

    pub fn add_node(&self, name: &str, plugin: &str, start: bool) -> GatewayResult<()> {
        if self.nodes.exists(name) {
            return Err(GatewayError::NodeExist(name.to_string()));
        }
        let descriptor = self.plugins.find(plugin)?;
        if descriptor.single {
            return Err(GatewayError::LibraryNotAllowCreateInstance(
                plugin.to_string(),
            ));
        }

        let instance = self.plugins.create_instance(plugin)?;
        let pipe = self.transport.register_pipe();
        let mut adapter = Adapter::new(name, instance, pipe);

        if let Err(e) = adapter.init(start) {
            self.plugins.release(plugin);
            self.transport.unregister_pipe(pipe);
            return Err(e);
        }

        if let Err(e) = self.nodes.add(adapter) {
            self.plugins.release(plugin);
            self.transport.unregister_pipe(pipe);
            return Err(e);
        }

        info!(node = name, plugin, start, "node added");
        Ok(())
    }

    pub fn del_node(&self, name: &str) -> GatewayResult<()> {
        let mut adapter = self.nodes.del(name)?;
        let plugin_name = adapter.plugin_name().to_string();
        let pipe = adapter.pipe();
        let _ = adapter.uninit();
        self.plugins.release(&plugin_name);
        self.transport.unregister_pipe(pipe);
        self.subscriptions.remove(name);
        info!(node = name, "node deleted");
        Ok(())
    }

    pub fn get_nodes(
        &self,
        kind: Option<NodeKind>,
        plugin: Option<&str>,
        name: Option<&str>,
    ) -> Vec<NodeInfo> {
        self.nodes.filter(kind, plugin, name)
    }

    pub fn get_node_info(&self, name: &str) -> GatewayResult<NodeInfo> {
        self.nodes
            .node_info(name)
            .ok_or_else(|| GatewayError::NodeNotExist(name.to_string()))
    }

    /// Rekeys subscriptions before the rename so a (hypothetically fallible)
    /// rekey step always leaves the old name in place on failure; today the
    /// rekey itself cannot fail, so only the existence check can.
    pub fn update_node_name(&self, old: &str, new: &str) -> GatewayResult<()> {
        if !self.nodes.exists(old) {
            return Err(GatewayError::NodeNotExist(old.to_string()));
        }
        if self.nodes.exists(new) {
            return Err(GatewayError::NodeExist(new.to_string()));
        }
        let is_driver = self.nodes.is_driver(old);
        // Collision and existence are both already ruled out above, so this
        // can no longer fail; the rekey happens first so a hypothetical
        // failure here would still leave both registries on the old name.
        if is_driver {
            self.subscriptions.update_driver_name(old, new);
        } else {
            self.subscriptions.update_app_name(old, new);
        }
        self.nodes.update_name(old, new)
    }

    // ---- Templates ------------------------------------------------------

    pub fn add_template(
        &self,
        name: &str,
        plugin: &str,
        groups: Vec<TemplateGroupSpec>,
    ) -> GatewayResult<()> {
        if self.templates.exists(name) {
            return Err(GatewayError::TemplateExist(name.to_string()));
        }
        let descriptor = self.plugins.find(plugin)?;
        if descriptor.single {
            return Err(GatewayError::PluginNotSupportTemplate(plugin.to_string()));
        }

        let instance = self.plugins.create_instance(plugin)?;
        let mut template = Template::new(name, instance);

        let result = (|| -> GatewayResult<()> {
            for spec in groups {
                template.add_group(&spec.name, spec.interval)?;
                for tag in spec.tags {
                    template.add_tag(&spec.name, tag)?;
                }
            }
            Ok(())
        })();

        if let Err(e) = result {
            self.plugins.release(plugin);
            return Err(e);
        }

        self.templates.add(template)?;
        info!(template = name, plugin, "template added");
        Ok(())
    }

    pub fn del_template(&self, name: &str) -> GatewayResult<()> {
        let plugin_name = self
            .templates
            .with_template(name, |t| t.plugin_name().to_string())?;
        self.templates.del(name)?;
        self.plugins.release(&plugin_name);
        Ok(())
    }

    pub fn clear_templates(&self) {
        // Each template holds a plugin instance; release them all before
        // dropping so `PluginRegistry`'s in-use counts stay accurate.
        for (_name, plugin) in self.templates.names() {
            self.plugins.release(&plugin);
        }
        self.templates.clear();
    }

    pub fn get_template(&self, name: &str) -> GatewayResult<TemplateSnapshot> {
        self.templates.with_template(name, |t| {
            let mut groups = Vec::new();
            t.for_each_group(|gname, g| {
                groups.push(GroupInfo {
                    name: gname.to_string(),
                    interval: g.get_interval(),
                    tag_count: g.tag_count(),
                });
            });
            TemplateSnapshot {
                name: t.name().to_string(),
                plugin: t.plugin_name().to_string(),
                groups,
            }
        })
    }

    pub fn get_templates(&self) -> Vec<(String, String)> {
        self.templates.names()
    }

    pub fn add_template_group(&self, tmpl: &str, group: &str, interval: u32) -> GatewayResult<()> {
        self.templates
            .with_template_mut(tmpl, |t| t.add_group(group, interval))?
    }

    pub fn update_template_group(
        &self,
        tmpl: &str,
        group: &str,
        interval: u32,
    ) -> GatewayResult<()> {
        self.templates
            .with_template_mut(tmpl, |t| t.update_group(group, interval))?
    }

    pub fn del_template_group(&self, tmpl: &str, group: &str) -> GatewayResult<()> {
        self.templates.with_template_mut(tmpl, |t| t.del_group(group))
    }

    pub fn get_template_group(&self, tmpl: &str) -> GatewayResult<Vec<GroupInfo>> {
        self.templates.with_template(tmpl, |t| {
            let mut groups = Vec::new();
            t.for_each_group(|name, g| {
                groups.push(GroupInfo {
                    name: name.to_string(),
                    interval: g.get_interval(),
                    tag_count: g.tag_count(),
                });
            });
            groups
        })
    }

    /// Applies `tags` in order; on the first validator failure, returns the
    /// 0-based index of the failing tag and its error. Tags before that
    /// index are already inserted.
    pub fn add_template_tags(
        &self,
        tmpl: &str,
        group: &str,
        tags: Vec<TagDef>,
    ) -> GatewayResult<Result<(), (usize, GatewayError)>> {
        self.templates.with_template_mut(tmpl, |t| {
            for (i, tag) in tags.into_iter().enumerate() {
                if let Err(e) = t.add_tag(group, tag) {
                    return Err((i, e));
                }
            }
            Ok(())
        })
    }

    pub fn update_template_tags(
        &self,
        tmpl: &str,
        group: &str,
        tags: Vec<TagDef>,
    ) -> GatewayResult<Result<(), (usize, GatewayError)>> {
        self.templates.with_template_mut(tmpl, |t| {
            for (i, tag) in tags.into_iter().enumerate() {
                if let Err(e) = t.update_tag(group, tag) {
                    return Err((i, e));
                }
            }
            Ok(())
        })
    }

    /// Best-effort: an unknown tag name is silently skipped, matching the
    /// original's "only possible error is not-found, so ignore and continue".
    pub fn del_template_tags(&self, tmpl: &str, group: &str, tags: Vec<String>) -> GatewayResult<()> {
        self.templates.with_template_mut(tmpl, |t| {
            for tag in tags {
                let _ = t.del_tag(group, &tag);
            }
        })
    }

    pub fn get_template_tags(
        &self,
        tmpl: &str,
        group: &str,
        name_filter: Option<&str>,
    ) -> GatewayResult<Vec<TagDef>> {
        self.templates.with_template(tmpl, |t| t.get_tags(group, name_filter))?
    }

    /// Materializes a template's groups and tags onto a freshly created
    /// driver node. Any failure rolls the node back with `del_node`.
    pub fn instantiate_template(&self, tmpl: &str, node: &str) -> GatewayResult<()> {
        let plugin = self
            .templates
            .with_template(tmpl, |t| t.plugin_name().to_string())?;

        self.add_node(node, &plugin, false)?;

        let result = self.materialize_template(tmpl, node);
        if let Err(e) = result {
            let _ = self.del_node(node);
            return Err(e);
        }
        info!(template = tmpl, node, "template instantiated");
        Ok(())
    }

    fn materialize_template(&self, tmpl: &str, node: &str) -> GatewayResult<()> {
        let is_driver = self
            .nodes
            .with_adapter(node, |a| a.is_driver())
            .ok_or_else(|| GatewayError::NodeNotExist(node.to_string()))?;
        if !is_driver {
            return Err(GatewayError::GroupNotAllow(node.to_string()));
        }

        let groups = self
            .templates
            .with_template(tmpl, |t| {
                let mut out = Vec::new();
                t.for_each_group(|name, g| {
                    out.push((name.to_string(), g.get_interval(), g.get_tags()));
                });
                out
            })?;

        self.nodes
            .with_adapter_mut(node, |adapter| -> GatewayResult<()> {
                let driver = adapter.driver_mut().expect("checked is_driver above");
                for (name, interval, tags) in groups {
                    driver.add_group(&name, interval)?;
                    for tag in tags {
                        driver.add_tag(&name, tag)?;
                    }
                }
                Ok(())
            })
            .ok_or_else(|| GatewayError::NodeNotExist(node.to_string()))?
    }

    pub fn get_driver_group(&self) -> Vec<DriverGroupInfo> {
        let mut out = Vec::new();
        for driver in self.nodes.get(NodeKind::Driver) {
            self.nodes.with_adapter(&driver.name, |adapter| {
                if let Some(state) = adapter.driver() {
                    for (gname, group) in state.groups() {
                        out.push(DriverGroupInfo {
                            driver: driver.name.clone(),
                            group: gname.clone(),
                            interval: group.get_interval(),
                            tag_count: group.tag_count(),
                        });
                    }
                }
            });
        }
        out
    }

    // ---- Subscriptions --------------------------------------------------

    pub fn subscribe(
        &self,
        app: &str,
        driver: &str,
        group: &str,
        params: Option<String>,
    ) -> GatewayResult<()> {
        if app == MONITOR_NODE {
            return Err(GatewayError::NodeNotAllowSubscribe(app.to_string()));
        }
        let app_kind = self
            .nodes
            .with_adapter(app, |a| a.kind())
            .ok_or_else(|| GatewayError::NodeNotExist(app.to_string()))?;
        if app_kind != NodeKind::App {
            return Err(GatewayError::NodeNotAllowSubscribe(app.to_string()));
        }
        self.bind_subscription(driver, app, group, params, SubscriptionKind::Normal)
    }

    pub fn unsubscribe(&self, app: &str, driver: &str, group: &str) -> GatewayResult<()> {
        self.subscriptions.unsub(driver, app, group);
        Ok(())
    }

    /// Builds and hands a `SUBSCRIBE_GROUP` control message to the
    /// transport. A send failure is logged and swallowed: the subscription
    /// itself is already durable in `SubscriptionRegistry`.
    pub fn send_subscribe(
        &self,
        app: &str,
        driver: &str,
        group: &str,
        params: Option<String>,
    ) -> GatewayResult<()> {
        let pipe = self
            .nodes
            .get_pipe(app)
            .ok_or_else(|| GatewayError::NodeNotExist(app.to_string()))?;
        let msg = Message {
            sender: "manager".to_string(),
            receiver: app.to_string(),
            body: MessageBody::SubscribeGroup(SubscribeGroupBody {
                app: app.to_string(),
                driver: driver.to_string(),
                group: group.to_string(),
                params,
            }),
        };
        if let Err(e) = self.transport.send(pipe, msg) {
            warn!(app, driver, group, error = %e, "send_subscribe failed, subscription persists");
        }
        Ok(())
    }

    pub fn get_sub_group(&self, app: &str) -> Vec<SubGroupInfo> {
        self.subscriptions.get(app)
    }

    pub fn add_ndriver_map(&self, ndriver: &str, driver: &str, group: &str) -> GatewayResult<()> {
        let kind = self
            .nodes
            .with_adapter(ndriver, |a| a.kind())
            .ok_or_else(|| GatewayError::NodeNotExist(ndriver.to_string()))?;
        if kind != NodeKind::NDriver {
            return Err(GatewayError::NodeNotAllowMap(ndriver.to_string()));
        }
        self.bind_subscription(driver, ndriver, group, None, SubscriptionKind::NDriverMap)
    }

    pub fn del_ndriver_map(&self, ndriver: &str, driver: &str, group: &str) -> GatewayResult<()> {
        self.unsubscribe(ndriver, driver, group)
    }

    pub fn get_ndriver_maps(&self, ndriver: &str) -> GatewayResult<Vec<SubGroupInfo>> {
        let kind = self
            .nodes
            .with_adapter(ndriver, |a| a.kind())
            .ok_or_else(|| GatewayError::NodeNotExist(ndriver.to_string()))?;
        if kind != NodeKind::NDriver {
            return Err(GatewayError::NodeNotAllowMap(ndriver.to_string()));
        }
        Ok(self.subscriptions.get_ndriver_maps(ndriver))
    }

    /// Reads every tag in `(driver, group)` that changed since the last
    /// report and fans the snapshot out to each subscriber's pipe. Meant to
    /// be called once per group per poll tick by the driver worker; a no-op
    /// if nothing changed or nobody subscribes.
    pub fn report_group(&self, driver: &str, group: &str, tags: &[TagDef]) {
        let subscribers = self.subscriptions.subscribers(driver, group);
        if subscribers.is_empty() {
            return;
        }
        let changed = self.nodes.with_adapter(driver, |a| {
            a.driver()
                .map(|state| {
                    tags.iter()
                        .filter_map(|t| {
                            state
                                .cache
                                .get_changed(group, &t.name)
                                .map(|v| (t.name.clone(), v.value))
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        });
        let Some(changed) = changed else {
            return;
        };
        if changed.is_empty() {
            return;
        }
        for (app, pipe) in subscribers {
            let msg = Message {
                sender: driver.to_string(),
                receiver: app.clone(),
                body: MessageBody::DataReport(DataReportBody {
                    driver: driver.to_string(),
                    group: group.to_string(),
                    values: changed.clone(),
                }),
            };
            if let Err(e) = self.transport.send(pipe, msg) {
                warn!(driver, group, app, error = %e, "data report send failed");
            }
        }
    }

    fn bind_subscription(
        &self,
        driver: &str,
        app: &str,
        group: &str,
        params: Option<String>,
        kind: SubscriptionKind,
    ) -> GatewayResult<()> {
        let group_exists = self
            .nodes
            .with_adapter(driver, |a| {
                a.driver().map(|d| d.group_exists(group)).unwrap_or(false)
            })
            .ok_or_else(|| GatewayError::NodeNotExist(driver.to_string()))?;
        if !group_exists {
            return Err(GatewayError::GroupNotExist(group.to_string()));
        }
        let pipe = self
            .nodes
            .get_pipe(app)
            .ok_or_else(|| GatewayError::NodeNotExist(app.to_string()))?;
        self.subscriptions.sub(driver, app, group, params, pipe, kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::descriptor::{ModuleDescriptor, NodeKind};
    use crate::plugin::loader::register_builtin;
    use crate::tags::group::TagDef;
    use crate::value::TypeTag;

    fn register_driver(name: &'static str) {
        struct NoopDriver(&'static str);
        impl crate::plugin::Plugin for NoopDriver {
            fn descriptor(&self) -> ModuleDescriptor {
                ModuleDescriptor {
                    name: self.0.to_string(),
                    kind: NodeKind::Driver,
                    single: false,
                }
            }
        }
        register_builtin(
            name,
            ModuleDescriptor {
                name: name.to_string(),
                kind: NodeKind::Driver,
                single: false,
            },
            move || Ok(Box::new(NoopDriver(name))),
        );
    }

    fn register_app(name: &'static str) {
        struct NoopApp;
        impl crate::plugin::Plugin for NoopApp {
            fn descriptor(&self) -> ModuleDescriptor {
                ModuleDescriptor {
                    name: "test.app".to_string(),
                    kind: NodeKind::App,
                    single: false,
                }
            }
        }
        register_builtin(
            name,
            ModuleDescriptor {
                name: name.to_string(),
                kind: NodeKind::App,
                single: false,
            },
            move || Ok(Box::new(NoopApp)),
        );
    }

    fn sample_tag(name: &str) -> TagDef {
        TagDef::new(name, TypeTag::Int32, format!("addr-{name}"))
    }

    fn manager() -> Manager {
        let transport: Arc<dyn Transport> = Arc::new(crate::transport::InMemoryTransport::new());
        Manager::new(transport)
    }

    #[test]
    fn add_node_rejects_single_plugin() {
        let mgr = manager();
        register_builtin(
            "test.manager.single2",
            ModuleDescriptor {
                name: "test.manager.single2".to_string(),
                kind: NodeKind::Driver,
                single: true,
            },
            || {
                struct P;
                impl crate::plugin::Plugin for P {
                    fn descriptor(&self) -> ModuleDescriptor {
                        ModuleDescriptor {
                            name: "test.manager.single2".to_string(),
                            kind: NodeKind::Driver,
                            single: true,
                        }
                    }
                }
                Ok(Box::new(P) as Box<dyn crate::plugin::Plugin>)
            },
        );
        mgr.add_plugin("builtin://test.manager.single2").unwrap();
        let err = mgr.add_node("n1", "test.manager.single2", false).unwrap_err();
        assert!(matches!(err, GatewayError::LibraryNotAllowCreateInstance(_)));
    }

    #[test]
    fn del_node_releases_plugin_and_subscriptions() {
        register_driver("test.manager.drv1");
        register_app("test.manager.app1");
        let mgr = manager();
        mgr.add_plugin("builtin://test.manager.drv1").unwrap();
        mgr.add_plugin("builtin://test.manager.app1").unwrap();
        mgr.add_node("drv", "test.manager.drv1", true).unwrap();
        mgr.add_node("app", "test.manager.app1", true).unwrap();
        mgr.nodes()
            .with_adapter_mut("drv", |a| a.driver_mut().unwrap().add_group("g", 1000))
            .unwrap()
            .unwrap();
        mgr.subscribe("app", "drv", "g", None).unwrap();

        mgr.del_node("drv").unwrap();
        assert!(mgr.get_sub_group("app").is_empty());
        // the plugin is free to be removed now that no node holds an instance
        mgr.del_plugin("test.manager.drv1").unwrap();
    }

    #[test]
    fn subscribe_rejects_reserved_monitor_name() {
        register_driver("test.manager.drv2");
        let mgr = manager();
        mgr.add_plugin("builtin://test.manager.drv2").unwrap();
        mgr.add_node("drv", "test.manager.drv2", true).unwrap();
        mgr.nodes()
            .with_adapter_mut("drv", |a| a.driver_mut().unwrap().add_group("g", 1000))
            .unwrap()
            .unwrap();
        let err = mgr.subscribe(MONITOR_NODE, "drv", "g", None).unwrap_err();
        assert!(matches!(err, GatewayError::NodeNotAllowSubscribe(_)));
    }

    #[test]
    fn rename_app_preserves_subscription_across_manager() {
        register_driver("test.manager.drv3");
        register_app("test.manager.app3");
        let mgr = manager();
        mgr.add_plugin("builtin://test.manager.drv3").unwrap();
        mgr.add_plugin("builtin://test.manager.app3").unwrap();
        mgr.add_node("drv", "test.manager.drv3", true).unwrap();
        mgr.add_node("app", "test.manager.app3", true).unwrap();
        mgr.nodes()
            .with_adapter_mut("drv", |a| a.driver_mut().unwrap().add_group("g", 1000))
            .unwrap()
            .unwrap();
        mgr.subscribe("app", "drv", "g", None).unwrap();

        mgr.update_node_name("app", "app-renamed").unwrap();
        let subs = mgr.get_sub_group("app-renamed");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].driver, "drv");
    }

    #[test]
    fn instantiate_template_rolls_back_node_on_group_interval_error() {
        register_driver("test.manager.tmpl1");
        let mgr = manager();
        mgr.add_plugin("builtin://test.manager.tmpl1").unwrap();
        // `Template::add_group` enforces no interval floor, so a too-low
        // interval is only caught once `instantiate_template` materializes
        // the template's groups onto the real driver node.
        mgr.add_template(
            "tmpl",
            "test.manager.tmpl1",
            vec![TemplateGroupSpec {
                name: "g".to_string(),
                interval: 10,
                tags: vec![sample_tag("t1")],
            }],
        )
        .unwrap();

        let err = mgr.instantiate_template("tmpl", "node1").unwrap_err();
        assert!(matches!(err, GatewayError::GroupParameterInvalid { .. }));
        assert!(!mgr.nodes().exists("node1"));
    }

    #[test]
    fn report_group_fans_out_only_changed_tags_to_subscribers() {
        register_driver("test.manager.drv4");
        register_app("test.manager.app4");
        let mgr = manager();
        mgr.add_plugin("builtin://test.manager.drv4").unwrap();
        mgr.add_plugin("builtin://test.manager.app4").unwrap();
        mgr.add_node("drv", "test.manager.drv4", true).unwrap();
        mgr.add_node("app", "test.manager.app4", true).unwrap();
        mgr.nodes()
            .with_adapter_mut("drv", |a| a.driver_mut().unwrap().add_group("g", 1000))
            .unwrap()
            .unwrap();
        mgr.subscribe("app", "drv", "g", None).unwrap();

        mgr.nodes().with_adapter_mut("drv", |a| {
            let driver = a.driver_mut().unwrap();
            driver.cache.add("g", "t1", crate::value::TagValue::Int32(1));
            driver.cache.update("g", "t1", 1, crate::value::TagValue::Int32(2));
        });

        // report_group doesn't panic with no live receiver registered on
        // this pipe (InMemoryTransport silently logs and drops); the
        // assertion here is that nothing panics and the cache flag clears.
        mgr.report_group("drv", "g", &[sample_tag("t1")]);
        let still_changed = mgr
            .nodes()
            .with_adapter("drv", |a| a.driver().unwrap().cache.get_changed("g", "t1"))
            .unwrap();
        assert!(still_changed.is_none());
    }
}
