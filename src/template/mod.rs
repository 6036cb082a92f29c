//! Reusable blueprints of groups+tags bound to a plugin, used to instantiate
//! identically-configured driver nodes in one call. Mirrors
//! `neu_template_t` / `neu_template_manager_t`.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{GatewayError, GatewayResult};
use crate::plugin::{Plugin, PluginInstance};
use crate::tags::group::{Group, TagDef, GROUP_INTERVAL_LIMIT};

/// A named group of tags plus the plugin instance used to validate every
/// tag inserted into it.
pub struct Template {
    name: String,
    plugin_name: String,
    plugin: Box<dyn Plugin>,
    groups: Vec<(String, Group)>,
}

impl Template {
    pub fn new(name: impl Into<String>, instance: PluginInstance) -> Self {
        Self {
            name: name.into(),
            plugin_name: instance.descriptor.name,
            plugin: instance.plugin,
            groups: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn add_group(&mut self, name: &str, interval_ms: u32) -> GatewayResult<()> {
        if self.groups.iter().any(|(n, _)| n == name) {
            return Err(GatewayError::GroupExist(name.to_string()));
        }
        self.groups
            .push((name.to_string(), Group::new(name, interval_ms)));
        Ok(())
    }

    pub fn update_group(&mut self, name: &str, interval_ms: u32) -> GatewayResult<()> {
        self.group_mut(name)?.set_interval(interval_ms);
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

    fn group_mut(&mut self, name: &str) -> GatewayResult<&mut Group> {
        self.groups
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, g)| g)
            .ok_or_else(|| GatewayError::GroupNotExist(name.to_string()))
    }

    /// Validates `tag` against the bound plugin before inserting it.
    pub fn add_tag(&mut self, group: &str, tag: TagDef) -> GatewayResult<()> {
        self.plugin.tag_validator(&tag)?;
        self.group_mut(group)?.add_tag(tag)
    }

    pub fn update_tag(&mut self, group: &str, tag: TagDef) -> GatewayResult<()> {
        self.plugin.tag_validator(&tag)?;
        self.group_mut(group)?.update_tag(tag)
    }

    pub fn del_tag(&mut self, group: &str, tag: &str) -> GatewayResult<()> {
        self.group_mut(group)?.del_tag(tag);
        Ok(())
    }

    pub fn get_tags(&self, group: &str, name_filter: Option<&str>) -> GatewayResult<Vec<TagDef>> {
        let group = self.group(group)?;
        Ok(match name_filter {
            Some(substr) if !substr.is_empty() => group.query_tag(substr),
            _ => group.get_tags(),
        })
    }

    pub fn for_each_group(&self, mut f: impl FnMut(&str, &Group)) {
        for (name, group) in &self.groups {
            f(name, group);
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[derive(Default)]
pub struct TemplateRegistry {
    templates: Mutex<HashMap<String, Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, template: Template) -> GatewayResult<()> {
        let mut templates = self.templates.lock();
        if templates.contains_key(template.name()) {
            return Err(GatewayError::TemplateExist(template.name().to_string()));
        }
        templates.insert(template.name().to_string(), template);
        Ok(())
    }

    pub fn del(&self, name: &str) -> GatewayResult<()> {
        self.templates
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GatewayError::TemplateNotFound(name.to_string()))
    }

    pub fn clear(&self) {
        self.templates.lock().clear();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.templates.lock().contains_key(name)
    }

    pub fn with_template<R>(&self, name: &str, f: impl FnOnce(&Template) -> R) -> GatewayResult<R> {
        self.templates
            .lock()
            .get(name)
            .map(f)
            .ok_or_else(|| GatewayError::TemplateNotFound(name.to_string()))
    }

    pub fn with_template_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Template) -> R,
    ) -> GatewayResult<R> {
        self.templates
            .lock()
            .get_mut(name)
            .map(f)
            .ok_or_else(|| GatewayError::TemplateNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<(String, String)> {
        self.templates
            .lock()
            .values()
            .map(|t| (t.name().to_string(), t.plugin_name().to_string()))
            .collect()
    }
}

/// Group interval floor enforced at instantiation time, re-exported here so
/// callers building `SubscriptionBootstrap`/template fixtures don't have to
/// reach into `tags::group` directly.
pub const TEMPLATE_GROUP_INTERVAL_LIMIT: u32 = GROUP_INTERVAL_LIMIT;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::descriptor::{ModuleDescriptor, NodeKind};
    use crate::plugin::abi::Plugin as PluginTrait;
    use crate::tags::group::TagDef;
    use crate::value::TypeTag;

    struct RejectingPlugin;
    impl PluginTrait for RejectingPlugin {
        fn descriptor(&self) -> ModuleDescriptor {
            ModuleDescriptor {
                name: "test.rejecting".into(),
                kind: NodeKind::Driver,
                single: false,
            }
        }

        fn tag_validator(&self, tag: &TagDef) -> GatewayResult<()> {
            if tag.name == "bad" {
                Err(GatewayError::TagInvalid("bad tag name".into()))
            } else {
                Ok(())
            }
        }
    }

    fn instance(plugin: Box<dyn Plugin>) -> PluginInstance {
        let descriptor = plugin.descriptor();
        PluginInstance { plugin, descriptor }
    }

    #[test]
    fn add_tag_surfaces_validator_error_verbatim() {
        let mut template = Template::new("t1", instance(Box::new(RejectingPlugin)));
        template.add_group("g", 1000).unwrap();
        let err = template
            .add_tag("g", TagDef::new("bad", TypeTag::Int32, "addr"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::TagInvalid(_)));
    }

    #[test]
    fn add_group_rejects_duplicate() {
        let mut template = Template::new("t1", instance(Box::new(RejectingPlugin)));
        template.add_group("g", 1000).unwrap();
        let err = template.add_group("g", 2000).unwrap_err();
        assert!(matches!(err, GatewayError::GroupExist(_)));
    }

    #[test]
    fn registry_round_trips_group_order() {
        let registry = TemplateRegistry::new();
        let mut template = Template::new("t1", instance(Box::new(RejectingPlugin)));
        template.add_group("g1", 1000).unwrap();
        template.add_group("g2", 2000).unwrap();
        registry.add(template).unwrap();

        let order = registry
            .with_template("t1", |t| {
                let mut names = Vec::new();
                t.for_each_group(|name, _| names.push(name.to_string()));
                names
            })
            .unwrap();
        assert_eq!(order, vec!["g1", "g2"]);
    }
}
