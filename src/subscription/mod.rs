//! The subscription graph: a directed many-to-many relation between
//! `(driver, group)` and the set of apps (or ndrivers, via the distinct
//! map API) consuming it. Mirrors `neu_subscribe_manager_t`.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

use crate::transport::PipeHandle;

/// Distinguishes a subscription created through `subscribe` from one
/// created through `add_ndriver_map` — both live in the same table, but
/// `get_ndriver_maps` only returns the latter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Normal,
    NDriverMap,
}

#[derive(Debug, Clone)]
struct Entry {
    app: String,
    params: Option<String>,
    pipe: PipeHandle,
    kind: SubscriptionKind,
}

/// One subscription as returned to callers: `(driver, group)` is implicit
/// in how `get`/`get_ndriver_maps` are queried, so only the remaining
/// fields are surfaced.
#[derive(Debug, Clone, Serialize)]
pub struct SubGroupInfo {
    pub driver: String,
    pub group: String,
    pub params: Option<String>,
}

type Key = (String, String);

#[derive(Default)]
pub struct SubscriptionRegistry {
    // (driver, group) -> entries, one per subscribing app.
    by_group: Mutex<HashMap<Key, Vec<Entry>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent on `(driver, app, group)`: a re-`sub` overwrites `params`
    /// and `pipe` in place rather than creating a second entry.
    pub fn sub(
        &self,
        driver: &str,
        app: &str,
        group: &str,
        params: Option<String>,
        pipe: PipeHandle,
        kind: SubscriptionKind,
    ) {
        let mut by_group = self.by_group.lock();
        let entries = by_group
            .entry((driver.to_string(), group.to_string()))
            .or_default();
        match entries.iter_mut().find(|e| e.app == app) {
            Some(existing) => {
                existing.params = params;
                existing.pipe = pipe;
                existing.kind = kind;
            }
            None => entries.push(Entry {
                app: app.to_string(),
                params,
                pipe,
                kind,
            }),
        }
    }

    pub fn unsub(&self, driver: &str, app: &str, group: &str) {
        let mut by_group = self.by_group.lock();
        let key = (driver.to_string(), group.to_string());
        if let Some(entries) = by_group.get_mut(&key) {
            entries.retain(|e| e.app != app);
            if entries.is_empty() {
                by_group.remove(&key);
            }
        }
    }

    /// Every `(driver, group, params)` that `app` subscribes to.
    pub fn get(&self, app: &str) -> Vec<SubGroupInfo> {
        self.by_group
            .lock()
            .iter()
            .flat_map(|((driver, group), entries)| {
                entries.iter().filter(|e| e.app == app).map(move |e| SubGroupInfo {
                    driver: driver.clone(),
                    group: group.clone(),
                    params: e.params.clone(),
                })
            })
            .collect()
    }

    /// Same query, restricted to subscriptions made through the
    /// ndriver-map API.
    pub fn get_ndriver_maps(&self, ndriver: &str) -> Vec<SubGroupInfo> {
        self.by_group
            .lock()
            .iter()
            .flat_map(|((driver, group), entries)| {
                entries
                    .iter()
                    .filter(|e| e.app == ndriver && e.kind == SubscriptionKind::NDriverMap)
                    .map(move |e| SubGroupInfo {
                        driver: driver.clone(),
                        group: group.clone(),
                        params: e.params.clone(),
                    })
            })
            .collect()
    }

    /// All subscribers of `(driver, group)`, with their cached pipes — used
    /// by a driver's report-tick fan-out.
    pub fn subscribers(&self, driver: &str, group: &str) -> Vec<(String, PipeHandle)> {
        self.by_group
            .lock()
            .get(&(driver.to_string(), group.to_string()))
            .map(|entries| entries.iter().map(|e| (e.app.clone(), e.pipe)).collect())
            .unwrap_or_default()
    }

    /// Drops every subscription where `node` is either the driver or the
    /// app side — used when deleting a node.
    pub fn remove(&self, node: &str) {
        let mut by_group = self.by_group.lock();
        by_group.retain(|(driver, _group), entries| {
            entries.retain(|e| e.app != node);
            driver != node && !entries.is_empty()
        });
    }

    pub fn update_driver_name(&self, old: &str, new: &str) {
        let mut by_group = self.by_group.lock();
        let keys: Vec<Key> = by_group
            .keys()
            .filter(|(driver, _)| driver == old)
            .cloned()
            .collect();
        for key in keys {
            if let Some(entries) = by_group.remove(&key) {
                let new_key = (new.to_string(), key.1);
                by_group.entry(new_key).or_default().extend(entries);
            }
        }
    }

    pub fn update_app_name(&self, old: &str, new: &str) {
        let mut by_group = self.by_group.lock();
        for entries in by_group.values_mut() {
            for entry in entries.iter_mut() {
                if entry.app == old {
                    entry.app = new.to_string();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> PipeHandle {
        PipeHandle::next()
    }

    #[test]
    fn sub_is_idempotent_on_driver_app_group() {
        let registry = SubscriptionRegistry::new();
        let p1 = pipe();
        registry.sub("drv", "app", "g", None, p1, SubscriptionKind::Normal);
        let p2 = pipe();
        registry.sub(
            "drv",
            "app",
            "g",
            Some("x".into()),
            p2,
            SubscriptionKind::Normal,
        );
        let subs = registry.get("app");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].params.as_deref(), Some("x"));
    }

    #[test]
    fn rename_app_preserves_subscriptions() {
        let registry = SubscriptionRegistry::new();
        registry.sub("drv1", "app1", "g1", None, pipe(), SubscriptionKind::Normal);
        registry.update_app_name("app1", "app2");
        assert!(registry.get("app1").is_empty());
        let subs = registry.get("app2");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].driver, "drv1");
        assert_eq!(subs[0].group, "g1");
    }

    #[test]
    fn rename_driver_rekeys_subscriptions() {
        let registry = SubscriptionRegistry::new();
        registry.sub("drv1", "app1", "g1", None, pipe(), SubscriptionKind::Normal);
        registry.update_driver_name("drv1", "drv2");
        let subs = registry.get("app1");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].driver, "drv2");
    }

    #[test]
    fn remove_drops_both_driver_and_app_side() {
        let registry = SubscriptionRegistry::new();
        registry.sub("drv1", "app1", "g1", None, pipe(), SubscriptionKind::Normal);
        registry.sub("drv1", "app2", "g1", None, pipe(), SubscriptionKind::Normal);
        registry.remove("app1");
        assert!(registry.get("app1").is_empty());
        assert_eq!(registry.get("app2").len(), 1);

        registry.remove("drv1");
        assert!(registry.get("app2").is_empty());
    }

    #[test]
    fn ndriver_maps_are_isolated_from_normal_subs() {
        let registry = SubscriptionRegistry::new();
        registry.sub("drv1", "ndrv", "g1", None, pipe(), SubscriptionKind::NDriverMap);
        registry.sub("drv1", "app1", "g2", None, pipe(), SubscriptionKind::Normal);
        let maps = registry.get_ndriver_maps("ndrv");
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].group, "g1");
        assert!(registry.get_ndriver_maps("app1").is_empty());
    }

    #[test]
    fn unsub_removes_single_entry() {
        let registry = SubscriptionRegistry::new();
        registry.sub("drv1", "app1", "g1", None, pipe(), SubscriptionKind::Normal);
        registry.sub("drv1", "app2", "g1", None, pipe(), SubscriptionKind::Normal);
        registry.unsub("drv1", "app1", "g1");
        assert!(registry.get("app1").is_empty());
        assert_eq!(registry.get("app2").len(), 1);
    }
}
