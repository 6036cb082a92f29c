//! `Group`: a named collection of tag definitions sharing a poll interval.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::value::TypeTag;

/// Minimum allowed poll interval, in milliseconds, for a group materialized
/// on a live driver. Below this the scheduler could not keep up with its own
/// tick granularity.
pub const GROUP_INTERVAL_LIMIT: u32 = 100;

/// A single tag definition, opaque to `Group` itself: it is forwarded
/// verbatim to the owning plugin's tag validator before insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDef {
    pub name: String,
    pub type_tag: TypeTag,
    pub precision: u8,
    pub address: String,
    pub readable: bool,
    pub writable: bool,
    pub description: Option<String>,
}

impl TagDef {
    pub fn new(name: impl Into<String>, type_tag: TypeTag, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag,
            precision: 0,
            address: address.into(),
            readable: true,
            writable: false,
            description: None,
        }
    }
}

/// An ordered collection of tags sharing a poll interval. Tag insertion
/// order is preserved (a `BTreeMap` would reorder by name; we want the order
/// tags were added in, matching the original `UT_array`-backed group).
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    interval_ms: u32,
    tags: Vec<(String, TagDef)>,
}

impl Group {
    pub fn new(name: impl Into<String>, interval_ms: u32) -> Self {
        Self {
            name: name.into(),
            interval_ms,
            tags: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_interval(&self) -> u32 {
        self.interval_ms
    }

    pub fn set_interval(&mut self, interval_ms: u32) {
        self.interval_ms = interval_ms;
    }

    pub fn add_tag(&mut self, tag: TagDef) -> GatewayResult<()> {
        if self.tags.iter().any(|(name, _)| name == &tag.name) {
            return Err(GatewayError::TagExist(tag.name));
        }
        self.tags.push((tag.name.clone(), tag));
        Ok(())
    }

    pub fn update_tag(&mut self, tag: TagDef) -> GatewayResult<()> {
        match self.tags.iter_mut().find(|(name, _)| name == &tag.name) {
            Some((_, slot)) => {
                *slot = tag;
                Ok(())
            }
            None => Err(GatewayError::TagNotExist(tag.name)),
        }
    }

    pub fn del_tag(&mut self, name: &str) {
        self.tags.retain(|(tag_name, _)| tag_name != name);
    }

    pub fn get_tags(&self) -> Vec<TagDef> {
        self.tags.iter().map(|(_, tag)| tag.clone()).collect()
    }

    /// Tags whose name contains `substring`, in insertion order.
    pub fn query_tag(&self, substring: &str) -> Vec<TagDef> {
        self.tags
            .iter()
            .filter(|(name, _)| name.contains(substring))
            .map(|(_, tag)| tag.clone())
            .collect()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns a `(name -> TagDef)` view for callers that want lookups by
    /// name without caring about insertion order (e.g. the driver worker
    /// resolving an address by tag name).
    pub fn tags_by_name(&self) -> BTreeMap<&str, &TagDef> {
        self.tags
            .iter()
            .map(|(name, tag)| (name.as_str(), tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tag(name: &str) -> TagDef {
        TagDef::new(name, TypeTag::Int32, format!("addr-{name}"))
    }

    #[test]
    fn add_tag_rejects_duplicates() {
        let mut group = Group::new("g", 1000);
        group.add_tag(sample_tag("t1")).unwrap();
        let err = group.add_tag(sample_tag("t1")).unwrap_err();
        assert_eq!(err, GatewayError::TagExist("t1".into()));
    }

    #[test]
    fn update_tag_rejects_unknown() {
        let mut group = Group::new("g", 1000);
        let err = group.update_tag(sample_tag("missing")).unwrap_err();
        assert_eq!(err, GatewayError::TagNotExist("missing".into()));
    }

    #[test]
    fn query_tag_matches_substring() {
        let mut group = Group::new("g", 1000);
        group.add_tag(sample_tag("Temperature")).unwrap();
        group.add_tag(sample_tag("Pressure")).unwrap();
        let found = group.query_tag("Temp");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Temperature");
    }

    #[test]
    fn insertion_order_preserved() {
        let mut group = Group::new("g", 1000);
        group.add_tag(sample_tag("z")).unwrap();
        group.add_tag(sample_tag("a")).unwrap();
        let names: Vec<_> = group.get_tags().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
