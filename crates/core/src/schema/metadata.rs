//! Descriptive metadata attached to schema fields.

use crate::value::Value;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;

/// Tags and named attributes describing a field.
///
/// Metadata travels with the schema to subscribers; it never affects how
/// values are stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    tags: BTreeSet<String>,
    attributes: BTreeMap<String, Value>,
}

impl Metadata {
    /// Creates empty metadata.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sets an attribute, replacing any previous value under `name`.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns the tags in ascending order.
    #[inline]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Returns the attributes by name.
    #[inline]
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    #[inline]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    #[inline]
    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns true if there are no tags and no attributes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = Metadata::new()
            .tag("key")
            .tag("key")
            .attribute("precision", 4)
            .attribute("unit", "usd");
        assert_eq!(meta.tags().len(), 1);
        assert!(meta.has_tag("key"));
        assert!(!meta.has_tag("hidden"));
        assert_eq!(meta.get_attribute("precision"), Some(&Value::Int32(4)));
        assert_eq!(meta.get_attribute("unit"), Some(&Value::from("usd")));
        assert!(!meta.is_empty());
        assert!(Metadata::new().is_empty());
    }
}
