//! Shared builders for unit tests.

use std::collections::BTreeMap;

use crate::element::{Element, ElementType};

/// A bare node at the given position.
pub(crate) fn node(id: i64, lat: f64, lon: f64) -> Element {
    Element {
        element_type: ElementType::Node,
        id,
        lat,
        lon,
        center: None,
        tags: BTreeMap::new(),
        elevation_fetched: None,
    }
}

/// A node with a single tag.
pub(crate) fn tagged_node(id: i64, lat: f64, lon: f64, key: &str, value: &str) -> Element {
    let mut e = node(id, lat, lon);
    e.tags.insert(key.to_string(), value.to_string());
    e
}
