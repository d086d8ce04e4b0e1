//! Structured dump for status tooling.
//!
//! Field names and nesting here are consumed by external tools and must stay
//! stable across releases.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

pub trait Dump {
    fn dump(&self) -> Value;
}

/// Renders a string map as a flat object section.
pub(crate) fn string_section(map: &BTreeMap<String, String>) -> Value {
    let section: Map<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(section)
}

/// Renders a keyed collection of dumpable entities as one object section.
pub(crate) fn object_section<T: Dump>(map: &BTreeMap<String, T>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.dump())).collect()
}
