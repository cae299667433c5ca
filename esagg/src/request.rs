//! Aggregation request trees.
//!
//! [`RawAggregations`] mirrors the wire JSON exactly, including repeated names
//! and repeated keys that a plain JSON object would silently collapse.
//! [`NamedAggregations`] is the checked, kind-tagged tree the inferencer works
//! on; it is produced by [`crate::validate::ExclusivityValidator`] or built
//! directly in code.

use crate::registry::AggregationKind;
use crate::shape::Shape;
use crate::{Error, Result};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Keys of an aggregation node that never name a kind.
pub const SUB_AGGREGATION_KEYS: [&str; 2] = ["aggs", "aggregations"];
pub const META_KEY: &str = "meta";

/// Wire-level `{name: node}` level of a request, in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawAggregations {
    pub entries: Vec<(String, RawAggregation)>,
}

/// Wire-level node: every key with its value, in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawAggregation {
    pub entries: Vec<(String, RawEntry)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    /// Value of an `aggs` / `aggregations` key
    Aggregations(RawAggregations),
    Value(Value),
}

impl RawAggregations {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RawAggregation {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

impl<'de> Deserialize<'de> for RawAggregations {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AggregationsVisitor;

        impl<'de> Visitor<'de> for AggregationsVisitor {
            type Value = RawAggregations;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of aggregation names to aggregations")
            }

            fn visit_map<V>(self, mut map: V) -> std::result::Result<RawAggregations, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(name) = map.next_key::<String>()? {
                    entries.push((name, map.next_value::<RawAggregation>()?));
                }
                Ok(RawAggregations { entries })
            }
        }

        deserializer.deserialize_map(AggregationsVisitor)
    }
}

impl<'de> Deserialize<'de> for RawAggregation {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AggregationVisitor;

        impl<'de> Visitor<'de> for AggregationVisitor {
            type Value = RawAggregation;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an aggregation object")
            }

            fn visit_map<V>(self, mut map: V) -> std::result::Result<RawAggregation, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    let entry = if SUB_AGGREGATION_KEYS.contains(&key.as_str()) {
                        RawEntry::Aggregations(map.next_value()?)
                    } else {
                        RawEntry::Value(map.next_value()?)
                    };
                    entries.push((key, entry));
                }
                Ok(RawAggregation { entries })
            }
        }

        deserializer.deserialize_map(AggregationVisitor)
    }
}

/// Checked `{name: node}` level of a request tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedAggregations {
    entries: BTreeMap<String, AggregationNode>,
}

impl NamedAggregations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node` under `name`; names are unique within a level.
    pub fn insert(&mut self, name: impl Into<String>, node: AggregationNode) -> Result<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(Error::DuplicateName {
                path: name.clone(),
                name,
            });
        }
        self.entries.insert(name, node);
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, node: AggregationNode) -> Result<Self> {
        self.insert(name, node)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&AggregationNode> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregationNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wire JSON for this level, without caller-side result declarations.
    pub fn to_request_body(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(name, node)| (name.clone(), node.to_request_body()))
                .collect(),
        )
    }
}

/// One aggregation: a kind, its parameters and optional sub-aggregations.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationNode {
    pub kind: AggregationKind,
    pub params: Map<String, Value>,
    pub meta: Option<Map<String, Value>>,
    pub aggs: NamedAggregations,
    /// Caller-declared `value` shape of a `scripted_metric`
    pub declared_result: Option<Shape>,
}

impl AggregationNode {
    pub fn new(kind: AggregationKind) -> Self {
        Self {
            kind,
            params: Map::new(),
            meta: None,
            aggs: NamedAggregations::new(),
            declared_result: None,
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn with_field(self, field: &str) -> Self {
        self.with_param("field", Value::String(field.to_string()))
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_result_declaration(mut self, shape: Shape) -> Self {
        self.declared_result = Some(shape);
        self
    }

    pub fn with_sub_aggregation(mut self, name: &str, node: AggregationNode) -> Result<Self> {
        self.aggs.insert(name, node)?;
        Ok(self)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }

    /// The `field` parameter, when it is a string.
    pub fn field(&self) -> Option<&str> {
        self.params.get("field").and_then(Value::as_str)
    }

    pub fn to_request_body(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            self.kind.as_str().to_string(),
            Value::Object(self.params.clone()),
        );
        if let Some(meta) = &self.meta {
            body.insert(META_KEY.to_string(), Value::Object(meta.clone()));
        }
        if !self.aggs.is_empty() {
            body.insert("aggs".to_string(), self.aggs.to_request_body());
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_keeps_duplicate_names_and_keys() {
        let raw = RawAggregations::from_json_str(
            r#"{
                "a": {"avg": {"field": "x"}, "sum": {"field": "x"}},
                "a": {"terms": {"field": "y"}, "aggs": {"n": {"max": {"field": "z"}}}}
            }"#,
        )
        .unwrap();

        assert_eq!(raw.names().collect::<Vec<_>>(), vec!["a", "a"]);
        assert_eq!(raw.entries[0].1.keys().collect::<Vec<_>>(), vec!["avg", "sum"]);

        let (key, entry) = &raw.entries[1].1.entries[1];
        assert_eq!(key, "aggs");
        match entry {
            RawEntry::Aggregations(sub) => assert_eq!(sub.names().collect::<Vec<_>>(), vec!["n"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_raw_rejects_non_objects() {
        assert!(RawAggregations::from_json_str("[1]").is_err());
        assert!(RawAggregations::from_json_str(r#"{"a": 3}"#).is_err());
        assert!(RawAggregations::from_json_str(r#"{"a": {"aggs": []}}"#).is_err());
    }

    #[test]
    fn test_builder_and_request_body() {
        let node = AggregationNode::new(AggregationKind::ScriptedMetric)
            .with_param("map_script", json!("state.x = 1"))
            .with_result_declaration(Shape::number());
        let aggs = NamedAggregations::new()
            .with(
                "by_country",
                AggregationNode::new(AggregationKind::Terms)
                    .with_field("user.country")
                    .with_sub_aggregation("scripted", node)
                    .unwrap(),
            )
            .unwrap();

        assert_eq!(
            aggs.to_request_body(),
            json!({
                "by_country": {
                    "terms": {"field": "user.country"},
                    "aggs": {"scripted": {"scripted_metric": {"map_script": "state.x = 1"}}}
                }
            })
        );
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut aggs = NamedAggregations::new();
        aggs.insert("a", AggregationNode::new(AggregationKind::Global)).unwrap();
        let err = aggs
            .insert("a", AggregationNode::new(AggregationKind::Global))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName { name, .. } if name == "a"));
        assert_eq!(aggs.len(), 1);
    }

    #[test]
    fn test_field_accessor() {
        let node = AggregationNode::new(AggregationKind::Avg).with_param("field", json!(3));
        assert_eq!(node.field(), None);
        assert_eq!(
            AggregationNode::new(AggregationKind::Avg).with_field("a.b").field(),
            Some("a.b")
        );
    }
}
