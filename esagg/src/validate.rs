//! Structural checks of a wire-level request tree.

use crate::config::InferenceConfig;
use crate::registry::{registry, AggregationKind, AggregationKindRegistry, Nesting};
use crate::request::{AggregationNode, NamedAggregations, RawAggregation, RawAggregations, RawEntry, META_KEY};
use crate::shape::Shape;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;

/// Characters Elasticsearch reserves in aggregation names for `buckets_path`.
const RESERVED_NAME_CHARS: [char; 3] = ['[', ']', '>'];

/// Parameter of `scripted_metric` carrying the caller's declared result shape.
pub const RESULT_DECLARATION_PARAM: &str = "result_doc";
/// Camel-case spelling accepted for `result_doc`.
pub const RESULT_DECLARATION_ALIAS: &str = "resultDoc";

/// Checks that every node of a request tree selects exactly one known kind,
/// that names are unique and well-formed, and that sub-aggregations only
/// appear where the kind allows them.
///
/// The whole tree is rejected on the first offending node.
pub struct ExclusivityValidator {
    registry: &'static AggregationKindRegistry,
    max_depth: usize,
    enforce_name_syntax: bool,
}

impl Default for ExclusivityValidator {
    fn default() -> Self {
        Self::new(&InferenceConfig::default())
    }
}

impl ExclusivityValidator {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            registry: registry(),
            max_depth: config.max_depth,
            enforce_name_syntax: config.enforce_name_syntax,
        }
    }

    pub fn validate(&self, aggs: &RawAggregations) -> Result<()> {
        self.check(aggs).map(|_| ())
    }

    /// Validate `aggs` and return the kind-tagged tree.
    pub fn check(&self, aggs: &RawAggregations) -> Result<NamedAggregations> {
        let checked = self.check_level(aggs, None, 1)?;
        tracing::debug!("Validated {} top-level aggregations", checked.len());
        Ok(checked)
    }

    /// Validate a single node (and its subtree) named `name`.
    pub fn check_node(&self, name: &str, node: &RawAggregation) -> Result<AggregationNode> {
        self.check_name(name, name)?;
        self.check_node_at(name, name, node, 1)
    }

    fn check_level(
        &self,
        aggs: &RawAggregations,
        parent: Option<&str>,
        depth: usize,
    ) -> Result<NamedAggregations> {
        let mut seen = HashSet::new();
        let mut checked = NamedAggregations::new();

        for (name, node) in &aggs.entries {
            let path = match parent {
                Some(parent) => format!("{}>{}", parent, name),
                None => name.clone(),
            };
            self.check_name(name, &path)?;
            if !seen.insert(name.as_str()) {
                return Err(Error::DuplicateName {
                    name: name.clone(),
                    path,
                });
            }
            let node = self.check_node_at(name, &path, node, depth)?;
            checked.insert(name.clone(), node)?;
        }
        Ok(checked)
    }

    pub(crate) fn check_name(&self, name: &str, path: &str) -> Result<()> {
        let reserved = self.enforce_name_syntax && name.contains(RESERVED_NAME_CHARS);
        if name.is_empty() || reserved {
            return Err(Error::InvalidAggregationName {
                name: name.to_string(),
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn check_node_at(
        &self,
        name: &str,
        path: &str,
        raw: &RawAggregation,
        depth: usize,
    ) -> Result<AggregationNode> {
        if depth > self.max_depth {
            return Err(Error::MaxDepthExceeded {
                name: name.to_string(),
                path: path.to_string(),
                limit: self.max_depth,
            });
        }

        let mut kinds = Vec::new();
        let mut subs = Vec::new();
        let mut metas = Vec::new();
        for (key, entry) in &raw.entries {
            match entry {
                RawEntry::Aggregations(aggs) => subs.push((key.as_str(), aggs)),
                RawEntry::Value(value) if key == META_KEY => metas.push(value),
                RawEntry::Value(value) => kinds.push((key.as_str(), value)),
            }
        }

        if subs.len() > 1 {
            return Err(ambiguous(name, path, subs.iter().map(|(k, _)| *k)));
        }
        let (kind_name, params) = match kinds.as_slice() {
            [] => {
                return Err(Error::EmptyKind {
                    name: name.to_string(),
                    path: path.to_string(),
                })
            }
            [single] => *single,
            many => return Err(ambiguous(name, path, many.iter().map(|(k, _)| *k))),
        };

        let spec = self
            .registry
            .lookup(kind_name)
            .map_err(|unknown| Error::UnknownKind {
                name: name.to_string(),
                path: path.to_string(),
                kind: unknown.0,
            })?;

        let invalid = |kind: &str, reason: String| Error::InvalidParams {
            name: name.to_string(),
            path: path.to_string(),
            kind: kind.to_string(),
            reason,
        };

        let mut params = match params {
            Value::Object(map) => map.clone(),
            other => {
                return Err(invalid(
                    kind_name,
                    format!("expected an object, found {}", json_type(other)),
                ))
            }
        };

        let meta = match metas.as_slice() {
            [] => None,
            [Value::Object(meta)] => Some(meta.clone()),
            [other] => {
                return Err(invalid(
                    META_KEY,
                    format!("expected an object, found {}", json_type(other)),
                ))
            }
            _ => return Err(invalid(META_KEY, "'meta' is given more than once".to_string())),
        };

        let aggs = match subs.first() {
            Some((_, sub)) if !sub.is_empty() => {
                if spec.nesting == Nesting::Forbidden {
                    return Err(Error::IllegalNesting {
                        name: name.to_string(),
                        path: path.to_string(),
                        kind: kind_name.to_string(),
                    });
                }
                self.check_level(sub, Some(path), depth + 1)?
            }
            _ => NamedAggregations::new(),
        };

        let declared_result = match spec.kind {
            AggregationKind::ScriptedMetric => {
                let invalid = |reason: String| Error::InvalidResultDeclaration {
                    name: name.to_string(),
                    path: path.to_string(),
                    reason,
                };
                let declaration = match (
                    params.remove(RESULT_DECLARATION_PARAM),
                    params.remove(RESULT_DECLARATION_ALIAS),
                ) {
                    (Some(_), Some(_)) => {
                        return Err(invalid(format!(
                            "both '{}' and '{}' given",
                            RESULT_DECLARATION_PARAM, RESULT_DECLARATION_ALIAS
                        )))
                    }
                    (snake, camel) => snake.or(camel),
                };
                declaration
                    .map(|declaration| Shape::from_descriptor(&declaration).map_err(invalid))
                    .transpose()?
            }
            _ => None,
        };

        Ok(AggregationNode {
            kind: spec.kind,
            params,
            meta,
            aggs,
            declared_result,
        })
    }
}

fn ambiguous<'k>(name: &str, path: &str, keys: impl Iterator<Item = &'k str>) -> Error {
    Error::AmbiguousKind {
        name: name.to_string(),
        path: path.to_string(),
        keys: keys.map(str::to_string).collect(),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl NamedAggregations {
    /// Parse and validate wire JSON with the default limits.
    pub fn from_json_str(json: &str) -> Result<Self> {
        ExclusivityValidator::default().check(&RawAggregations::from_json_str(json)?)
    }
}
