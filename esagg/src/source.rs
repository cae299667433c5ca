//! `_source` filtering: which part of a matched document a hit carries.

use crate::schema::{DocumentSchema, SchemaNode};
use crate::shape::{Record, Shape};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `_source` parameter of a search or `top_hits` request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceFilter {
    Bool(bool),
    Path(String),
    Paths(Vec<String>),
    Object(SourceFilterObject),
    /// A boolean that is only decided when the request is sent
    #[serde(skip)]
    Deferred,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFilterObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<PathList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<PathList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<PathList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excludes: Option<PathList>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PathList {
    One(String),
    Many(Vec<String>),
}

impl PathList {
    pub fn as_slice(&self) -> &[String] {
        match self {
            PathList::One(p) => std::slice::from_ref(p),
            PathList::Many(v) => v,
        }
    }
}

impl SourceFilterObject {
    fn includes(&self) -> Option<Vec<&str>> {
        if self.include.is_none() && self.includes.is_none() {
            return None;
        }
        Some(
            [&self.include, &self.includes]
                .into_iter()
                .flatten()
                .flat_map(|l| l.as_slice().iter().map(String::as_str))
                .collect(),
        )
    }

    fn excludes(&self) -> impl Iterator<Item = &str> {
        [&self.exclude, &self.excludes]
            .into_iter()
            .flatten()
            .flat_map(|l| l.as_slice().iter().map(String::as_str))
    }
}

/// Computes the document shape a source filter projects out of a schema.
pub struct SourceFilterResolver<'a> {
    schema: &'a DocumentSchema,
}

impl<'a> SourceFilterResolver<'a> {
    pub fn new(schema: &'a DocumentSchema) -> Self {
        Self { schema }
    }

    /// Shape of `_source` in a hit returned under `filter`.
    ///
    /// Overlapping includes keep the widest selection: `["a", "a.b"]` projects
    /// all of `a`. Excludes do not narrow the shape; one that matches nothing
    /// is logged and ignored.
    pub fn project(&self, filter: Option<&SourceFilter>) -> Result<Shape, String> {
        let full = Shape::of_schema(self.schema);
        match filter {
            None => Ok(full.deep_partial()),
            Some(SourceFilter::Bool(false)) => Ok(Shape::empty_record()),
            Some(SourceFilter::Bool(true)) => Ok(full),
            Some(SourceFilter::Deferred) => Ok(Shape::OneOf(vec![Shape::empty_record(), full])),
            Some(SourceFilter::Path(path)) => self.pick(&[path.as_str()]),
            Some(SourceFilter::Paths(paths)) if paths.is_empty() => Ok(full),
            Some(SourceFilter::Paths(paths)) => {
                let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
                self.pick(&paths)
            }
            Some(SourceFilter::Object(obj)) => {
                for path in obj.excludes() {
                    let segments = split_path(path)?;
                    if !matches!(pick_node(self.schema.root(), &segments, path, true), Ok(Some(_))) {
                        tracing::warn!(path, "Source exclude matches no field");
                    }
                }
                match obj.includes() {
                    Some(paths) if !paths.is_empty() => self.pick(&paths),
                    Some(_) => Ok(full),
                    None => Ok(full.deep_partial()),
                }
            }
        }
    }

    fn pick(&self, paths: &[&str]) -> Result<Shape, String> {
        let mut projected = Shape::empty_record();
        for path in paths {
            projected = projected.widen(self.pick_one(path)?);
        }
        Ok(projected)
    }

    fn pick_one(&self, path: &str) -> Result<Shape, String> {
        let segments = split_path(path)?;
        match pick_node(self.schema.root(), &segments, path, false)? {
            Some(shape) => Ok(shape),
            None => Err(format!("source path '{}' matches no field", path)),
        }
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, String> {
    if path.is_empty() {
        return Err("source path is empty".to_string());
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(format!("source path '{}' contains an empty segment", path));
    }
    Ok(segments)
}

/// Project `segments` out of `node`. `Ok(None)` means nothing matched.
///
/// Below a wildcard, a child that cannot carry the rest of the path is
/// skipped instead of failing the whole pattern.
fn pick_node(
    node: &SchemaNode,
    segments: &[&str],
    path: &str,
    expanding: bool,
) -> Result<Option<Shape>, String> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(Some(Shape::of_node(node)));
    };

    match node {
        SchemaNode::Array(item) => {
            Ok(pick_node(item, segments, path, expanding)?.map(Shape::array))
        }
        SchemaNode::Dynamic => Ok(Some(dynamic_pick(segments))),
        SchemaNode::Leaf(_) if expanding => Ok(None),
        SchemaNode::Leaf(_) => Err(format!(
            "source path '{}' continues past a leaf at '{}'",
            path, segment
        )),
        SchemaNode::Object(obj) => {
            let mut record = Record::new();
            if segment.contains('*') {
                let pattern = glob_regex(segment)?;
                for (name, child) in &obj.properties {
                    if !pattern.is_match(name) {
                        continue;
                    }
                    if let Some(shape) = pick_node(child, rest, path, true)? {
                        record.insert(name, shape, false);
                    }
                }
                if record.is_empty() {
                    return Ok(None);
                }
            } else {
                let Some(child) = obj.properties.get(*segment) else {
                    if expanding {
                        return Ok(None);
                    }
                    return Err(format!("source path '{}' has no field '{}'", path, segment));
                };
                match pick_node(child, rest, path, expanding)? {
                    Some(shape) => record.insert(segment, shape, false),
                    None => return Ok(None),
                }
            }
            Ok(Some(Shape::Record(record)))
        }
    }
}

/// Nothing is known below a dynamic node: literal segments become records,
/// everything from the first wildcard on is opaque.
fn dynamic_pick(segments: &[&str]) -> Shape {
    match segments.split_first() {
        Some((segment, rest)) if !segment.contains('*') => {
            Shape::Record(Record::new().required(segment, dynamic_pick(rest)))
        }
        _ => Shape::Any,
    }
}

fn glob_regex(segment: &str) -> Result<Regex, String> {
    let pattern = segment
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", pattern)).map_err(|e| e.to_string())
}

impl DocumentSchema {
    pub fn source_resolver(&self) -> SourceFilterResolver<'_> {
        SourceFilterResolver::new(self)
    }
}
