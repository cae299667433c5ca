//! Dot-separated field paths and their resolution against a document schema.

use crate::schema::types::{DocumentSchema, FieldType, LeafType, SchemaNode};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A `.`-joined path through a document schema, e.g. `user.address.city`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(String);

impl FieldPath {
    /// Parse a dot-path; empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::UnknownPath {
                path: String::new(),
                reason: "path is empty".to_string(),
            });
        }
        if path.split('.').any(str::is_empty) {
            return Err(Error::UnknownPath {
                path: path.to_string(),
                reason: "path contains an empty segment".to_string(),
            });
        }
        Ok(Self(path.to_string()))
    }

    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self> {
        let joined = segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(".");
        Self::parse(&joined)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}.{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0
    }
}

/// Restricts which leaf types a path may resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFilter {
    Any,
    Numeric,
    /// Every scalar except geo points
    Primitive,
    /// Dates or numbers
    Temporal,
    Text,
    Ip,
    Geo,
}

impl TypeFilter {
    pub fn accepts(&self, ty: LeafType) -> bool {
        match self {
            TypeFilter::Any => true,
            TypeFilter::Numeric => ty == LeafType::Number,
            TypeFilter::Primitive => ty != LeafType::GeoPoint,
            TypeFilter::Temporal => matches!(ty, LeafType::Date | LeafType::Number),
            TypeFilter::Text => ty == LeafType::String,
            TypeFilter::Ip => ty == LeafType::Ip,
            TypeFilter::Geo => ty == LeafType::GeoPoint,
        }
    }

    /// Dynamic fields satisfy every filter.
    pub fn accepts_field(&self, ty: FieldType) -> bool {
        match ty {
            FieldType::Leaf(ty) => self.accepts(ty),
            FieldType::Dynamic => true,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TypeFilter::Any => "any",
            TypeFilter::Numeric => "numeric",
            TypeFilter::Primitive => "primitive",
            TypeFilter::Temporal => "date or numeric",
            TypeFilter::Text => "string",
            TypeFilter::Ip => "ip",
            TypeFilter::Geo => "geo_point",
        }
    }
}

impl std::str::FromStr for TypeFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "any" => TypeFilter::Any,
            "numeric" => TypeFilter::Numeric,
            "primitive" => TypeFilter::Primitive,
            "temporal" => TypeFilter::Temporal,
            "text" => TypeFilter::Text,
            "ip" => TypeFilter::Ip,
            "geo" => TypeFilter::Geo,
            other => return Err(Error::Config(format!("unknown type filter '{}'", other))),
        })
    }
}

/// Where a walk through the schema ended up.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Node(&'a SchemaNode),
    /// A multi-field such as `title.keyword`
    SubField(LeafType),
    Dynamic,
}

/// Resolves and enumerates field paths of one schema.
pub struct SchemaPathResolver<'a> {
    schema: &'a DocumentSchema,
}

impl<'a> SchemaPathResolver<'a> {
    pub fn new(schema: &'a DocumentSchema) -> Self {
        Self { schema }
    }

    /// Resolve `path` to the type of its leaf.
    ///
    /// Arrays along the path are transparent. Paths that reach a dynamic part
    /// of the schema resolve to `FieldType::Dynamic`.
    pub fn resolve(&self, path: &str) -> Result<FieldType> {
        let ty = match self.walk(path)? {
            Resolved::SubField(ty) => FieldType::Leaf(ty),
            Resolved::Dynamic => FieldType::Dynamic,
            Resolved::Node(node) => match node.unwrap_arrays() {
                SchemaNode::Leaf(def) => FieldType::Leaf(def.ty),
                SchemaNode::Dynamic => FieldType::Dynamic,
                SchemaNode::Object(_) => {
                    return Err(Error::UnknownPath {
                        path: path.to_string(),
                        reason: "resolves to an object, not a leaf".to_string(),
                    })
                }
                SchemaNode::Array(_) => unreachable!("arrays are unwrapped"),
            },
        };
        tracing::trace!(path, %ty, "resolved field path");
        Ok(ty)
    }

    /// Resolve `path` to whatever it names: a leaf, an object or a dynamic subtree.
    pub fn resolve_node(&self, path: &str) -> Result<Resolved<'a>> {
        self.walk(path)
    }

    fn walk(&self, path: &str) -> Result<Resolved<'a>> {
        let path = FieldPath::parse(path)?;
        let segments: Vec<&str> = path.segments().collect();
        let mut node = self.schema.root();

        for (i, segment) in segments.iter().enumerate() {
            match node.unwrap_arrays() {
                SchemaNode::Dynamic => return Ok(Resolved::Dynamic),
                SchemaNode::Object(obj) => match obj.properties.get(*segment) {
                    Some(child) => node = child,
                    None => {
                        return Err(Error::UnknownPath {
                            path: path.to_string(),
                            reason: missing_segment(&segments, i),
                        })
                    }
                },
                SchemaNode::Leaf(def) => {
                    let last = i + 1 == segments.len();
                    return match def.fields.get(*segment) {
                        Some(ty) if last => Ok(Resolved::SubField(*ty)),
                        _ => Err(Error::UnknownPath {
                            path: path.to_string(),
                            reason: format!(
                                "'{}' is a leaf field without sub-field '{}'",
                                segments[..i].join("."),
                                segment
                            ),
                        }),
                    };
                }
                SchemaNode::Array(_) => unreachable!("arrays are unwrapped"),
            }
        }
        Ok(Resolved::Node(node))
    }

    /// Every leaf path of the schema whose type passes `filter`.
    pub fn enumerate(&self, filter: Option<TypeFilter>) -> BTreeSet<FieldPath> {
        self.leaves(filter).into_keys().collect()
    }

    /// Every leaf path with its type. Dynamic subtrees contribute nothing.
    pub fn leaves(&self, filter: Option<TypeFilter>) -> BTreeMap<FieldPath, LeafType> {
        let filter = filter.unwrap_or(TypeFilter::Any);
        let mut out = BTreeMap::new();
        collect_leaves(self.schema.root(), None, filter, &mut out);
        out
    }
}

fn missing_segment(segments: &[&str], i: usize) -> String {
    if i == 0 {
        format!("no field '{}' at the document root", segments[0])
    } else {
        format!(
            "no field '{}' under '{}'",
            segments[i],
            segments[..i].join(".")
        )
    }
}

fn collect_leaves(
    node: &SchemaNode,
    prefix: Option<&FieldPath>,
    filter: TypeFilter,
    out: &mut BTreeMap<FieldPath, LeafType>,
) {
    match node.unwrap_arrays() {
        SchemaNode::Dynamic => {}
        SchemaNode::Leaf(def) => {
            // the root of a schema is never a leaf, so a prefix is always present here
            let Some(path) = prefix else { return };
            if filter.accepts(def.ty) {
                out.insert(path.clone(), def.ty);
            }
            for (sub, ty) in &def.fields {
                if filter.accepts(*ty) {
                    out.insert(path.child(sub), *ty);
                }
            }
        }
        SchemaNode::Object(obj) => {
            for (name, child) in &obj.properties {
                let path = match prefix {
                    Some(p) => p.child(name),
                    None => FieldPath(name.clone()),
                };
                collect_leaves(child, Some(&path), filter, out);
            }
        }
        SchemaNode::Array(_) => unreachable!("arrays are unwrapped"),
    }
}

impl DocumentSchema {
    pub fn resolver(&self) -> SchemaPathResolver<'_> {
        SchemaPathResolver::new(self)
    }
}
