//! Structural description of result and document shapes.
//!
//! A [`Shape`] is what a response decoder should expect at a given position of
//! the search response. Shapes render to a compact descriptor (`Display`), to a
//! JSON descriptor (`Serialize`) and parse back from that JSON descriptor:
//!
//! - `"number"`, `"string"`, `"boolean"`, `"date"`, `"ip"`, `"geo_point"`,
//!   `"null"`, `"any"`; `"number|null"` for unions of those
//! - `["string"]` for arrays
//! - `{"a": "number", "b?": "string"}` for records (`?` marks optional fields)
//! - `{"$map": "number"}` for string-keyed maps
//! - `{"$one_of": [...]}` for general unions
//!
//! Field names starting with `$` or ending in `?` cannot be told apart from
//! the markers above, so such records serialize but do not parse back.

use crate::schema::{DocumentSchema, LeafType, SchemaNode};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Opaque value; nothing is known statically
    Any,
    Null,
    Scalar(LeafType),
    Array(Box<Shape>),
    /// Object with arbitrary string keys
    Map(Box<Shape>),
    Record(Record),
    OneOf(Vec<Shape>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub fields: BTreeMap<String, Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub shape: Shape,
    pub optional: bool,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, shape: Shape) -> Self {
        self.insert(name, shape, false);
        self
    }

    pub fn optional(mut self, name: &str, shape: Shape) -> Self {
        self.insert(name, shape, true);
        self
    }

    pub fn insert(&mut self, name: &str, shape: Shape, optional: bool) {
        self.fields.insert(name.to_string(), Field { shape, optional });
    }

    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.fields.get(name).map(|f| &f.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge `other` into `self`. Fields present on both sides are merged
    /// recursively and stay required if either side requires them.
    pub fn merge(&mut self, other: Record) {
        for (name, field) in other.fields {
            match self.fields.remove(&name) {
                Some(existing) => {
                    let merged = Field {
                        shape: existing.shape.widen(field.shape),
                        optional: existing.optional && field.optional,
                    };
                    self.fields.insert(name, merged);
                }
                None => {
                    self.fields.insert(name, field);
                }
            }
        }
    }
}

impl Shape {
    pub fn number() -> Shape {
        Shape::Scalar(LeafType::Number)
    }

    pub fn string() -> Shape {
        Shape::Scalar(LeafType::String)
    }

    pub fn boolean() -> Shape {
        Shape::Scalar(LeafType::Boolean)
    }

    pub fn nullable(shape: Shape) -> Shape {
        Shape::OneOf(vec![shape, Shape::Null])
    }

    pub fn array(item: Shape) -> Shape {
        Shape::Array(Box::new(item))
    }

    pub fn map(value: Shape) -> Shape {
        Shape::Map(Box::new(value))
    }

    pub fn empty_record() -> Shape {
        Shape::Record(Record::new())
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Shape::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Shape::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Follow record fields, array items and map values along `path`.
    pub fn get_path(&self, path: &[&str]) -> Option<&Shape> {
        let mut shape = self;
        for segment in path {
            shape = match shape {
                Shape::Record(r) => r.get(segment)?,
                Shape::Array(item) if *segment == "[]" => item.as_ref(),
                Shape::Map(value) if *segment == "*" => value.as_ref(),
                _ => return None,
            };
        }
        Some(shape)
    }

    /// Combine two shapes describing the same position; the wider one wins.
    pub fn widen(self, other: Shape) -> Shape {
        match (self, other) {
            (Shape::Any, _) | (_, Shape::Any) => Shape::Any,
            (Shape::Record(mut a), Shape::Record(b)) => {
                a.merge(b);
                Shape::Record(a)
            }
            (Shape::Array(a), Shape::Array(b)) => Shape::array((*a).widen(*b)),
            (Shape::Map(a), Shape::Map(b)) => Shape::map((*a).widen(*b)),
            (a, b) if a == b => a,
            (a, b) => Shape::OneOf(vec![a, b]),
        }
    }

    /// Every field of every nested record becomes optional.
    pub fn deep_partial(self) -> Shape {
        match self {
            Shape::Record(r) => Shape::Record(Record {
                fields: r
                    .fields
                    .into_iter()
                    .map(|(name, f)| {
                        (
                            name,
                            Field {
                                shape: f.shape.deep_partial(),
                                optional: true,
                            },
                        )
                    })
                    .collect(),
            }),
            Shape::Array(item) => Shape::array((*item).deep_partial()),
            Shape::Map(value) => Shape::map((*value).deep_partial()),
            Shape::OneOf(options) => {
                Shape::OneOf(options.into_iter().map(Shape::deep_partial).collect())
            }
            other => other,
        }
    }

    /// Shape of a whole document described by `schema`.
    pub fn of_schema(schema: &DocumentSchema) -> Shape {
        Shape::of_node(schema.root())
    }

    /// Shape of the `_source` fragment described by a schema node. Multi-fields
    /// exist only in the index, so they do not appear here.
    pub fn of_node(node: &SchemaNode) -> Shape {
        match node {
            SchemaNode::Leaf(def) => Shape::Scalar(def.ty),
            SchemaNode::Dynamic => Shape::Any,
            SchemaNode::Array(item) => Shape::array(Shape::of_node(item)),
            SchemaNode::Object(obj) => {
                let mut record = Record::new();
                for (name, child) in &obj.properties {
                    record.insert(name, Shape::of_node(child), false);
                }
                Shape::Record(record)
            }
        }
    }

    /// Parse a JSON shape descriptor.
    pub fn from_descriptor(value: &Value) -> std::result::Result<Shape, String> {
        match value {
            Value::String(s) => parse_union(s),
            Value::Array(items) => match items.as_slice() {
                [item] => Ok(Shape::array(Shape::from_descriptor(item)?)),
                _ => Err("an array descriptor must hold exactly one item shape".to_string()),
            },
            Value::Object(obj) => {
                if obj.is_empty() {
                    return Err("an object descriptor must declare at least one field".to_string());
                }
                if obj.len() == 1 {
                    if let Some(value) = obj.get("$map") {
                        return Ok(Shape::map(Shape::from_descriptor(value)?));
                    }
                    if let Some(options) = obj.get("$one_of") {
                        let options = options
                            .as_array()
                            .filter(|o| o.len() >= 2)
                            .ok_or_else(|| "'$one_of' needs a list of at least two shapes".to_string())?;
                        return options
                            .iter()
                            .map(Shape::from_descriptor)
                            .collect::<std::result::Result<Vec<_>, _>>()
                            .map(Shape::OneOf);
                    }
                }
                let mut record = Record::new();
                for (key, value) in obj {
                    let (name, optional) = match key.strip_suffix('?') {
                        Some(name) => (name, true),
                        None => (key.as_str(), false),
                    };
                    if name.is_empty() {
                        return Err("field names must not be empty".to_string());
                    }
                    if name.starts_with('$') || name.ends_with('?') {
                        return Err(format!("field name '{}' is reserved", key));
                    }
                    record.insert(name, Shape::from_descriptor(value)?, optional);
                }
                Ok(Shape::Record(record))
            }
            other => Err(format!("'{}' is not a shape descriptor", other)),
        }
    }

    fn scalar_name(&self) -> Option<&'static str> {
        match self {
            Shape::Any => Some("any"),
            Shape::Null => Some("null"),
            Shape::Scalar(ty) => Some(ty.as_str()),
            _ => None,
        }
    }
}

fn parse_scalar(name: &str) -> std::result::Result<Shape, String> {
    let shape = match name.trim() {
        "any" => Shape::Any,
        "null" => Shape::Null,
        "string" => Shape::Scalar(LeafType::String),
        "number" => Shape::Scalar(LeafType::Number),
        "boolean" => Shape::Scalar(LeafType::Boolean),
        "date" => Shape::Scalar(LeafType::Date),
        "ip" => Shape::Scalar(LeafType::Ip),
        "geo_point" => Shape::Scalar(LeafType::GeoPoint),
        "" => return Err("empty type name".to_string()),
        other => return Err(format!("unknown type name '{}'", other)),
    };
    Ok(shape)
}

fn parse_union(s: &str) -> std::result::Result<Shape, String> {
    let options = s
        .split('|')
        .map(parse_scalar)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(match <[Shape; 1]>::try_from(options) {
        Ok([single]) => single,
        Err(options) => Shape::OneOf(options),
    })
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if let Some(name) = self.scalar_name() {
            return serializer.serialize_str(name);
        }
        match self {
            Shape::Array(item) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(item)?;
                seq.end()
            }
            Shape::Map(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$map", value)?;
                map.end()
            }
            Shape::Record(record) => {
                let mut map = serializer.serialize_map(Some(record.fields.len()))?;
                for (name, field) in &record.fields {
                    if field.optional {
                        map.serialize_entry(&format!("{}?", name), &field.shape)?;
                    } else {
                        map.serialize_entry(name, &field.shape)?;
                    }
                }
                map.end()
            }
            Shape::OneOf(options) => {
                let names: Option<Vec<&str>> = options.iter().map(Shape::scalar_name).collect();
                match names {
                    Some(names) => serializer.serialize_str(&names.join("|")),
                    None => {
                        let mut map = serializer.serialize_map(Some(1))?;
                        map.serialize_entry("$one_of", options)?;
                        map.end()
                    }
                }
            }
            _ => unreachable!("scalars are handled above"),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any => f.write_str("any"),
            Shape::Null => f.write_str("null"),
            Shape::Scalar(ty) => ty.fmt(f),
            Shape::Array(item) => match item.as_ref() {
                Shape::OneOf(_) => write!(f, "({})[]", item),
                _ => write!(f, "{}[]", item),
            },
            Shape::Map(value) => write!(f, "{{[key]: {}}}", value),
            Shape::Record(record) => {
                if record.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{")?;
                for (i, (name, field)) in record.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    let mark = if field.optional { "?" } else { "" };
                    write!(f, " {}{}: {}", name, mark, field.shape)?;
                }
                f.write_str(" }")
            }
            Shape::OneOf(options) => {
                for (i, option) in options.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{}", option)?;
                }
                Ok(())
            }
        }
    }
}
