use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Primitive type of a document leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafType {
    #[serde(alias = "keyword", alias = "text")]
    String,
    #[serde(alias = "long", alias = "integer", alias = "double", alias = "float")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    Date,
    Ip,
    GeoPoint,
}

impl LeafType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeafType::String => "string",
            LeafType::Number => "number",
            LeafType::Boolean => "boolean",
            LeafType::Date => "date",
            LeafType::Ip => "ip",
            LeafType::GeoPoint => "geo_point",
        }
    }

    pub fn all() -> &'static [LeafType] {
        &[
            LeafType::String,
            LeafType::Number,
            LeafType::Boolean,
            LeafType::Date,
            LeafType::Ip,
            LeafType::GeoPoint,
        ]
    }
}

impl fmt::Display for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type a field path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Leaf(LeafType),
    /// The path runs into a part of the document with no declared schema.
    Dynamic,
}

impl FieldType {
    pub fn leaf(&self) -> Option<LeafType> {
        match self {
            FieldType::Leaf(ty) => Some(*ty),
            FieldType::Dynamic => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Leaf(ty) => ty.fmt(f),
            FieldType::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// A leaf field together with its multi-fields (e.g. `title.keyword`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub ty: LeafType,
    pub fields: BTreeMap<String, LeafType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectNode {
    pub properties: BTreeMap<String, SchemaNode>,
    /// Mapped as an ES `nested` object
    pub nested: bool,
}

/// One level of a document schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SchemaNodeDef")]
pub enum SchemaNode {
    Leaf(FieldDef),
    Object(ObjectNode),
    Array(Box<SchemaNode>),
    Dynamic,
}

impl SchemaNode {
    pub fn leaf(ty: LeafType) -> Self {
        SchemaNode::Leaf(FieldDef {
            ty,
            fields: BTreeMap::new(),
        })
    }

    pub fn multi_field(ty: LeafType, fields: impl IntoIterator<Item = (&'static str, LeafType)>) -> Self {
        SchemaNode::Leaf(FieldDef {
            ty,
            fields: fields
                .into_iter()
                .map(|(name, ty)| (name.to_string(), ty))
                .collect(),
        })
    }

    pub fn object<K: Into<String>>(properties: impl IntoIterator<Item = (K, SchemaNode)>) -> Self {
        SchemaNode::Object(ObjectNode {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            nested: false,
        })
    }

    pub fn nested<K: Into<String>>(properties: impl IntoIterator<Item = (K, SchemaNode)>) -> Self {
        SchemaNode::Object(ObjectNode {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            nested: true,
        })
    }

    pub fn array(item: SchemaNode) -> Self {
        SchemaNode::Array(Box::new(item))
    }

    /// Strip any number of array wrappers.
    pub fn unwrap_arrays(&self) -> &SchemaNode {
        let mut node = self;
        while let SchemaNode::Array(item) = node {
            node = item;
        }
        node
    }

    pub fn is_object(&self) -> bool {
        matches!(self.unwrap_arrays(), SchemaNode::Object(_))
    }
}

/// Schema describing the shape of the documents stored in an index.
///
/// A schema is built once and then only read. `DocumentSchema::dynamic()`
/// stands for "no schema known": every path resolves to an opaque type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSchema {
    pub name: Option<String>,
    root: SchemaNode,
}

impl DocumentSchema {
    pub fn new<K: Into<String>>(properties: impl IntoIterator<Item = (K, SchemaNode)>) -> Self {
        Self {
            name: None,
            root: SchemaNode::object(properties),
        }
    }

    pub fn dynamic() -> Self {
        Self {
            name: None,
            root: SchemaNode::Dynamic,
        }
    }

    pub fn from_root(root: SchemaNode) -> Self {
        Self { name: None, root }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.root, SchemaNode::Dynamic)
    }
}

impl<'de> Deserialize<'de> for DocumentSchema {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let def = DocumentSchemaDef::deserialize(deserializer)?;
        let root = match def.fields {
            Some(properties) => SchemaNode::Object(ObjectNode {
                properties,
                nested: false,
            }),
            None if def.dynamic => SchemaNode::Dynamic,
            None => return Err(serde::de::Error::missing_field("fields")),
        };
        Ok(Self {
            name: def.name,
            root,
        })
    }
}

// -- YAML/JSON definition types -----------------------------------------------

#[derive(Deserialize)]
struct DocumentSchemaDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    fields: Option<BTreeMap<String, SchemaNode>>,
    #[serde(default)]
    dynamic: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TypeName {
    #[serde(alias = "keyword", alias = "text")]
    String,
    #[serde(alias = "long", alias = "integer", alias = "double", alias = "float")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    Date,
    Ip,
    GeoPoint,
    #[serde(alias = "dynamic")]
    Any,
}

impl TypeName {
    fn leaf(self) -> Option<LeafType> {
        match self {
            TypeName::String => Some(LeafType::String),
            TypeName::Number => Some(LeafType::Number),
            TypeName::Boolean => Some(LeafType::Boolean),
            TypeName::Date => Some(LeafType::Date),
            TypeName::Ip => Some(LeafType::Ip),
            TypeName::GeoPoint => Some(LeafType::GeoPoint),
            TypeName::Any => None,
        }
    }
}

/// Each schema entry is either a bare type name (`age: number`), a typed leaf
/// with multi-fields, an object with `properties`, or an `array` wrapper.
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaNodeDef {
    Name(TypeName),
    Field {
        #[serde(rename = "type")]
        ty: TypeName,
        #[serde(default)]
        fields: BTreeMap<String, LeafType>,
    },
    Object {
        properties: BTreeMap<String, SchemaNode>,
        #[serde(default)]
        nested: bool,
    },
    Array {
        array: Box<SchemaNode>,
    },
}

impl TryFrom<SchemaNodeDef> for SchemaNode {
    type Error = String;

    fn try_from(def: SchemaNodeDef) -> std::result::Result<Self, Self::Error> {
        Ok(match def {
            SchemaNodeDef::Name(name) => match name.leaf() {
                Some(ty) => SchemaNode::leaf(ty),
                None => SchemaNode::Dynamic,
            },
            SchemaNodeDef::Field { ty, fields } => match ty.leaf() {
                Some(ty) => SchemaNode::Leaf(FieldDef { ty, fields }),
                None if fields.is_empty() => SchemaNode::Dynamic,
                None => return Err("a field of type 'any' cannot declare multi-fields".to_string()),
            },
            SchemaNodeDef::Object { properties, nested } => {
                SchemaNode::Object(ObjectNode { properties, nested })
            }
            SchemaNodeDef::Array { array } => SchemaNode::Array(array),
        })
    }
}
