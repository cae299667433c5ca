use crate::schema::types::{DocumentSchema, FieldDef, LeafType, ObjectNode, SchemaNode};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Loads document schemas from a directory of YAML/JSON definitions.
pub struct SchemaLoader {
    schemas_dir: PathBuf,
}

impl SchemaLoader {
    pub fn new(schemas_dir: impl AsRef<Path>) -> Self {
        Self {
            schemas_dir: schemas_dir.as_ref().to_path_buf(),
        }
    }

    /// Load every schema in the directory, keyed by schema name (or file stem
    /// when the definition carries no name).
    pub fn load_all(&self) -> Result<HashMap<String, DocumentSchema>> {
        let mut schemas = HashMap::new();

        if !self.schemas_dir.exists() {
            return Err(Error::Schema(format!(
                "Schemas directory does not exist: {}",
                self.schemas_dir.display()
            )));
        }

        for entry in fs::read_dir(&self.schemas_dir)? {
            let entry = entry?;
            let path = entry.path();

            let is_schema = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml" | "json")
            );
            if !is_schema {
                continue;
            }

            let mut schema = Self::load_schema(&path)?;
            let name = match &schema.name {
                Some(name) => name.clone(),
                None => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string(),
            };
            schema.name = Some(name.clone());
            if schemas.insert(name.clone(), schema).is_some() {
                return Err(Error::Schema(format!(
                    "Schema '{}' is defined more than once in {}",
                    name,
                    self.schemas_dir.display()
                )));
            }
        }

        tracing::debug!(
            "Loaded {} schemas from {}",
            schemas.len(),
            self.schemas_dir.display()
        );
        Ok(schemas)
    }

    /// Load a single schema definition; `.json` files are read as JSON,
    /// everything else as YAML.
    pub fn load_schema(path: &Path) -> Result<DocumentSchema> {
        let content = fs::read_to_string(path)?;
        let schema = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(schema)
    }

    /// Load an Elasticsearch `_mapping` response body from a file.
    pub fn load_mapping(path: &Path) -> Result<DocumentSchema> {
        let content = fs::read_to_string(path)?;
        let body: Value = serde_json::from_str(&content)?;
        DocumentSchema::from_es_mapping(&body)
    }
}

impl DocumentSchema {
    /// Build a schema from an Elasticsearch mapping.
    ///
    /// Accepts a bare `{"properties": ...}` object, `{"mappings": {...}}`, or a
    /// full `GET /{index}/_mapping` response holding exactly one index.
    pub fn from_es_mapping(body: &Value) -> Result<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| Error::Schema("mapping must be a JSON object".to_string()))?;

        if obj.contains_key("properties") {
            return Ok(DocumentSchema::from_root(mapping_object(body, false)?));
        }
        if let Some(mappings) = obj.get("mappings") {
            return Self::from_es_mapping(mappings);
        }
        if obj.len() == 1 {
            if let Some((index, inner)) = obj.iter().next() {
                if inner.get("mappings").is_some() {
                    return Ok(Self::from_es_mapping(inner)?.with_name(index.clone()));
                }
            }
        }
        Err(Error::Schema(
            "mapping has no 'properties' or 'mappings' section".to_string(),
        ))
    }
}

fn mapping_object(body: &Value, nested: bool) -> Result<SchemaNode> {
    let properties = match body.get("properties") {
        Some(Value::Object(props)) => props,
        Some(_) => return Err(Error::Schema("'properties' must be an object".to_string())),
        None => return Ok(SchemaNode::Dynamic),
    };

    let mut out = BTreeMap::new();
    for (name, field) in properties {
        out.insert(name.clone(), mapping_field(name, field)?);
    }
    Ok(SchemaNode::Object(ObjectNode {
        properties: out,
        nested,
    }))
}

fn mapping_field(name: &str, field: &Value) -> Result<SchemaNode> {
    let ty = field.get("type").and_then(Value::as_str);
    match ty {
        None | Some("object") => mapping_object(field, false),
        Some("nested") => mapping_object(field, true),
        Some(es_type) => match es_leaf_type(es_type) {
            Some(ty) => {
                let mut fields = BTreeMap::new();
                if let Some(Value::Object(subs)) = field.get("fields") {
                    for (sub, def) in subs {
                        let sub_type = def.get("type").and_then(Value::as_str);
                        match sub_type.and_then(es_leaf_type) {
                            Some(sub_ty) => {
                                fields.insert(sub.clone(), sub_ty);
                            }
                            None => tracing::debug!(
                                "Multi-field '{}.{}' of type {:?} is not aggregatable, skipped",
                                name,
                                sub,
                                sub_type
                            ),
                        }
                    }
                }
                Ok(SchemaNode::Leaf(FieldDef { ty, fields }))
            }
            None => {
                tracing::debug!("Mapping type '{}' of field '{}' treated as dynamic", es_type, name);
                Ok(SchemaNode::Dynamic)
            }
        },
    }
}

fn es_leaf_type(es_type: &str) -> Option<LeafType> {
    let ty = match es_type {
        "text" | "keyword" | "constant_keyword" | "wildcard" | "match_only_text"
        | "search_as_you_type" => LeafType::String,
        "long" | "integer" | "short" | "byte" | "double" | "float" | "half_float"
        | "scaled_float" | "unsigned_long" | "token_count" => LeafType::Number,
        "date" | "date_nanos" => LeafType::Date,
        "boolean" => LeafType::Boolean,
        "ip" => LeafType::Ip,
        "geo_point" => LeafType::GeoPoint,
        _ => return None,
    };
    Some(ty)
}
