use anyhow::{Context, Result};
use esagg::schema::{SchemaLoader, TypeFilter};
use esagg::{DocumentSchema, SourceFilter};
use std::path::Path;

/// Schema from a definition file or an ES mapping; no file means a dynamic schema.
pub fn load_schema(schema: Option<&Path>, mapping: Option<&Path>) -> Result<DocumentSchema> {
    match (schema, mapping) {
        (Some(path), _) => SchemaLoader::load_schema(path)
            .with_context(|| format!("Failed to load schema {:?}", path)),
        (None, Some(path)) => SchemaLoader::load_mapping(path)
            .with_context(|| format!("Failed to load mapping {:?}", path)),
        (None, None) => {
            tracing::info!("No schema given, every field path is accepted");
            Ok(DocumentSchema::dynamic())
        }
    }
}

/// Run paths command
pub fn run_paths(schema: &DocumentSchema, filter: Option<&str>) -> Result<()> {
    let filter = filter.map(str::parse::<TypeFilter>).transpose()?;
    let leaves = schema.resolver().leaves(filter);
    if leaves.is_empty() && schema.is_dynamic() {
        println!("(dynamic schema: no declared paths)");
        return Ok(());
    }
    for (path, ty) in leaves {
        println!("{:<40} {}", path.as_str(), ty);
    }
    Ok(())
}

/// Run project command
pub fn run_project(schema: &DocumentSchema, source: &str) -> Result<()> {
    let filter: SourceFilter =
        serde_json::from_str(source).context("--source is not a valid _source filter")?;
    let shape = schema
        .source_resolver()
        .project(Some(&filter))
        .map_err(anyhow::Error::msg)?;
    println!("{}", shape);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esagg::schema::FieldType;
    use tempfile::TempDir;

    #[test]
    fn test_load_schema_or_mapping() {
        let temp = TempDir::new().unwrap();
        let schema_path = temp.path().join("users.yaml");
        std::fs::write(&schema_path, "fields:\n  age: number\n").unwrap();
        let mapping_path = temp.path().join("mapping.json");
        std::fs::write(&mapping_path, r#"{"properties": {"age": {"type": "integer"}}}"#).unwrap();

        for schema in [
            load_schema(Some(schema_path.as_path()), None).unwrap(),
            load_schema(None, Some(mapping_path.as_path())).unwrap(),
        ] {
            assert!(matches!(schema.resolver().resolve("age"), Ok(FieldType::Leaf(_))));
        }
        assert!(load_schema(None, None).unwrap().is_dynamic());
        assert!(load_schema(Some(temp.path().join("absent.yaml").as_path()), None).is_err());
    }

    #[test]
    fn test_project_rejects_bad_filter() {
        let schema = DocumentSchema::dynamic();
        assert!(run_project(&schema, "42").is_err());
        assert!(run_project(&schema, r#"["a.b"]"#).is_ok());
    }
}
