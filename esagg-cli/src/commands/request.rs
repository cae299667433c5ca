use anyhow::{Context, Result};
use esagg::config::InferenceConfig;
use esagg::{DocumentSchema, ExclusivityValidator, RawAggregations, ResultShapeInferencer};
use std::path::Path;

fn read_request(path: &Path) -> Result<RawAggregations> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request {:?}", path))?;
    RawAggregations::from_json_str(&content)
        .with_context(|| format!("Request {:?} is not an aggregations object", path))
}

/// Run validate command on a request file
pub fn run_validate(path: &Path, config: &InferenceConfig) -> Result<()> {
    let raw = read_request(path)?;
    let aggs = ExclusivityValidator::new(config).check(&raw)?;
    println!("OK: {} top-level aggregations", aggs.len());
    for (name, node) in aggs.iter() {
        println!("  {:<24} {}", name, node.kind);
    }
    Ok(())
}

/// Run infer command and print one shape per top-level aggregation
pub fn run_infer(
    path: &Path,
    schema: &DocumentSchema,
    config: &InferenceConfig,
    json: bool,
) -> Result<()> {
    let raw = read_request(path)?;
    let inferencer = ResultShapeInferencer::with_config(schema, config.clone());
    let tree = inferencer.infer_raw(&raw)?;
    tracing::debug!("Inferred {} result shapes", tree.len());

    if json {
        let section = esagg::aggregations_shape(&tree);
        println!("{}", serde_json::to_string_pretty(&section)?);
    } else {
        for (name, shape) in &tree {
            println!("{}: {}", name, shape);
        }
    }
    Ok(())
}
