//! Result shape inference for aggregation request trees.
//!
//! The inferencer walks a checked request tree depth-first. Each node gets the
//! base shape of its kind, with bucket keys typed from the schema, and the
//! results of its sub-aggregations merged into every bucket.

use crate::config::InferenceConfig;
use crate::registry::{
    bucket_key, registry, AggregationKind, AggregationKindRegistry, AggregationKindSpec, BaseShape,
    Located, Nesting, TemplateInput,
};
use crate::request::{AggregationNode, NamedAggregations, RawAggregations, META_KEY};
use crate::schema::{DocumentSchema, FieldType, Resolved, SchemaNode, TypeFilter};
use crate::shape::{Record, Shape};
use crate::source::SourceFilter;
use crate::validate::{json_type, ExclusivityValidator};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Inferred result shapes keyed by aggregation name.
pub type ResultTree = BTreeMap<String, Shape>;

/// `buckets_path` names that refer to bucket properties instead of aggregations.
const BUCKETS_PATH_SPECIALS: [&str; 3] = ["_count", "_key", "_bucket_count"];

/// Where in the request tree a node sits.
struct Site<'a> {
    name: &'a str,
    path: &'a str,
}

impl Site<'_> {
    fn invalid_params(&self, kind: &str, reason: impl Into<String>) -> Error {
        Error::InvalidParams {
            name: self.name.to_string(),
            path: self.path.to_string(),
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    fn invalid_field(&self, field: &str, reason: impl Into<String>) -> Error {
        Error::InvalidFieldPath {
            name: self.name.to_string(),
            path: self.path.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    fn invalid_source(&self, reason: impl Into<String>) -> Error {
        Error::InvalidSourceFilter {
            name: self.name.to_string(),
            path: self.path.to_string(),
            reason: reason.into(),
        }
    }
}

/// A field named inside a kind's parameters, resolved against the schema.
struct ResolvedRef {
    field: String,
    ty: FieldType,
}

/// Infers result shapes of request trees against one document schema.
///
/// Holds no mutable state; one instance can serve any number of threads.
pub struct ResultShapeInferencer<'s> {
    schema: &'s DocumentSchema,
    registry: &'static AggregationKindRegistry,
    validator: ExclusivityValidator,
    config: InferenceConfig,
}

pub type Inferencer<'s> = ResultShapeInferencer<'s>;

impl<'s> ResultShapeInferencer<'s> {
    pub fn new(schema: &'s DocumentSchema) -> Self {
        Self::with_config(schema, InferenceConfig::default())
    }

    pub fn with_config(schema: &'s DocumentSchema, config: InferenceConfig) -> Self {
        Self {
            schema,
            registry: registry(),
            validator: ExclusivityValidator::new(&config),
            config,
        }
    }

    /// Infer the shape of the `aggregations` section a search with `aggs` returns.
    pub fn infer(&self, aggs: &NamedAggregations) -> Result<ResultTree> {
        self.infer_level(aggs, None, 1)
    }

    /// Infer the result of a single node. Sibling references in
    /// `buckets_path` cannot be checked without the surrounding level.
    pub fn infer_node(&self, name: &str, node: &AggregationNode) -> Result<Shape> {
        self.validator.check_name(name, name)?;
        let site = Site { name, path: name };
        self.infer_at(&site, node, None, 1)
    }

    /// Validate a wire-level tree and infer its result.
    pub fn infer_raw(&self, raw: &RawAggregations) -> Result<ResultTree> {
        let aggs = self.validator.check(raw)?;
        self.infer(&aggs)
    }

    fn infer_level(
        &self,
        aggs: &NamedAggregations,
        parent: Option<&str>,
        depth: usize,
    ) -> Result<ResultTree> {
        let mut tree = ResultTree::new();
        for (name, node) in aggs.iter() {
            let path = match parent {
                Some(parent) => format!("{}>{}", parent, name),
                None => name.to_string(),
            };
            self.validator.check_name(name, &path)?;
            let site = Site { name, path: &path };
            let shape = self.infer_at(&site, node, Some(aggs), depth)?;
            tree.insert(name.to_string(), shape);
        }
        Ok(tree)
    }

    fn infer_at(
        &self,
        site: &Site<'_>,
        node: &AggregationNode,
        siblings: Option<&NamedAggregations>,
        depth: usize,
    ) -> Result<Shape> {
        if depth > self.config.max_depth {
            return Err(Error::MaxDepthExceeded {
                name: site.name.to_string(),
                path: site.path.to_string(),
                limit: self.config.max_depth,
            });
        }

        let spec = self.registry.get(node.kind);
        tracing::debug!(aggregation = site.path, kind = %node.kind, "Inferring result shape");

        if !node.aggs.is_empty() && spec.nesting == Nesting::Forbidden {
            return Err(Error::IllegalNesting {
                name: site.name.to_string(),
                path: site.path.to_string(),
                kind: node.kind.to_string(),
            });
        }

        let field = self.check_field(site, node, spec)?;
        let refs = self.check_field_refs(site, node, spec)?;
        self.check_kind_params(site, node, spec, siblings)?;

        let input = self.template_input(site, node, spec, field, &refs)?;
        let base = spec.template.build(&input);

        let subs = match spec.nesting {
            Nesting::Merged => self.infer_level(&node.aggs, Some(site.path), depth + 1)?,
            Nesting::Discarded => {
                self.infer_level(&node.aggs, Some(site.path), depth + 1)?;
                ResultTree::new()
            }
            Nesting::Forbidden => ResultTree::new(),
        };
        let subs = sub_results(site, &base, subs, node.meta.is_some())?;

        let mut shape = base.finish(subs);
        if node.meta.is_some() {
            if let Some(record) = shape.as_record_mut() {
                record.insert(META_KEY, Shape::Any, false);
            }
        }
        Ok(shape)
    }

    /// Resolve the top-level `field` parameter against the kind's requirement.
    fn check_field(
        &self,
        site: &Site<'_>,
        node: &AggregationNode,
        spec: &AggregationKindSpec,
    ) -> Result<Option<FieldType>> {
        let kind = node.kind.as_str();
        match (spec.field.filter(), node.params.get("field")) {
            (None, Some(_)) => Err(site.invalid_params(kind, "does not take a 'field' parameter")),
            (None, None) => Ok(None),
            (Some(filter), Some(Value::String(field))) => {
                self.resolve_field(site, field, filter).map(Some)
            }
            (Some(_), Some(other)) => Err(site.invalid_params(
                kind,
                format!("'field' must be a string, found {}", json_type(other)),
            )),
            (Some(_), None) if spec.field.is_required() && !node.params.contains_key("script") => {
                Err(site.invalid_params(kind, "requires a 'field' or a 'script'"))
            }
            (Some(_), None) => Ok(None),
        }
    }

    fn resolve_field(&self, site: &Site<'_>, field: &str, filter: TypeFilter) -> Result<FieldType> {
        let ty = self
            .schema
            .resolver()
            .resolve(field)
            .map_err(|err| match err {
                Error::UnknownPath { reason, .. } => site.invalid_field(field, reason),
                other => other,
            })?;

        if !filter.accepts_field(ty) {
            return Err(Error::TypeMismatch {
                name: site.name.to_string(),
                path: site.path.to_string(),
                field: field.to_string(),
                expected: filter.describe().to_string(),
                found: ty.to_string(),
            });
        }
        if ty == FieldType::Dynamic && !self.schema.is_dynamic() {
            tracing::warn!(
                aggregation = site.path,
                field,
                "Field resolves into a dynamic part of the schema"
            );
        }
        Ok(ty)
    }

    /// Resolve fields named deeper inside the parameters, e.g. `weighted_avg.value.field`.
    fn check_field_refs(
        &self,
        site: &Site<'_>,
        node: &AggregationNode,
        spec: &AggregationKindSpec,
    ) -> Result<Vec<ResolvedRef>> {
        if spec.field_refs.is_empty() {
            return Ok(Vec::new());
        }
        let kind = node.kind.as_str();
        let params = node.params_value();
        let mut resolved = Vec::new();

        for field_ref in spec.field_refs {
            for located in field_ref.locate(&params) {
                match located {
                    Located::Field {
                        value: Value::String(field),
                        ..
                    } => {
                        let ty = self.resolve_field(site, field, field_ref.filter)?;
                        resolved.push(ResolvedRef {
                            field: field.clone(),
                            ty,
                        });
                    }
                    Located::Field { location, value } => {
                        return Err(site.invalid_params(
                            kind,
                            format!(
                                "'{}' must be a field name, found {}",
                                location,
                                json_type(value)
                            ),
                        ))
                    }
                    Located::Missing { location } if field_ref.required => {
                        return Err(site.invalid_params(kind, format!("missing '{}'", location)))
                    }
                    Located::Missing { .. } => {}
                }
            }
        }
        Ok(resolved)
    }

    fn check_kind_params(
        &self,
        site: &Site<'_>,
        node: &AggregationNode,
        spec: &AggregationKindSpec,
        siblings: Option<&NamedAggregations>,
    ) -> Result<()> {
        let kind = node.kind.as_str();
        match node.kind {
            AggregationKind::Nested | AggregationKind::ReverseNested => {
                match node.params.get("path") {
                    Some(Value::String(path)) => self.check_object_path(site, path)?,
                    Some(other) => {
                        return Err(site.invalid_params(
                            kind,
                            format!("'path' must be a string, found {}", json_type(other)),
                        ))
                    }
                    None if node.kind == AggregationKind::Nested => {
                        return Err(site.invalid_params(kind, "requires a 'path'"))
                    }
                    None => {}
                }
            }
            AggregationKind::MultiTerms => require_list(site, node, "terms", 2)?,
            AggregationKind::FrequentItemSets => require_list(site, node, "fields", 2)?,
            AggregationKind::MatrixStats => require_list(site, node, "fields", 1)?,
            AggregationKind::Composite => require_list(site, node, "sources", 1)?,
            AggregationKind::TopMetrics if !node.params.contains_key("sort") => {
                return Err(site.invalid_params(kind, "requires a 'sort'"))
            }
            _ => {}
        }

        if spec.takes_buckets_path() {
            self.check_buckets_path(site, node, spec, siblings)?;
        }
        Ok(())
    }

    /// `nested.path` and `reverse_nested.path` must name an object.
    fn check_object_path(&self, site: &Site<'_>, path: &str) -> Result<()> {
        let not_object = || site.invalid_field(path, "does not name an object");
        match self.schema.resolver().resolve_node(path) {
            Ok(Resolved::Dynamic) => Ok(()),
            Ok(Resolved::SubField(_)) => Err(not_object()),
            Ok(Resolved::Node(schema_node)) => match schema_node.unwrap_arrays() {
                SchemaNode::Object(obj) => {
                    if !obj.nested {
                        tracing::warn!(
                            aggregation = site.path,
                            path,
                            "Object is not mapped as nested"
                        );
                    }
                    Ok(())
                }
                SchemaNode::Dynamic => Ok(()),
                _ => Err(not_object()),
            },
            Err(Error::UnknownPath { reason, .. }) => Err(site.invalid_field(path, reason)),
            Err(other) => Err(other),
        }
    }

    fn check_buckets_path(
        &self,
        site: &Site<'_>,
        node: &AggregationNode,
        spec: &AggregationKindSpec,
        siblings: Option<&NamedAggregations>,
    ) -> Result<()> {
        let kind = node.kind.as_str();
        let references: Vec<&str> = match node.params.get("buckets_path") {
            None if spec.requires_buckets_path() => {
                return Err(site.invalid_params(kind, "requires a 'buckets_path'"))
            }
            None => return Ok(()),
            Some(Value::String(reference)) => vec![reference.as_str()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| reference_str(site, kind, item))
                .collect::<Result<_>>()?,
            Some(Value::Object(vars)) => vars
                .values()
                .map(|item| reference_str(site, kind, item))
                .collect::<Result<_>>()?,
            Some(other) => {
                return Err(site.invalid_params(
                    kind,
                    format!("'buckets_path' must be a string, a list or a map, found {}", json_type(other)),
                ))
            }
        };
        if references.is_empty() {
            return Err(site.invalid_params(kind, "'buckets_path' is empty"));
        }

        if !self.config.validate_buckets_path {
            return Ok(());
        }
        let Some(siblings) = siblings else {
            return Ok(());
        };
        for reference in references {
            if !buckets_path_resolves(reference, site.name, siblings) {
                return Err(Error::InvalidBucketsPath {
                    name: site.name.to_string(),
                    path: site.path.to_string(),
                    reference: reference.to_string(),
                });
            }
        }
        Ok(())
    }

    fn template_input(
        &self,
        site: &Site<'_>,
        node: &AggregationNode,
        spec: &AggregationKindSpec,
        field: Option<FieldType>,
        refs: &[ResolvedRef],
    ) -> Result<TemplateInput> {
        let key = match node.kind {
            AggregationKind::Terms | AggregationKind::RareTerms | AggregationKind::SignificantTerms => {
                field.map(bucket_key)
            }
            AggregationKind::MultiTerms => refs.iter().map(|r| bucket_key(r.ty)).reduce(Shape::widen),
            AggregationKind::Composite => Some(self.composite_key(site, node)?),
            _ => None,
        };

        let keyed = if spec.supports_keyed() {
            keyed_param(site, node, spec)?
        } else {
            false
        };

        let document = match node.kind {
            AggregationKind::TopHits => self.hit_source(site, node)?,
            _ => Shape::Any,
        };

        let declared = match &node.declared_result {
            Some(Shape::Record(record)) if record.is_empty() => {
                return Err(Error::InvalidResultDeclaration {
                    name: site.name.to_string(),
                    path: site.path.to_string(),
                    reason: "the declared result has no fields".to_string(),
                })
            }
            declared => declared.clone(),
        };

        let mut metrics = Record::new();
        if node.kind == AggregationKind::TopMetrics {
            for metric in refs {
                let shape = match bucket_key(metric.ty) {
                    Shape::Any => Shape::Any,
                    shape => Shape::nullable(shape),
                };
                metrics.insert(&metric.field, shape, false);
            }
        }

        Ok(TemplateInput {
            key,
            keyed,
            document,
            declared,
            metrics,
        })
    }

    /// `composite` keys are records with one entry per declared source.
    fn composite_key(&self, site: &Site<'_>, node: &AggregationNode) -> Result<Shape> {
        let kind = node.kind.as_str();
        let sources = match node.params.get("sources") {
            Some(Value::Array(sources)) => sources,
            _ => return Err(site.invalid_params(kind, "requires a 'sources' list")),
        };

        let mut key = Record::new();
        for source in sources {
            let Some((source_name, definition)) = single_entry(source) else {
                return Err(site.invalid_params(kind, "each source must be an object with one name"));
            };
            let Some((source_kind, params)) = single_entry(definition) else {
                return Err(site.invalid_params(
                    kind,
                    format!("source '{}' must select exactly one source kind", source_name),
                ));
            };

            let (filter, fixed) = match source_kind.as_str() {
                "terms" => (TypeFilter::Primitive, None),
                "histogram" => (TypeFilter::Numeric, Some(Shape::number())),
                "date_histogram" => (TypeFilter::Temporal, Some(Shape::number())),
                "geotile_grid" => (TypeFilter::Geo, Some(Shape::string())),
                other => {
                    return Err(site.invalid_params(
                        kind,
                        format!("unsupported source kind '{}'", other),
                    ))
                }
            };
            let field = match params.get("field") {
                Some(Value::String(field)) => Some(self.resolve_field(site, field, filter)?),
                _ => None,
            };

            let mut shape = fixed.unwrap_or_else(|| field.map(bucket_key).unwrap_or(Shape::Any));
            if params.get("missing_bucket") == Some(&Value::Bool(true)) && shape != Shape::Any {
                shape = Shape::nullable(shape);
            }
            if key.get(source_name).is_some() {
                return Err(site.invalid_params(
                    kind,
                    format!("source '{}' is declared more than once", source_name),
                ));
            }
            key.insert(source_name, shape, false);
        }
        Ok(Shape::Record(key))
    }

    /// Document shape of `top_hits` hits under the node's `_source` filter.
    fn hit_source(&self, site: &Site<'_>, node: &AggregationNode) -> Result<Shape> {
        let filter: Option<SourceFilter> = match node.params.get("_source") {
            None => None,
            Some(value) => Some(
                serde_json::from_value(value.clone())
                    .map_err(|_| site.invalid_source(format!("unsupported filter {}", value)))?,
            ),
        };
        self.schema
            .source_resolver()
            .project(filter.as_ref())
            .map_err(|reason| site.invalid_source(reason))
    }
}

fn keyed_param(site: &Site<'_>, node: &AggregationNode, spec: &AggregationKindSpec) -> Result<bool> {
    let kind = node.kind.as_str();
    let explicit = match node.params.get("keyed") {
        None => None,
        Some(Value::Bool(keyed)) => Some(*keyed),
        Some(other) => {
            return Err(site.invalid_params(
                kind,
                format!("'keyed' must be a boolean, found {}", json_type(other)),
            ))
        }
    };

    if node.kind == AggregationKind::Filters {
        // named filters answer with a map, anonymous ones with a list
        return match node.params.get("filters") {
            Some(Value::Object(_)) => Ok(explicit.unwrap_or(true)),
            Some(Value::Array(_)) => Ok(false),
            Some(other) => Err(site.invalid_params(
                kind,
                format!("'filters' must be an object or a list, found {}", json_type(other)),
            )),
            None => Err(site.invalid_params(kind, "requires 'filters'")),
        };
    }
    Ok(explicit.unwrap_or(spec.keyed_by_default()))
}

fn require_list(site: &Site<'_>, node: &AggregationNode, key: &str, min: usize) -> Result<()> {
    let kind = node.kind.as_str();
    match node.params.get(key) {
        Some(Value::Array(items)) if items.len() >= min => Ok(()),
        Some(Value::Array(_)) => Err(site.invalid_params(
            kind,
            format!("'{}' needs at least {} entries", key, min),
        )),
        Some(other) => Err(site.invalid_params(
            kind,
            format!("'{}' must be a list, found {}", key, json_type(other)),
        )),
        None => Err(site.invalid_params(kind, format!("requires '{}'", key))),
    }
}

fn reference_str<'v>(site: &Site<'_>, kind: &str, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        site.invalid_params(
            kind,
            format!("'buckets_path' entries must be strings, found {}", json_type(value)),
        )
    })
}

fn single_entry(value: &Value) -> Option<(&String, &Value)> {
    value
        .as_object()
        .filter(|obj| obj.len() == 1)
        .and_then(|obj| obj.iter().next())
}

/// Does `reference` lead from the node's siblings to an existing aggregation?
///
/// Hops are separated by `>`; a hop may select a bucket with `[key]`, and the
/// last hop may select a metric with `.name`.
fn buckets_path_resolves(reference: &str, own_name: &str, siblings: &NamedAggregations) -> bool {
    let hops: Vec<&str> = reference.split('>').collect();
    let mut level = siblings;

    for (i, hop) in hops.iter().enumerate() {
        let last = i + 1 == hops.len();
        let name = hop.split_once('[').map_or(*hop, |(name, _)| name);
        if BUCKETS_PATH_SPECIALS.contains(&name) {
            return last;
        }

        let found = match level.get(name) {
            Some(node) => Some((name, node)),
            None if last => name
                .split_once('.')
                .and_then(|(name, _)| level.get(name).map(|node| (name, node))),
            None => None,
        };
        let Some((found_name, node)) = found else {
            return false;
        };
        if i == 0 && found_name == own_name {
            return false;
        }
        level = &node.aggs;
    }
    true
}

/// Collect sub-aggregation results; their names must not shadow fields of
/// the record they are merged into.
fn sub_results(
    site: &Site<'_>,
    base: &BaseShape,
    subs: ResultTree,
    has_meta: bool,
) -> Result<Record> {
    let target = base.merge_target();
    let single = matches!(base, BaseShape::SingleBucket(_));
    let mut record = Record::new();
    for (name, shape) in subs {
        let clashes = target.get(&name).is_some() || (single && has_meta && name == META_KEY);
        if clashes {
            return Err(Error::InvalidAggregationName {
                path: format!("{}>{}", site.path, name),
                name,
            });
        }
        record.insert(&name, shape, false);
    }
    Ok(record)
}

/// Shape of the whole `aggregations` object of a response.
pub fn aggregations_shape(tree: &ResultTree) -> Shape {
    let mut record = Record::new();
    for (name, shape) in tree {
        record.insert(name, shape.clone(), false);
    }
    Shape::Record(record)
}

/// Parse, validate and infer a wire-level request with default limits.
pub fn infer_request(json: &str, schema: &DocumentSchema) -> Result<ResultTree> {
    let raw = RawAggregations::from_json_str(json)?;
    ResultShapeInferencer::new(schema).infer_raw(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LeafType;
    use serde_json::json;

    fn schema() -> DocumentSchema {
        DocumentSchema::new([
            (
                "user",
                SchemaNode::object([
                    ("age", SchemaNode::leaf(LeafType::Number)),
                    ("name", SchemaNode::leaf(LeafType::String)),
                    (
                        "country",
                        SchemaNode::multi_field(LeafType::String, [("keyword", LeafType::String)]),
                    ),
                ]),
            ),
            ("created_at", SchemaNode::leaf(LeafType::Date)),
            ("client_ip", SchemaNode::leaf(LeafType::Ip)),
            ("location", SchemaNode::leaf(LeafType::GeoPoint)),
            (
                "orders",
                SchemaNode::nested([
                    ("price", SchemaNode::leaf(LeafType::Number)),
                    ("sku", SchemaNode::leaf(LeafType::String)),
                ]),
            ),
            ("labels", SchemaNode::Dynamic),
        ])
    }

    fn infer(request: serde_json::Value) -> Result<ResultTree> {
        infer_request(&request.to_string(), &schema())
    }

    fn render(request: serde_json::Value, name: &str) -> String {
        infer(request).unwrap()[name].to_string()
    }

    #[test]
    fn test_avg_of_numeric_field() {
        let tree = infer(json!({"avgAge": {"avg": {"field": "user.age"}}})).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(
            tree["avgAge"].get_path(&["value"]),
            Some(&Shape::nullable(Shape::number()))
        );
    }

    #[test]
    fn test_unknown_field_is_invalid() {
        let schema = DocumentSchema::new([(
            "user",
            SchemaNode::object([
                ("age", SchemaNode::leaf(LeafType::Number)),
                ("name", SchemaNode::leaf(LeafType::String)),
            ]),
        )]);
        let err = infer_request(
            r#"{"byCountry": {"terms": {"field": "user.country"}}}"#,
            &schema,
        )
        .unwrap_err();
        match err {
            Error::InvalidFieldPath { name, field, .. } => {
                assert_eq!(name, "byCountry");
                assert_eq!(field, "user.country");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_two_kinds_are_ambiguous() {
        let err = infer(json!({"x": {"avg": {"field": "user.age"}, "sum": {"field": "user.age"}}}))
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousKind { .. }));
    }

    #[test]
    fn test_sub_aggregations_merge_into_buckets() {
        let tree = infer(json!({
            "byCountry": {
                "terms": {"field": "user.country.keyword"},
                "aggs": {"avgAge": {"avg": {"field": "user.age"}}}
            }
        }))
        .unwrap();

        let bucket = tree["byCountry"]
            .get_path(&["buckets", "[]"])
            .and_then(Shape::as_record)
            .unwrap();
        assert_eq!(bucket.get("key"), Some(&Shape::string()));
        assert_eq!(bucket.get("doc_count"), Some(&Shape::number()));
        assert_eq!(
            bucket.get("avgAge").and_then(|s| s.get_path(&["value"])),
            Some(&Shape::nullable(Shape::number()))
        );
    }

    #[test]
    fn test_missing_is_a_leaf() {
        let tree = infer(json!({"noCountry": {"missing": {"field": "user.country"}}})).unwrap();
        assert_eq!(tree["noCountry"].to_string(), "{ doc_count: number }");

        let err = infer(json!({
            "noCountry": {
                "missing": {"field": "user.country"},
                "aggs": {"avgAge": {"avg": {"field": "user.age"}}}
            }
        }))
        .unwrap_err();
        assert!(matches!(err, Error::IllegalNesting { name, .. } if name == "noCountry"));
    }

    #[test]
    fn test_top_hits_projects_source() {
        let tree = infer(json!({
            "latest": {"top_hits": {"size": 1, "_source": ["user.name"]}}
        }))
        .unwrap();
        let source = tree["latest"]
            .get_path(&["hits", "hits", "[]", "_source"])
            .unwrap();
        assert_eq!(source.to_string(), "{ user: { name: string } }");
    }

    #[test]
    fn test_top_hits_bad_source_filter() {
        let err = infer(json!({"latest": {"top_hits": {"_source": ["user.nope"]}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidSourceFilter { .. }));

        let err = infer(json!({"latest": {"top_hits": {"_source": 3}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidSourceFilter { .. }));
    }

    #[test]
    fn test_inference_is_idempotent() {
        let aggs = NamedAggregations::from_json_str(
            r#"{"by_day": {"date_histogram": {"field": "created_at"},
                "aggs": {"ips": {"cardinality": {"field": "client_ip"}}}}}"#,
        )
        .unwrap();
        let schema = schema();
        let inferencer = ResultShapeInferencer::new(&schema);
        assert_eq!(inferencer.infer(&aggs).unwrap(), inferencer.infer(&aggs).unwrap());
    }

    #[test]
    fn test_type_mismatch() {
        let err = infer(json!({"x": {"avg": {"field": "user.name"}}})).unwrap_err();
        match err {
            Error::TypeMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, "numeric");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dynamic_schema_passes_everything() {
        let tree = infer_request(
            r#"{"x": {"terms": {"field": "whatever.it.is"}, "aggs": {"m": {"max": {"field": "n"}}}}}"#,
            &DocumentSchema::dynamic(),
        )
        .unwrap();
        assert_eq!(tree["x"].get_path(&["buckets", "[]", "key"]), Some(&Shape::Any));
    }

    #[test]
    fn test_dynamic_subtree_in_typed_schema() {
        let tree = infer(json!({"x": {"terms": {"field": "labels.env"}}})).unwrap();
        assert_eq!(tree["x"].get_path(&["buckets", "[]", "key"]), Some(&Shape::Any));
    }

    #[test]
    fn test_date_terms_key_is_numeric() {
        let tree = infer(json!({"x": {"terms": {"field": "created_at"}}})).unwrap();
        assert_eq!(
            tree["x"].get_path(&["buckets", "[]", "key"]),
            Some(&Shape::number())
        );
    }

    #[test]
    fn test_required_field_or_script() {
        let err = infer(json!({"x": {"avg": {}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
        infer(json!({"x": {"avg": {"script": "doc['a'].value * 2"}}})).unwrap();

        let err = infer(json!({"x": {"filter": {"field": "user.age"}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[test]
    fn test_meta_is_echoed() {
        let tree = infer(json!({"x": {"max": {"field": "user.age"}, "meta": {"color": "blue"}}}))
            .unwrap();
        assert_eq!(tree["x"].get_path(&["meta"]), Some(&Shape::Any));
    }

    #[test]
    fn test_keyed_ranges_and_percentiles() {
        let tree = infer(json!({
            "ages": {"range": {"field": "user.age", "ranges": [{"to": 18}], "keyed": true}},
            "p": {"percentiles": {"field": "user.age"}},
            "p_list": {"percentiles": {"field": "user.age", "keyed": false}}
        }))
        .unwrap();
        assert!(matches!(tree["ages"].get_path(&["buckets"]), Some(Shape::Map(_))));
        assert!(matches!(tree["p"].get_path(&["values"]), Some(Shape::Map(_))));
        assert!(matches!(tree["p_list"].get_path(&["values"]), Some(Shape::Array(_))));

        let err = infer(json!({"x": {"histogram": {"field": "user.age", "keyed": "yes"}}}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[test]
    fn test_filters_keyed_by_form() {
        let tree = infer(json!({
            "named": {"filters": {"filters": {"a": {"match_all": {}}}}},
            "anonymous": {"filters": {"filters": [{"match_all": {}}]}}
        }))
        .unwrap();
        assert!(matches!(tree["named"].get_path(&["buckets"]), Some(Shape::Map(_))));
        assert!(matches!(tree["anonymous"].get_path(&["buckets"]), Some(Shape::Array(_))));
    }

    #[test]
    fn test_single_bucket_kinds_merge_into_themselves() {
        let tree = infer(json!({
            "in_orders": {
                "nested": {"path": "orders"},
                "aggs": {"top_price": {"max": {"field": "orders.price"}}}
            }
        }))
        .unwrap();
        assert_eq!(
            render(
                json!({"g": {"global": {}, "aggs": {"n": {"value_count": {"field": "user.name"}}}}}),
                "g"
            ),
            "{ doc_count: number, n: { value: number | null, value_as_string?: string } }"
        );
        assert!(tree["in_orders"].get_path(&["top_price", "value"]).is_some());
    }

    #[test]
    fn test_nested_path_must_be_an_object() {
        let err = infer(json!({"x": {"nested": {"path": "user.age"}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidFieldPath { field, .. } if field == "user.age"));

        let err = infer(json!({"x": {"nested": {"path": "shipments"}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidFieldPath { .. }));

        let err = infer(json!({"x": {"nested": {}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[test]
    fn test_composite_key_record() {
        let tree = infer(json!({
            "pages": {"composite": {"sources": [
                {"day": {"date_histogram": {"field": "created_at", "calendar_interval": "day"}}},
                {"country": {"terms": {"field": "user.country", "missing_bucket": true}}}
            ]}}
        }))
        .unwrap();
        assert_eq!(
            tree["pages"].get_path(&["buckets", "[]", "key"]).unwrap().to_string(),
            "{ country: string | null, day: number }"
        );
        assert!(tree["pages"].as_record().unwrap().fields["after_key"].optional);

        let err = infer(json!({"pages": {"composite": {"sources": [
            {"bad": {"histogram": {"field": "user.name", "interval": 5}}}
        ]}}}))
        .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let err = infer(json!({"pages": {"composite": {"sources": []}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[test]
    fn test_top_metrics_record_per_metric() {
        let tree = infer(json!({
            "last": {"top_metrics": {
                "metrics": [{"field": "user.age"}, {"field": "user.name"}],
                "sort": {"created_at": "desc"}
            }}
        }))
        .unwrap();
        assert_eq!(
            tree["last"].get_path(&["top", "[]", "metrics"]).unwrap().to_string(),
            "{ user.age: number | null, user.name: string | null }"
        );
    }

    #[test]
    fn test_composite_field_refs() {
        infer(json!({"w": {"weighted_avg": {
            "value": {"field": "user.age"},
            "weight": {"script": "1"}
        }}}))
        .unwrap();

        let err = infer(json!({"w": {"weighted_avg": {"value": {"field": "user.age"}}}}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams { reason, .. } if reason == "missing 'weight'"));

        let err = infer(json!({"w": {"weighted_avg": {
            "value": {"field": "user.name"},
            "weight": {"field": "user.age"}
        }}}))
        .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { field, .. } if field == "user.name"));
    }

    #[test]
    fn test_multi_terms_key() {
        let tree = infer(json!({"mt": {"multi_terms": {"terms": [
            {"field": "user.country"},
            {"field": "user.age"}
        ]}}}))
        .unwrap();
        assert_eq!(
            tree["mt"].get_path(&["buckets", "[]", "key"]).unwrap().to_string(),
            "(string | number)[]"
        );

        let err = infer(json!({"mt": {"multi_terms": {"terms": [{"field": "user.age"}]}}}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[test]
    fn test_buckets_path_references() {
        let ok = json!({
            "per_month": {
                "date_histogram": {"field": "created_at", "calendar_interval": "month"},
                "aggs": {
                    "sales": {"sum": {"field": "orders.price"}},
                    "growth": {"derivative": {"buckets_path": "sales"}},
                    "busy": {"bucket_selector": {
                        "buckets_path": {"c": "_count", "s": "sales"},
                        "script": "params.c > 10"
                    }}
                }
            },
            "best_month": {"max_bucket": {"buckets_path": "per_month>sales"}},
            "count_stats": {"stats_bucket": {"buckets_path": "per_month>_count"}}
        });
        let tree = infer(ok).unwrap();
        assert!(tree["best_month"].get_path(&["keys"]).is_some());
        assert_eq!(
            tree["per_month"].get_path(&["buckets", "[]", "busy"]),
            Some(&Shape::empty_record())
        );

        for bad in ["nope", "per_month>nope", "_count>per_month", "best_month"] {
            let err = infer(json!({
                "per_month": {
                    "date_histogram": {"field": "created_at"},
                    "aggs": {"sales": {"sum": {"field": "orders.price"}}}
                },
                "best_month": {"max_bucket": {"buckets_path": bad}}
            }))
            .unwrap_err();
            assert!(
                matches!(&err, Error::InvalidBucketsPath { reference, .. } if reference == bad),
                "{} gave {:?}",
                bad,
                err
            );
        }

        let err = infer(json!({"d": {"avg_bucket": {}}})).unwrap_err();
        assert!(matches!(err, Error::InvalidParams { .. }));
    }

    #[test]
    fn test_buckets_path_check_can_be_disabled() {
        let schema = schema();
        let inferencer = ResultShapeInferencer::with_config(
            &schema,
            InferenceConfig {
                validate_buckets_path: false,
                ..InferenceConfig::default()
            },
        );
        let raw = RawAggregations::from_json_str(r#"{"m": {"max_bucket": {"buckets_path": "nope"}}}"#)
            .unwrap();
        inferencer.infer_raw(&raw).unwrap();
    }

    #[test]
    fn test_sibling_pipeline_discards_sub_aggregations() {
        let tree = infer(json!({
            "per_day": {
                "date_histogram": {"field": "created_at"},
                "aggs": {
                    "total": {"sum": {"field": "orders.price"}},
                    "sorted": {
                        "bucket_sort": {"size": 3},
                        "aggs": {"ignored": {"max": {"field": "user.age"}}}
                    }
                }
            }
        }))
        .unwrap();
        assert_eq!(
            tree["per_day"].get_path(&["buckets", "[]", "sorted"]),
            Some(&Shape::empty_record())
        );

        // still validated
        let err = infer(json!({
            "s": {"bucket_sort": {}, "aggs": {"bad": {"max": {"field": "user.nope"}}}}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidFieldPath { path, .. } if path == "s>bad"));
    }

    #[test]
    fn test_scripted_metric_declarations() {
        let tree = infer(json!({
            "profit": {"scripted_metric": {
                "map_script": "state.x += 1",
                "result_doc": {"total": "number", "by_sku?": {"$map": "number"}}
            }},
            "opaque": {"scripted_metric": {"map_script": "state.x += 1"}}
        }))
        .unwrap();
        assert_eq!(
            tree["profit"].to_string(),
            "{ value: { by_sku?: {[key]: number}, total: number } }"
        );
        assert_eq!(tree["opaque"].to_string(), "{ value: any }");

        let schema = schema();
        let node = AggregationNode::new(AggregationKind::ScriptedMetric)
            .with_result_declaration(Shape::empty_record());
        let err = ResultShapeInferencer::new(&schema)
            .infer_node("s", &node)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResultDeclaration { .. }));
    }

    #[test]
    fn test_builder_tree_is_checked_too() {
        let schema = schema();
        let inferencer = ResultShapeInferencer::new(&schema);

        let node = AggregationNode::new(AggregationKind::Avg)
            .with_field("user.age")
            .with_sub_aggregation("x", AggregationNode::new(AggregationKind::Global))
            .unwrap();
        let err = inferencer.infer_node("a", &node).unwrap_err();
        assert!(matches!(err, Error::IllegalNesting { .. }));

        let aggs = NamedAggregations::new()
            .with("a>b", AggregationNode::new(AggregationKind::Global))
            .unwrap();
        assert!(matches!(
            inferencer.infer(&aggs).unwrap_err(),
            Error::InvalidAggregationName { .. }
        ));
    }

    #[test]
    fn test_sub_aggregation_cannot_shadow_bucket_fields() {
        let err = infer(json!({
            "t": {"terms": {"field": "user.country"}, "aggs": {"doc_count": {"max": {"field": "user.age"}}}}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAggregationName { path, .. } if path == "t>doc_count"));
    }

    #[test]
    fn test_depth_limit_on_built_trees() {
        let schema = schema();
        let inferencer = ResultShapeInferencer::with_config(
            &schema,
            InferenceConfig {
                max_depth: 3,
                ..InferenceConfig::default()
            },
        );
        let mut node = AggregationNode::new(AggregationKind::Global);
        for _ in 0..3 {
            node = AggregationNode::new(AggregationKind::Global)
                .with_sub_aggregation("g", node)
                .unwrap();
        }
        let err = inferencer.infer_node("g", &node).unwrap_err();
        assert!(matches!(err, Error::MaxDepthExceeded { limit: 3, .. }));
    }

    #[test]
    fn test_geo_and_ip_kinds() {
        let tree = infer(json!({
            "grid": {"geotile_grid": {"field": "location"}},
            "box": {"geo_bounds": {"field": "location"}},
            "nets": {"ip_prefix": {"field": "client_ip", "prefix_length": 24}}
        }))
        .unwrap();
        assert_eq!(
            tree["grid"].get_path(&["buckets", "[]", "key"]),
            Some(&Shape::string())
        );
        assert!(tree["box"].get_path(&["bounds", "top_left"]).is_some());

        let err = infer(json!({"grid": {"geohash_grid": {"field": "client_ip"}}})).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_aggregations_shape() {
        let tree = infer(json!({"n": {"value_count": {"field": "user.name"}}})).unwrap();
        assert_eq!(
            aggregations_shape(&tree).to_string(),
            "{ n: { value: number | null, value_as_string?: string } }"
        );
    }
}
