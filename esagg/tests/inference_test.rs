//! End-to-end inference over schemas loaded from disk.

use esagg::schema::{DocumentSchema, SchemaLoader};
use esagg::shape::Shape;
use esagg::{infer_request, Error, ResultShapeInferencer};
use serde_json::json;
use tempfile::TempDir;

fn users_yaml() -> &'static str {
    r#"
name: users
fields:
  user:
    properties:
      age: number
      name: string
  created_at: date
"#
}

fn load_users() -> (TempDir, DocumentSchema) {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("users.yaml"), users_yaml()).unwrap();
    let mut schemas = SchemaLoader::new(temp.path()).load_all().unwrap();
    let schema = schemas.remove("users").unwrap();
    (temp, schema)
}

fn with_country() -> DocumentSchema {
    serde_yaml::from_str(
        r#"
fields:
  user:
    properties:
      age: number
      name: string
      country: { type: text, fields: { keyword: keyword } }
"#,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Worked scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_avg_value_is_nullable_number() {
    let (_temp, schema) = load_users();
    let tree = infer_request(r#"{"avgAge": {"avg": {"field": "user.age"}}}"#, &schema).unwrap();

    assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["avgAge"]);
    assert_eq!(
        tree["avgAge"].get_path(&["value"]),
        Some(&Shape::nullable(Shape::number()))
    );
}

#[test]
fn test_terms_on_missing_field_fails() {
    let (_temp, schema) = load_users();
    let err =
        infer_request(r#"{"byCountry": {"terms": {"field": "user.country"}}}"#, &schema).unwrap_err();

    assert!(err.is_validation());
    assert_eq!(err.error_type(), "invalid_field_path");
    assert_eq!(err.aggregation_name(), Some("byCountry"));
}

#[test]
fn test_two_kinds_on_one_node_fail() {
    let (_temp, schema) = load_users();
    let err = infer_request(
        r#"{"x": {"avg": {"field": "user.age"}, "sum": {"field": "user.age"}}}"#,
        &schema,
    )
    .unwrap_err();
    match err {
        Error::AmbiguousKind { keys, .. } => assert_eq!(keys, vec!["avg", "sum"]),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_buckets_carry_sub_aggregation_results() {
    let schema = with_country();
    let request = json!({
        "byCountry": {
            "terms": {"field": "user.country"},
            "aggs": {"avgAge": {"avg": {"field": "user.age"}}}
        }
    });
    let tree = infer_request(&request.to_string(), &schema).unwrap();

    let bucket = tree["byCountry"]
        .get_path(&["buckets", "[]"])
        .and_then(Shape::as_record)
        .unwrap();
    assert_eq!(bucket.get("key"), Some(&Shape::string()));
    assert_eq!(bucket.get("doc_count"), Some(&Shape::number()));
    assert!(bucket.get("avgAge").and_then(|s| s.get_path(&["value"])).is_some());
}

#[test]
fn test_top_hits_source_picks_listed_paths() {
    let (_temp, schema) = load_users();
    let tree = infer_request(
        r#"{"latest": {"top_hits": {"size": 1, "_source": ["user.name"]}}}"#,
        &schema,
    )
    .unwrap();

    let source = tree["latest"]
        .get_path(&["hits", "hits", "[]", "_source"])
        .unwrap();
    assert_eq!(source.to_string(), "{ user: { name: string } }");
}

// ---------------------------------------------------------------------------
// Schemas from mappings
// ---------------------------------------------------------------------------

#[test]
fn test_mapping_multi_fields_type_terms_keys() {
    let mapping = json!({
        "logs": {
            "mappings": {
                "properties": {
                    "message": {"type": "text", "fields": {"raw": {"type": "keyword"}}},
                    "status": {"type": "short"},
                    "@timestamp": {"type": "date"},
                    "labels": {"type": "flattened"}
                }
            }
        }
    });
    let schema = DocumentSchema::from_es_mapping(&mapping).unwrap();
    let request = json!({
        "by_status": {
            "terms": {"field": "status"},
            "aggs": {
                "messages": {"terms": {"field": "message.raw"}},
                "worst": {"max": {"field": "status"}},
                "envs": {"terms": {"field": "labels.env"}}
            }
        }
    });
    let tree = infer_request(&request.to_string(), &schema).unwrap();

    let bucket = tree["by_status"].get_path(&["buckets", "[]"]).unwrap();
    assert_eq!(bucket.get_path(&["key"]), Some(&Shape::number()));
    assert_eq!(
        bucket.get_path(&["messages", "buckets", "[]", "key"]),
        Some(&Shape::string())
    );
    assert_eq!(
        bucket.get_path(&["envs", "buckets", "[]", "key"]),
        Some(&Shape::Any)
    );
}

#[test]
fn test_mapping_keyword_rejected_by_numeric_metric() {
    let mapping = json!({"properties": {"title": {"type": "keyword"}}});
    let schema = DocumentSchema::from_es_mapping(&mapping).unwrap();
    let err = infer_request(r#"{"s": {"sum": {"field": "title"}}}"#, &schema).unwrap_err();
    assert_eq!(err.error_type(), "field_type_mismatch");
}

// ---------------------------------------------------------------------------
// Whole-request behaviour
// ---------------------------------------------------------------------------

#[test]
fn test_one_bad_node_rejects_the_tree() {
    let (_temp, schema) = load_users();
    let request = json!({
        "fine": {"avg": {"field": "user.age"}},
        "per_day": {
            "date_histogram": {"field": "created_at", "calendar_interval": "day"},
            "aggs": {"broken": {"cardinality": {"field": "user.nickname"}}}
        }
    });
    let err = infer_request(&request.to_string(), &schema).unwrap_err();
    assert_eq!(err.aggregation_path(), Some("per_day>broken"));
}

#[test]
fn test_duplicate_names_in_text_are_detected() {
    let (_temp, schema) = load_users();
    let err = infer_request(
        r#"{"a": {"avg": {"field": "user.age"}}, "a": {"max": {"field": "user.age"}}}"#,
        &schema,
    )
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateName { name, .. } if name == "a"));
}

#[test]
fn test_aggregations_section_shape_serializes() {
    let (_temp, schema) = load_users();
    let tree = infer_request(
        r#"{"n": {"value_count": {"field": "user.name"}, "meta": {"owner": "ops"}}}"#,
        &schema,
    )
    .unwrap();
    let section = esagg::aggregations_shape(&tree);
    assert_eq!(
        serde_json::to_value(&section).unwrap(),
        json!({"n": {"meta": "any", "value": "number|null", "value_as_string?": "string"}})
    );
}

#[test]
fn test_builder_matches_wire_request() {
    use esagg::{AggregationKind, AggregationNode, NamedAggregations};

    let (_temp, schema) = load_users();
    let built = NamedAggregations::new()
        .with(
            "per_day",
            AggregationNode::new(AggregationKind::DateHistogram)
                .with_field("created_at")
                .with_param("calendar_interval", json!("day"))
                .with_sub_aggregation(
                    "oldest",
                    AggregationNode::new(AggregationKind::Max).with_field("user.age"),
                )
                .unwrap(),
        )
        .unwrap();

    let inferencer = ResultShapeInferencer::new(&schema);
    let from_builder = inferencer.infer(&built).unwrap();
    let from_wire = infer_request(&built.to_request_body().to_string(), &schema).unwrap();
    assert_eq!(from_builder, from_wire);
}
