//! Base result shapes, one template per family of aggregation responses.

use crate::schema::{FieldType, LeafType};
use crate::shape::{Record, Shape};

/// Response family an aggregation kind answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTemplate {
    /// `{value: number|null}`
    SingleValue,
    /// `{value: number}`; cardinality-style counts are never null
    CountValue,
    Derivative,
    /// `max_bucket`/`min_bucket`: the value plus the keys that produced it
    BucketMetricValue,
    Stats,
    ExtendedStats,
    Percentiles,
    Boxplot,
    StringStats,
    Rate,
    DocCount,
    RandomSampler,
    /// No body beyond `meta`
    Empty,
    TopHits,
    ScriptedMetric,
    Inference,
    GeoBounds,
    GeoCentroid,
    GeoLine,
    MatrixStats,
    TopMetrics,
    Buckets(BucketTemplate),
}

/// Bucket layout of multi-bucket kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketTemplate {
    Terms,
    MultiTerms,
    RareTerms,
    SignificantTerms,
    Histogram,
    DateHistogram,
    AutoDateHistogram,
    VariableWidthHistogram,
    Range,
    IpRange,
    IpPrefix,
    Filters,
    AdjacencyMatrix,
    Composite,
    GeoGrid,
    TimeSeries,
    FrequentItemSets,
    CategorizeText,
}

/// Request-dependent pieces a template is filled with.
#[derive(Debug, Clone)]
pub struct TemplateInput {
    /// Bucket key shape; `None` falls back to the kind's default
    pub key: Option<Shape>,
    pub keyed: bool,
    /// `_source` shape of `top_hits` hits
    pub document: Shape,
    pub declared: Option<Shape>,
    /// Per-metric shapes of `top_metrics`
    pub metrics: Record,
}

impl Default for TemplateInput {
    fn default() -> Self {
        Self {
            key: None,
            keyed: false,
            document: Shape::Any,
            declared: None,
            metrics: Record::new(),
        }
    }
}

/// A template filled in, waiting for sub-aggregation results.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseShape {
    Value(Record),
    /// Sub-aggregation results merge into the record itself
    SingleBucket(Record),
    /// Sub-aggregation results merge into every bucket
    MultiBucket {
        outer: Record,
        bucket: Record,
        keyed: bool,
    },
}

impl BaseShape {
    /// Complete the shape with the results of the node's sub-aggregations.
    pub fn finish(self, subs: Record) -> Shape {
        match self {
            BaseShape::Value(mut record) | BaseShape::SingleBucket(mut record) => {
                record.merge(subs);
                Shape::Record(record)
            }
            BaseShape::MultiBucket {
                mut outer,
                mut bucket,
                keyed,
            } => {
                bucket.merge(subs);
                let bucket = Shape::Record(bucket);
                let buckets = if keyed {
                    Shape::map(bucket)
                } else {
                    Shape::array(bucket)
                };
                outer.insert("buckets", buckets, false);
                Shape::Record(outer)
            }
        }
    }

    /// The record sub-aggregation results are merged into.
    pub fn merge_target(&self) -> &Record {
        match self {
            BaseShape::Value(record) | BaseShape::SingleBucket(record) => record,
            BaseShape::MultiBucket { bucket, .. } => bucket,
        }
    }

    pub fn is_bucketed(&self) -> bool {
        !matches!(self, BaseShape::Value(_))
    }
}

/// Shape of a bucket `key` produced from a field of type `ty`.
///
/// Dates and booleans come back as numbers (epoch millis, `0`/`1`) with the
/// readable form in `key_as_string`.
pub fn bucket_key(ty: FieldType) -> Shape {
    match ty {
        FieldType::Dynamic => Shape::Any,
        FieldType::Leaf(LeafType::Number | LeafType::Date | LeafType::Boolean) => Shape::number(),
        FieldType::Leaf(LeafType::String | LeafType::Ip | LeafType::GeoPoint) => Shape::string(),
    }
}

fn nullable_number() -> Shape {
    Shape::nullable(Shape::number())
}

fn single_value() -> Record {
    Record::new()
        .required("value", nullable_number())
        .optional("value_as_string", Shape::string())
}

fn stats() -> Record {
    Record::new()
        .required("count", Shape::number())
        .required("min", nullable_number())
        .required("max", nullable_number())
        .required("avg", nullable_number())
        .required("sum", Shape::number())
        .optional("min_as_string", Shape::string())
        .optional("max_as_string", Shape::string())
        .optional("avg_as_string", Shape::string())
        .optional("sum_as_string", Shape::string())
}

fn extended_stats() -> Record {
    let mut record = stats();
    for name in [
        "sum_of_squares",
        "variance",
        "variance_population",
        "variance_sampling",
        "std_deviation",
        "std_deviation_population",
        "std_deviation_sampling",
    ] {
        record.insert(name, nullable_number(), false);
    }
    let mut bounds = Record::new();
    for name in [
        "upper",
        "lower",
        "upper_population",
        "lower_population",
        "upper_sampling",
        "lower_sampling",
    ] {
        bounds.insert(name, nullable_number(), false);
    }
    record.optional("std_deviation_bounds", Shape::Record(bounds))
}

fn percentiles(keyed: bool) -> Record {
    let values = if keyed {
        Shape::map(nullable_number())
    } else {
        Shape::array(Shape::Record(
            Record::new()
                .required("key", Shape::number())
                .required("value", nullable_number())
                .optional("value_as_string", Shape::string()),
        ))
    };
    Record::new().required("values", values)
}

fn boxplot() -> Record {
    let mut record = Record::new();
    for name in ["min", "max", "q1", "q2", "q3", "lower", "upper"] {
        record.insert(name, Shape::number(), false);
        record.insert(&format!("{}_as_string", name), Shape::string(), true);
    }
    record
}

fn top_hits(document: Shape) -> Record {
    let hit = Record::new()
        .required("_index", Shape::string())
        .required("_id", Shape::string())
        .required("_source", document)
        .optional("_score", nullable_number())
        .optional("fields", Shape::map(Shape::Any))
        .optional("sort", Shape::array(Shape::Any));
    let total = Record::new()
        .required("value", Shape::number())
        .required("relation", Shape::string());
    let hits = Record::new()
        .required("total", Shape::Record(total))
        .required("max_score", nullable_number())
        .required("hits", Shape::array(Shape::Record(hit)));
    Record::new().required("hits", Shape::Record(hits))
}

fn matrix_stats() -> Record {
    let field = Record::new()
        .required("name", Shape::string())
        .required("count", Shape::number())
        .required("mean", Shape::number())
        .required("variance", Shape::number())
        .required("skewness", Shape::number())
        .required("kurtosis", Shape::number())
        .required("covariance", Shape::map(Shape::number()))
        .required("correlation", Shape::map(Shape::number()));
    Record::new()
        .required("doc_count", Shape::number())
        .optional("fields", Shape::array(Shape::Record(field)))
}

fn geo_point() -> Shape {
    Shape::Scalar(LeafType::GeoPoint)
}

fn doc_count() -> Record {
    Record::new().required("doc_count", Shape::number())
}

impl ResultTemplate {
    pub fn build(&self, input: &TemplateInput) -> BaseShape {
        let record = match self {
            ResultTemplate::SingleValue => single_value(),
            ResultTemplate::CountValue | ResultTemplate::Rate => Record::new()
                .required("value", Shape::number())
                .optional("value_as_string", Shape::string()),
            ResultTemplate::Derivative => single_value()
                .optional("normalized_value", Shape::number())
                .optional("normalized_value_as_string", Shape::string()),
            ResultTemplate::BucketMetricValue => {
                single_value().required("keys", Shape::array(Shape::string()))
            }
            ResultTemplate::Stats => stats(),
            ResultTemplate::ExtendedStats => extended_stats(),
            ResultTemplate::Percentiles => percentiles(input.keyed),
            ResultTemplate::Boxplot => boxplot(),
            ResultTemplate::StringStats => Record::new()
                .required("count", Shape::number())
                .required("min_length", nullable_number())
                .required("max_length", nullable_number())
                .required("avg_length", nullable_number())
                .required("entropy", nullable_number())
                .optional("distribution", Shape::map(Shape::number())),
            ResultTemplate::DocCount => return BaseShape::SingleBucket(doc_count()),
            ResultTemplate::RandomSampler => {
                return BaseShape::SingleBucket(
                    doc_count()
                        .required("seed", Shape::number())
                        .required("probability", Shape::number()),
                )
            }
            ResultTemplate::Empty => Record::new(),
            ResultTemplate::TopHits => top_hits(input.document.clone()),
            ResultTemplate::ScriptedMetric => {
                Record::new().required("value", input.declared.clone().unwrap_or(Shape::Any))
            }
            ResultTemplate::Inference => {
                let importance = Record::new()
                    .required("feature_name", Shape::string())
                    .optional("importance", Shape::number())
                    .optional("classes", Shape::array(Shape::Any));
                Record::new()
                    .optional("value", Shape::Any)
                    .optional("feature_importance", Shape::array(Shape::Record(importance)))
                    .optional("top_classes", Shape::array(Shape::Any))
                    .optional("warning", Shape::string())
            }
            ResultTemplate::GeoBounds => Record::new().optional(
                "bounds",
                Shape::Record(
                    Record::new()
                        .required("top_left", geo_point())
                        .required("bottom_right", geo_point()),
                ),
            ),
            ResultTemplate::GeoCentroid => Record::new()
                .required("count", Shape::number())
                .optional("location", geo_point()),
            ResultTemplate::GeoLine => Record::new()
                .required("type", Shape::string())
                .required(
                    "geometry",
                    Shape::Record(
                        Record::new()
                            .required("type", Shape::string())
                            .required("coordinates", Shape::array(Shape::array(Shape::number()))),
                    ),
                )
                .required("properties", Shape::Any),
            ResultTemplate::MatrixStats => matrix_stats(),
            ResultTemplate::TopMetrics => {
                let top = Record::new()
                    .required("sort", Shape::array(Shape::Any))
                    .required("metrics", Shape::Record(input.metrics.clone()));
                Record::new().required("top", Shape::array(Shape::Record(top)))
            }
            ResultTemplate::Buckets(template) => return template.build(input),
        };
        BaseShape::Value(record)
    }
}

impl BucketTemplate {
    fn build(&self, input: &TemplateInput) -> BaseShape {
        let key = |default: Shape| input.key.clone().unwrap_or(default);
        let mut outer = Record::new();
        let mut keyed = false;

        let bucket = match self {
            BucketTemplate::Terms => {
                outer = term_counts();
                doc_count()
                    .required("key", key(Shape::Any))
                    .optional("key_as_string", Shape::string())
                    .optional("doc_count_error_upper_bound", Shape::number())
            }
            BucketTemplate::MultiTerms => {
                outer = term_counts();
                doc_count()
                    .required("key", Shape::array(key(Shape::Any)))
                    .required("key_as_string", Shape::string())
                    .optional("doc_count_error_upper_bound", Shape::number())
            }
            BucketTemplate::RareTerms => doc_count()
                .required("key", key(Shape::Any))
                .optional("key_as_string", Shape::string()),
            BucketTemplate::SignificantTerms => {
                outer = Record::new()
                    .optional("doc_count", Shape::number())
                    .optional("bg_count", Shape::number());
                doc_count()
                    .required("key", key(Shape::string()))
                    .required("score", Shape::number())
                    .required("bg_count", Shape::number())
            }
            BucketTemplate::Histogram | BucketTemplate::DateHistogram => {
                keyed = input.keyed;
                doc_count()
                    .required("key", key(Shape::number()))
                    .optional("key_as_string", Shape::string())
            }
            BucketTemplate::AutoDateHistogram => {
                outer = Record::new().required("interval", Shape::string());
                doc_count()
                    .required("key", Shape::number())
                    .optional("key_as_string", Shape::string())
            }
            BucketTemplate::VariableWidthHistogram => doc_count()
                .required("min", Shape::number())
                .required("key", Shape::number())
                .required("max", Shape::number())
                .optional("min_as_string", Shape::string())
                .optional("key_as_string", Shape::string())
                .optional("max_as_string", Shape::string()),
            BucketTemplate::Range => {
                keyed = input.keyed;
                doc_count()
                    .optional("key", Shape::string())
                    .optional("from", Shape::number())
                    .optional("to", Shape::number())
                    .optional("from_as_string", Shape::string())
                    .optional("to_as_string", Shape::string())
            }
            BucketTemplate::IpRange => {
                keyed = input.keyed;
                doc_count()
                    .optional("key", Shape::string())
                    .optional("from", Shape::nullable(Shape::string()))
                    .optional("to", Shape::nullable(Shape::string()))
            }
            BucketTemplate::IpPrefix => doc_count()
                .required("key", Shape::string())
                .required("is_ipv6", Shape::boolean())
                .required("prefix_length", Shape::number())
                .optional("netmask", Shape::string()),
            BucketTemplate::Filters => {
                keyed = input.keyed;
                doc_count().optional("key", Shape::string())
            }
            BucketTemplate::AdjacencyMatrix | BucketTemplate::GeoGrid => {
                doc_count().required("key", Shape::string())
            }
            BucketTemplate::Composite => {
                let key = key(Shape::map(Shape::Any));
                outer = Record::new().optional("after_key", key.clone());
                doc_count().required("key", key)
            }
            BucketTemplate::TimeSeries => doc_count().required("key", Shape::map(Shape::Any)),
            BucketTemplate::FrequentItemSets => doc_count()
                .required("key", Shape::map(Shape::array(Shape::string())))
                .required("support", Shape::number()),
            BucketTemplate::CategorizeText => doc_count()
                .required("key", Shape::string())
                .optional("max_matching_length", Shape::number())
                .optional("regex", Shape::string()),
        };

        BaseShape::MultiBucket {
            outer,
            bucket,
            keyed,
        }
    }
}

fn term_counts() -> Record {
    Record::new()
        .optional("doc_count_error_upper_bound", Shape::number())
        .optional("sum_other_doc_count", Shape::number())
}
