//! Static classification of every aggregation kind.
//!
//! Each kind has one [`AggregationKindSpec`] row describing which fields it
//! reads, whether it may carry sub-aggregations and which response family it
//! answers with. The table is built once per process and shared read-only
//! through [`registry()`].

mod kinds;
mod templates;

pub use kinds::{AggregationKind, UnknownKind};
pub use templates::{bucket_key, BaseShape, BucketTemplate, ResultTemplate, TemplateInput};

use crate::schema::TypeFilter;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    LeafNumeric,
    LeafGeneric,
    Bucket,
    Pipeline,
    Special,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::LeafNumeric,
        Category::LeafGeneric,
        Category::Bucket,
        Category::Pipeline,
        Category::Special,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::LeafNumeric => "leaf_numeric",
            Category::LeafGeneric => "leaf_generic",
            Category::Bucket => "bucket",
            Category::Pipeline => "pipeline",
            Category::Special => "special",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// How a kind uses its top-level `field` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRequirement {
    None,
    Optional(TypeFilter),
    /// Required unless a `script` is given instead
    Required(TypeFilter),
}

impl FieldRequirement {
    pub fn filter(&self) -> Option<TypeFilter> {
        match self {
            FieldRequirement::None => None,
            FieldRequirement::Optional(f) | FieldRequirement::Required(f) => Some(*f),
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, FieldRequirement::Required(_))
    }
}

/// What happens to `aggs` declared under a node of this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    Forbidden,
    /// Sub-results are merged into each bucket (or the single bucket)
    Merged,
    /// Accepted and validated, but not part of the response
    Discarded,
}

/// A field reference nested inside a kind's parameters, such as
/// `weighted_avg.value.field`.
///
/// `pointer` segments are separated by `/`. `*` visits every element of an
/// array (a non-array value counts as its only element) and `~` visits every
/// value of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub pointer: &'static str,
    pub filter: TypeFilter,
    pub required: bool,
}

/// One step of a [`FieldRef`] walk over concrete parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Located<'v> {
    Field { location: String, value: &'v Value },
    Missing { location: String },
}

impl FieldRef {
    const fn required(pointer: &'static str, filter: TypeFilter) -> Self {
        Self {
            pointer,
            filter,
            required: true,
        }
    }

    const fn optional(pointer: &'static str, filter: TypeFilter) -> Self {
        Self {
            pointer,
            filter,
            required: false,
        }
    }

    /// Every position in `params` this reference points at.
    pub fn locate<'v>(&self, params: &'v Value) -> Vec<Located<'v>> {
        let segments: Vec<&str> = self.pointer.split('/').collect();
        let mut out = Vec::new();
        locate_in(params, &segments, String::new(), &mut out);
        out
    }
}

fn locate_in<'v>(value: &'v Value, segments: &[&str], location: String, out: &mut Vec<Located<'v>>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(Located::Field { location, value });
        return;
    };

    match *segment {
        "*" => match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    locate_in(item, rest, format!("{}[{}]", location, i), out);
                }
            }
            other => locate_in(other, rest, location, out),
        },
        "~" => {
            if let Value::Object(obj) = value {
                for (key, child) in obj {
                    locate_in(child, rest, join(&location, key), out);
                }
            }
        }
        key => {
            let location = join(&location, key);
            match value.get(key) {
                Some(child) => locate_in(child, rest, location, out),
                // a script stands in for the field it replaces
                None if rest.is_empty() && value.get("script").is_some() => {}
                None => out.push(Located::Missing { location }),
            }
        }
    }
}

fn join(location: &str, key: &str) -> String {
    if location.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", location, key)
    }
}

/// Registry row for one aggregation kind.
#[derive(Debug, Clone)]
pub struct AggregationKindSpec {
    pub kind: AggregationKind,
    pub category: Category,
    pub field: FieldRequirement,
    pub field_refs: &'static [FieldRef],
    pub nesting: Nesting,
    pub template: ResultTemplate,
}

impl AggregationKindSpec {
    fn new(
        kind: AggregationKind,
        category: Category,
        field: FieldRequirement,
        nesting: Nesting,
        template: ResultTemplate,
    ) -> Self {
        Self {
            kind,
            category,
            field,
            field_refs: &[],
            nesting,
            template,
        }
    }

    fn refs(mut self, field_refs: &'static [FieldRef]) -> Self {
        self.field_refs = field_refs;
        self
    }

    /// Parent pipelines compute one number per bucket of the enclosing
    /// histogram, so they sit with the numeric leaves.
    pub fn is_parent_pipeline(&self) -> bool {
        use AggregationKind::*;
        matches!(
            self.kind,
            MovingAvg
                | MovingFn
                | MovingPercentiles
                | SerialDiff
                | Derivative
                | CumulativeSum
                | CumulativeCardinality
        )
    }

    /// Pipeline kinds read sibling results through `buckets_path`.
    pub fn takes_buckets_path(&self) -> bool {
        self.category == Category::Pipeline || self.is_parent_pipeline()
    }

    /// `bucket_sort` may run without `buckets_path` (it only truncates).
    pub fn requires_buckets_path(&self) -> bool {
        self.takes_buckets_path() && self.kind != AggregationKind::BucketSort
    }

    /// Kinds whose `keyed: true` turns buckets/values into a map.
    pub fn supports_keyed(&self) -> bool {
        use AggregationKind::*;
        matches!(
            self.kind,
            Range
                | DateRange
                | IpRange
                | GeoDistance
                | Histogram
                | DateHistogram
                | Percentiles
                | PercentileRanks
                | PercentilesBucket
                | MovingPercentiles
                | Filters
        )
    }

    /// Default of `keyed` when the request does not set it.
    pub fn keyed_by_default(&self) -> bool {
        self.template == ResultTemplate::Percentiles
    }
}

const WEIGHTED_AVG_REFS: &[FieldRef] = &[
    FieldRef::required("value/field", TypeFilter::Numeric),
    FieldRef::required("weight/field", TypeFilter::Numeric),
];
const T_TEST_REFS: &[FieldRef] = &[
    FieldRef::required("a/field", TypeFilter::Numeric),
    FieldRef::required("b/field", TypeFilter::Numeric),
];
const MULTI_TERMS_REFS: &[FieldRef] = &[FieldRef::required("terms/*/field", TypeFilter::Primitive)];
const COMPOSITE_REFS: &[FieldRef] = &[FieldRef::required("sources/*/~/~/field", TypeFilter::Any)];
const FREQUENT_ITEM_SETS_REFS: &[FieldRef] =
    &[FieldRef::required("fields/*/field", TypeFilter::Primitive)];
const GEO_LINE_REFS: &[FieldRef] = &[
    FieldRef::required("point/field", TypeFilter::Geo),
    FieldRef::optional("sort/field", TypeFilter::Temporal),
];
const MATRIX_STATS_REFS: &[FieldRef] = &[FieldRef::required("fields/*", TypeFilter::Numeric)];
const TOP_METRICS_REFS: &[FieldRef] = &[FieldRef::required("metrics/*/field", TypeFilter::Primitive)];

fn describe(kind: AggregationKind) -> AggregationKindSpec {
    use AggregationKind::*;
    use BucketTemplate as B;
    use Category::*;
    use FieldRequirement::{None as NoField, Optional, Required};
    use Nesting::*;
    use ResultTemplate as T;

    let spec = |category, field, nesting, template| {
        AggregationKindSpec::new(kind, category, field, nesting, template)
    };
    let numeric = |template| spec(LeafNumeric, Required(TypeFilter::Numeric), Forbidden, template);
    let generic = |template| spec(LeafGeneric, Required(TypeFilter::Any), Forbidden, template);
    let bucket = |field, template| spec(Bucket, field, Merged, template);
    let parent_pipeline = |template| spec(LeafNumeric, NoField, Forbidden, template);
    let sibling_pipeline = |template| spec(Pipeline, NoField, Discarded, template);
    let special = |field, template| spec(Special, field, Forbidden, template);

    match kind {
        Avg | Sum | Min | Max | MedianAbsoluteDeviation => numeric(T::SingleValue),
        Stats => numeric(T::Stats),
        ExtendedStats => numeric(T::ExtendedStats),
        Percentiles | PercentileRanks => numeric(T::Percentiles),
        Boxplot => numeric(T::Boxplot),
        WeightedAvg => spec(LeafNumeric, NoField, Forbidden, T::SingleValue).refs(WEIGHTED_AVG_REFS),
        TTest => spec(LeafNumeric, NoField, Forbidden, T::SingleValue).refs(T_TEST_REFS),
        Rate => spec(LeafNumeric, Optional(TypeFilter::Numeric), Forbidden, T::Rate),

        MovingAvg | MovingFn | CumulativeSum => parent_pipeline(T::SingleValue),
        SerialDiff | Derivative => parent_pipeline(T::Derivative),
        CumulativeCardinality => parent_pipeline(T::CountValue),
        MovingPercentiles => parent_pipeline(T::Percentiles),

        ValueCount => generic(T::SingleValue),
        Cardinality => generic(T::CountValue),
        Missing => generic(T::DocCount),
        StringStats => generic(T::StringStats),

        AdjacencyMatrix => bucket(NoField, T::Buckets(B::AdjacencyMatrix)),
        AutoDateHistogram => bucket(
            Optional(TypeFilter::Temporal),
            T::Buckets(B::AutoDateHistogram),
        ),
        Children | Filter | Global | Nested | Parent | ReverseNested | Sampler => {
            bucket(NoField, T::DocCount)
        }
        Composite => bucket(NoField, T::Buckets(B::Composite)).refs(COMPOSITE_REFS),
        DateHistogram => bucket(Optional(TypeFilter::Temporal), T::Buckets(B::DateHistogram)),
        DateRange => bucket(Optional(TypeFilter::Temporal), T::Buckets(B::Range)),
        DiversifiedSampler => bucket(Optional(TypeFilter::Primitive), T::DocCount),
        Filters => bucket(NoField, T::Buckets(B::Filters)),
        FrequentItemSets => {
            bucket(NoField, T::Buckets(B::FrequentItemSets)).refs(FREQUENT_ITEM_SETS_REFS)
        }
        GeoDistance => bucket(Required(TypeFilter::Geo), T::Buckets(B::Range)),
        GeohashGrid | GeotileGrid | GeohexGrid => {
            bucket(Required(TypeFilter::Geo), T::Buckets(B::GeoGrid))
        }
        Histogram => bucket(Optional(TypeFilter::Numeric), T::Buckets(B::Histogram)),
        IpRange => bucket(Optional(TypeFilter::Ip), T::Buckets(B::IpRange)),
        IpPrefix => bucket(Required(TypeFilter::Ip), T::Buckets(B::IpPrefix)),
        MultiTerms => bucket(NoField, T::Buckets(B::MultiTerms)).refs(MULTI_TERMS_REFS),
        Range => bucket(Optional(TypeFilter::Numeric), T::Buckets(B::Range)),
        RareTerms => bucket(Optional(TypeFilter::Primitive), T::Buckets(B::RareTerms)),
        RandomSampler => bucket(NoField, T::RandomSampler),
        SignificantTerms => bucket(
            Optional(TypeFilter::Primitive),
            T::Buckets(B::SignificantTerms),
        ),
        SignificantText => bucket(Required(TypeFilter::Text), T::Buckets(B::SignificantTerms)),
        Terms => bucket(Optional(TypeFilter::Primitive), T::Buckets(B::Terms)),
        TimeSeries => bucket(NoField, T::Buckets(B::TimeSeries)),
        VariableWidthHistogram => bucket(
            Optional(TypeFilter::Numeric),
            T::Buckets(B::VariableWidthHistogram),
        ),

        AvgBucket | SumBucket | BucketScript => sibling_pipeline(T::SingleValue),
        MaxBucket | MinBucket => sibling_pipeline(T::BucketMetricValue),
        StatsBucket => sibling_pipeline(T::Stats),
        ExtendedStatsBucket => sibling_pipeline(T::ExtendedStats),
        PercentilesBucket => sibling_pipeline(T::Percentiles),
        BucketSelector | BucketSort | BucketCountKsTest | BucketCorrelation | Normalize => {
            sibling_pipeline(T::Empty)
        }

        TopHits => special(NoField, T::TopHits),
        ScriptedMetric => special(NoField, T::ScriptedMetric),
        Inference => special(NoField, T::Inference),
        GeoBounds => special(Required(TypeFilter::Geo), T::GeoBounds),
        GeoCentroid => special(Required(TypeFilter::Geo), T::GeoCentroid),
        GeoLine => special(NoField, T::GeoLine).refs(GEO_LINE_REFS),
        MatrixStats => special(NoField, T::MatrixStats).refs(MATRIX_STATS_REFS),
        TopMetrics => special(NoField, T::TopMetrics).refs(TOP_METRICS_REFS),
        CategorizeText => special(Required(TypeFilter::Text), T::Buckets(B::CategorizeText)),
    }
}

/// Read-only table of every aggregation kind.
pub struct AggregationKindRegistry {
    specs: Vec<AggregationKindSpec>,
    by_name: HashMap<&'static str, AggregationKind>,
}

impl AggregationKindRegistry {
    /// Build the table of built-in kinds.
    pub fn builtin() -> Self {
        let specs: Vec<AggregationKindSpec> =
            AggregationKind::ALL.iter().map(|k| describe(*k)).collect();
        let by_name = AggregationKind::ALL
            .iter()
            .map(|k| (k.as_str(), *k))
            .collect();
        tracing::debug!("Registered {} aggregation kinds", specs.len());
        Self { specs, by_name }
    }

    /// Look a kind up by its wire name.
    pub fn lookup(&self, name: &str) -> Result<&AggregationKindSpec, UnknownKind> {
        self.by_name
            .get(name)
            .map(|kind| self.get(*kind))
            .ok_or_else(|| UnknownKind(name.to_string()))
    }

    /// Every kind has a row; rows are stored in declaration order.
    pub fn get(&self, kind: AggregationKind) -> &AggregationKindSpec {
        &self.specs[kind as usize]
    }

    pub fn is_kind(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregationKindSpec> {
        self.specs.iter()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &AggregationKindSpec> {
        self.specs.iter().filter(move |s| s.category == category)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

static REGISTRY: OnceLock<AggregationKindRegistry> = OnceLock::new();

/// The process-wide registry, built on first use.
pub fn registry() -> &'static AggregationKindRegistry {
    REGISTRY.get_or_init(AggregationKindRegistry::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_line_up_with_kinds() {
        let registry = registry();
        assert_eq!(registry.len(), AggregationKind::ALL.len());
        for kind in AggregationKind::ALL {
            assert_eq!(registry.get(*kind).kind, *kind);
        }
    }

    #[test]
    fn test_category_sizes() {
        let count = |c| registry().by_category(c).count();
        assert_eq!(count(Category::LeafNumeric), 20);
        assert_eq!(count(Category::Pipeline), 13);
        assert_eq!(count(Category::LeafGeneric), 4);
        assert_eq!(count(Category::Bucket), 31);
        assert_eq!(count(Category::Special), 9);
    }

    #[test]
    fn test_lookup() {
        let avg = registry().lookup("avg").unwrap();
        assert_eq!(avg.category, Category::LeafNumeric);
        assert_eq!(avg.field, FieldRequirement::Required(TypeFilter::Numeric));
        assert_eq!(avg.nesting, Nesting::Forbidden);

        let terms = registry().lookup("terms").unwrap();
        assert_eq!(terms.nesting, Nesting::Merged);
        assert!(!terms.field.is_required());

        assert_eq!(registry().lookup("aggs").unwrap_err().0, "aggs");
    }

    #[test]
    fn test_pipeline_rows() {
        let sort = registry().get(AggregationKind::BucketSort);
        assert!(sort.takes_buckets_path());
        assert!(!sort.requires_buckets_path());
        assert_eq!(sort.nesting, Nesting::Discarded);

        let derivative = registry().get(AggregationKind::Derivative);
        assert_eq!(derivative.category, Category::LeafNumeric);
        assert!(derivative.is_parent_pipeline());
        assert!(derivative.requires_buckets_path());
        assert_eq!(derivative.nesting, Nesting::Forbidden);

        let avg = registry().get(AggregationKind::Avg);
        assert!(!avg.takes_buckets_path());
    }

    #[test]
    fn test_missing_is_a_generic_leaf() {
        let missing = registry().get(AggregationKind::Missing);
        assert_eq!(missing.category, Category::LeafGeneric);
        assert_eq!(missing.nesting, Nesting::Forbidden);
        assert_eq!(missing.template, ResultTemplate::DocCount);
    }

    #[test]
    fn test_same_instance_everywhere() {
        let a = registry() as *const AggregationKindRegistry;
        let handle = std::thread::spawn(|| registry() as *const AggregationKindRegistry as usize);
        assert_eq!(a as usize, handle.join().unwrap());
    }

    #[test]
    fn test_locate_nested_refs() {
        let params = json!({
            "sources": [
                {"day": {"date_histogram": {"field": "at"}}},
                {"who": {"terms": {"script": "doc['x']"}}}
            ]
        });
        let found = COMPOSITE_REFS[0].locate(&params);
        assert_eq!(
            found,
            vec![Located::Field {
                location: "sources[0].day.date_histogram.field".to_string(),
                value: &json!("at"),
            }]
        );
    }

    #[test]
    fn test_locate_missing_and_single_object() {
        let params = json!({"value": {"field": "x"}});
        let found = WEIGHTED_AVG_REFS[1].locate(&params);
        assert_eq!(
            found,
            vec![Located::Missing {
                location: "weight".to_string()
            }]
        );

        let params = json!({"metrics": {"field": "price"}});
        let found = TOP_METRICS_REFS[0].locate(&params);
        assert!(matches!(&found[..], [Located::Field { location, .. }] if location == "metrics.field"));
    }

    #[test]
    fn test_category_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!("metric".parse::<Category>().is_err());
    }
}
