use std::fmt;
use std::str::FromStr;

macro_rules! aggregation_kinds {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Every aggregation kind understood by the registry, named as on the wire.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum AggregationKind {
            $($variant,)*
        }

        impl AggregationKind {
            pub const ALL: &'static [AggregationKind] = &[$(AggregationKind::$variant,)*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(AggregationKind::$variant => $name,)*
                }
            }
        }

        impl FromStr for AggregationKind {
            type Err = UnknownKind;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(AggregationKind::$variant),)*
                    other => Err(UnknownKind(other.to_string())),
                }
            }
        }
    };
}

aggregation_kinds! {
    // numeric metrics
    Avg => "avg",
    Sum => "sum",
    Min => "min",
    Max => "max",
    Stats => "stats",
    ExtendedStats => "extended_stats",
    Percentiles => "percentiles",
    PercentileRanks => "percentile_ranks",
    MedianAbsoluteDeviation => "median_absolute_deviation",
    WeightedAvg => "weighted_avg",
    Boxplot => "boxplot",
    TTest => "t_test",
    Rate => "rate",
    // parent pipelines
    MovingAvg => "moving_avg",
    MovingFn => "moving_fn",
    MovingPercentiles => "moving_percentiles",
    SerialDiff => "serial_diff",
    Derivative => "derivative",
    CumulativeSum => "cumulative_sum",
    CumulativeCardinality => "cumulative_cardinality",
    // generic metrics
    ValueCount => "value_count",
    Missing => "missing",
    Cardinality => "cardinality",
    StringStats => "string_stats",
    // buckets
    AdjacencyMatrix => "adjacency_matrix",
    AutoDateHistogram => "auto_date_histogram",
    Children => "children",
    Composite => "composite",
    DateHistogram => "date_histogram",
    DateRange => "date_range",
    DiversifiedSampler => "diversified_sampler",
    Filter => "filter",
    Filters => "filters",
    FrequentItemSets => "frequent_item_sets",
    GeoDistance => "geo_distance",
    GeohashGrid => "geohash_grid",
    GeotileGrid => "geotile_grid",
    GeohexGrid => "geohex_grid",
    Global => "global",
    Histogram => "histogram",
    IpRange => "ip_range",
    IpPrefix => "ip_prefix",
    MultiTerms => "multi_terms",
    Nested => "nested",
    Parent => "parent",
    Range => "range",
    RareTerms => "rare_terms",
    ReverseNested => "reverse_nested",
    RandomSampler => "random_sampler",
    Sampler => "sampler",
    SignificantTerms => "significant_terms",
    SignificantText => "significant_text",
    Terms => "terms",
    TimeSeries => "time_series",
    VariableWidthHistogram => "variable_width_histogram",
    // sibling pipelines
    AvgBucket => "avg_bucket",
    MaxBucket => "max_bucket",
    MinBucket => "min_bucket",
    SumBucket => "sum_bucket",
    StatsBucket => "stats_bucket",
    ExtendedStatsBucket => "extended_stats_bucket",
    PercentilesBucket => "percentiles_bucket",
    BucketScript => "bucket_script",
    BucketSelector => "bucket_selector",
    BucketSort => "bucket_sort",
    BucketCountKsTest => "bucket_count_ks_test",
    BucketCorrelation => "bucket_correlation",
    Normalize => "normalize",
    // special
    TopHits => "top_hits",
    ScriptedMetric => "scripted_metric",
    Inference => "inference",
    GeoBounds => "geo_bounds",
    GeoCentroid => "geo_centroid",
    GeoLine => "geo_line",
    MatrixStats => "matrix_stats",
    TopMetrics => "top_metrics",
    CategorizeText => "categorize_text",
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known aggregation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown aggregation kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in AggregationKind::ALL {
            assert_eq!(kind.as_str().parse::<AggregationKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_kind_count() {
        assert_eq!(AggregationKind::ALL.len(), 77);
    }

    #[test]
    fn test_unknown_name() {
        let err = "avgg".parse::<AggregationKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown aggregation kind 'avgg'");
    }
}
