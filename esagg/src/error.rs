//! Error types for aggregation validation and shape inference

/// Errors produced while validating an aggregation request tree or inferring
/// its result shape.
///
/// Every validation variant carries the aggregation `name` it was raised for and
/// the `path` of aggregation names leading to it (joined with `>`, the way
/// Elasticsearch spells `buckets_path`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Aggregation '{path}' selects more than one kind: {}", keys.join(", "))]
    AmbiguousKind {
        name: String,
        path: String,
        keys: Vec<String>,
    },

    #[error("Aggregation '{path}' does not select any kind")]
    EmptyKind { name: String, path: String },

    #[error("Aggregation '{path}' uses unknown kind '{kind}'")]
    UnknownKind {
        name: String,
        path: String,
        kind: String,
    },

    #[error("Aggregation '{path}' references invalid field '{field}': {reason}")]
    InvalidFieldPath {
        name: String,
        path: String,
        field: String,
        reason: String,
    },

    #[error("Aggregation '{path}' expects a {expected} field but '{field}' is {found}")]
    TypeMismatch {
        name: String,
        path: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("Aggregation '{path}' of kind '{kind}' cannot have sub-aggregations")]
    IllegalNesting {
        name: String,
        path: String,
        kind: String,
    },

    #[error("Duplicate aggregation name '{name}' at '{path}'")]
    DuplicateName { name: String, path: String },

    #[error("Aggregation '{path}' has an invalid source filter: {reason}")]
    InvalidSourceFilter {
        name: String,
        path: String,
        reason: String,
    },

    #[error("Aggregation '{path}' has an invalid buckets_path '{reference}'")]
    InvalidBucketsPath {
        name: String,
        path: String,
        reference: String,
    },

    #[error("Aggregation '{path}' declares an invalid result type: {reason}")]
    InvalidResultDeclaration {
        name: String,
        path: String,
        reason: String,
    },

    #[error("Invalid aggregation name '{name}' at '{path}'")]
    InvalidAggregationName { name: String, path: String },

    #[error("Aggregation '{path}' has invalid '{kind}' parameters: {reason}")]
    InvalidParams {
        name: String,
        path: String,
        kind: String,
        reason: String,
    },

    #[error("Aggregation '{path}' exceeds the maximum nesting depth of {limit}")]
    MaxDepthExceeded {
        name: String,
        path: String,
        limit: usize,
    },

    #[error("Unknown field path '{path}': {reason}")]
    UnknownPath { path: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Elasticsearch-style error type for the variant.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::AmbiguousKind { .. } => "ambiguous_aggregation_kind",
            Self::EmptyKind { .. } => "empty_aggregation_kind",
            Self::UnknownKind { .. } => "unknown_aggregation_kind",
            Self::InvalidFieldPath { .. } => "invalid_field_path",
            Self::TypeMismatch { .. } => "field_type_mismatch",
            Self::IllegalNesting { .. } => "illegal_nesting",
            Self::DuplicateName { .. } => "duplicate_aggregation_name",
            Self::InvalidSourceFilter { .. } => "invalid_source_filter",
            Self::InvalidBucketsPath { .. } => "invalid_buckets_path",
            Self::InvalidResultDeclaration { .. } => "invalid_result_declaration",
            Self::InvalidAggregationName { .. } => "invalid_aggregation_name",
            Self::InvalidParams { .. } => "parsing_exception",
            Self::MaxDepthExceeded { .. } => "max_depth_exceeded",
            Self::UnknownPath { .. } => "unknown_path",
            Self::Transport(_) => "transport_exception",
            Self::Schema(_) => "schema_exception",
            Self::Config(_) => "config_exception",
            Self::Io(_) => "io_exception",
            Self::Json(_) | Self::Yaml(_) | Self::Toml(_) => "parse_exception",
        }
    }

    /// True for errors raised locally while checking a request, before anything
    /// is sent to the search engine.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::Transport(_)
                | Self::Schema(_)
                | Self::Config(_)
                | Self::Io(_)
                | Self::Json(_)
                | Self::Yaml(_)
                | Self::Toml(_)
        )
    }

    /// Name of the aggregation the error was raised for, if any.
    pub fn aggregation_name(&self) -> Option<&str> {
        match self {
            Self::AmbiguousKind { name, .. }
            | Self::EmptyKind { name, .. }
            | Self::UnknownKind { name, .. }
            | Self::InvalidFieldPath { name, .. }
            | Self::TypeMismatch { name, .. }
            | Self::IllegalNesting { name, .. }
            | Self::DuplicateName { name, .. }
            | Self::InvalidSourceFilter { name, .. }
            | Self::InvalidBucketsPath { name, .. }
            | Self::InvalidResultDeclaration { name, .. }
            | Self::InvalidAggregationName { name, .. }
            | Self::InvalidParams { name, .. }
            | Self::MaxDepthExceeded { name, .. } => Some(name),
            _ => None,
        }
    }

    /// `>`-joined aggregation path the error was raised at, if any.
    pub fn aggregation_path(&self) -> Option<&str> {
        match self {
            Self::AmbiguousKind { path, .. }
            | Self::EmptyKind { path, .. }
            | Self::UnknownKind { path, .. }
            | Self::InvalidFieldPath { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::IllegalNesting { path, .. }
            | Self::DuplicateName { path, .. }
            | Self::InvalidSourceFilter { path, .. }
            | Self::InvalidBucketsPath { path, .. }
            | Self::InvalidResultDeclaration { path, .. }
            | Self::InvalidAggregationName { path, .. }
            | Self::InvalidParams { path, .. }
            | Self::MaxDepthExceeded { path, .. } => Some(path),
            _ => None,
        }
    }
}
