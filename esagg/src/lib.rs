//! Schema-aware result shape inference for Elasticsearch aggregation requests
//!
//! Given a document schema and an aggregation request tree, this crate checks
//! that the request is well-formed and computes the shape of the
//! `aggregations` section the search engine will answer with.
//!
//! # Components
//!
//! - [`schema::SchemaPathResolver`] - dot-separated field paths against a schema
//! - [`source::SourceFilterResolver`] - `_source` include/exclude projections
//! - [`registry::AggregationKindRegistry`] - the taxonomy of aggregation kinds
//! - [`validate::ExclusivityValidator`] - one kind per node, unique names
//! - [`infer::ResultShapeInferencer`] - recursive result shape inference
//!
//! # Example
//!
//! ```
//! use esagg::schema::{DocumentSchema, LeafType, SchemaNode};
//!
//! let schema = DocumentSchema::new([("age", SchemaNode::leaf(LeafType::Number))]);
//! let tree = esagg::infer_request(r#"{"avg_age": {"avg": {"field": "age"}}}"#, &schema).unwrap();
//! assert_eq!(
//!     tree["avg_age"].to_string(),
//!     "{ value: number | null, value_as_string?: string }"
//! );
//! ```

pub mod config;
pub mod error;
pub mod infer;
pub mod registry;
pub mod request;
pub mod schema;
pub mod shape;
pub mod source;
pub mod validate;

pub use config::Config;
pub use error::{Error, Result};
pub use infer::{aggregations_shape, infer_request, Inferencer, ResultShapeInferencer, ResultTree};
pub use registry::{registry, AggregationKind, Category};
pub use request::{AggregationNode, NamedAggregations, RawAggregations};
pub use schema::{DocumentSchema, SchemaPathResolver};
pub use shape::Shape;
pub use source::{SourceFilter, SourceFilterResolver};
pub use validate::ExclusivityValidator;
