pub mod loader;
pub mod path;
pub mod types;

pub use loader::SchemaLoader;
pub use path::{FieldPath, Resolved, SchemaPathResolver, TypeFilter};
pub use types::{DocumentSchema, FieldDef, FieldType, LeafType, ObjectNode, SchemaNode};
