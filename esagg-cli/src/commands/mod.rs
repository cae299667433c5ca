pub mod kinds;
pub mod request;
pub mod schema;

pub use kinds::run_kinds;
pub use request::{run_infer, run_validate};
pub use schema::{load_schema, run_paths, run_project};
