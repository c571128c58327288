pub mod backend;
pub mod cache;
pub mod ingest;
pub mod queries;
pub mod retention;
pub mod rollup;
pub mod schema;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `linkpulse_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
