//! Eventlake Query
//!
//! The query core: continuous query lifecycle management and retention
//! cohort analysis on top of a pluggable execution engine.
//!
//! ## Architecture
//!
//! ```text
//! ContinuousQueryService ----\
//!                             +--> QueryExecutor (engine seam)
//! RetentionQueryService  ----/
//!         |                          |
//!   eventlake-sql              QueryExecution / ExecutionContext
//!   (validation, planning)     (oneshot result + watch cancellation)
//! ```
//!
//! Both services share the capability traits from `eventlake-metadata` for
//! schemas and durable query definitions, and the validation/planning layer
//! from `eventlake-sql`. Nothing in this crate parses or plans SQL itself;
//! it orchestrates.

pub mod continuous;
pub mod error;
pub mod executor;
pub mod registry;
pub mod retention;

pub use continuous::{ContinuousQueryService, CreateHandle, QueryServiceConfig};
pub use error::{QueryError, Result};
pub use executor::{
    CancelHandle, ExecutionContext, ExecutionError, QueryExecution, QueryExecutor, QueryResult,
};
pub use registry::ContinuousQueryRegistry;
pub use retention::{RetentionExecution, RetentionQueryService};
