//! Eventlake SQL
//!
//! Validation and planning front end for the query core: identifier rules,
//! the restricted filter-expression subset, analytic statement validation,
//! and the retention cohort planner. Everything here is pure computation;
//! execution lives in the query crate.

pub mod error;
pub mod expression;
pub mod ident;
pub mod retention;
pub mod statement;

pub use error::{Result, SqlError};
pub use expression::{parse_filter, CompareOp, FilterExpr, Literal, ALLOWED_FUNCTIONS};
pub use ident::{check_collection, check_field, MAX_IDENTIFIER_LENGTH};
pub use retention::{
    bucket_domain, plan, DateUnit, RetentionAction, RetentionPlan, RetentionRequest, ACTOR_FIELD,
    TIME_FIELD,
};
pub use statement::validate_statement;
