//! Validation and planning error types.

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SqlError>;

/// Errors raised while validating identifiers, filter expressions, analytic
/// statements, or retention requests. All of these are caller errors and are
/// raised before anything reaches the execution engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlError {
    #[error("Expression syntax error: {0}")]
    ExpressionSyntax(String),

    #[error("Disallowed construct in filter expression: {0}")]
    DisallowedConstruct(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unknown field {field} in collection {collection}")]
    UnknownField { collection: String, field: String },

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid retention request: {0}")]
    InvalidRequest(String),

    #[error("Statement syntax error: {0}")]
    StatementSyntax(String),

    #[error("Unsupported statement: {0}")]
    UnsupportedStatement(String),
}
