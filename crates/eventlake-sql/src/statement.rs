//! Analytic statement validation.

use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{Result, SqlError};

/// Validate the body of a continuous query.
///
/// The body must be exactly one `SELECT` query. DDL, DML and set operations
/// are rejected here so the materialization step only ever wraps a plain
/// query in `CREATE TABLE .. AS`.
pub fn validate_statement(sql: &str) -> Result<()> {
    let dialect = GenericDialect {};
    let statements =
        Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::StatementSyntax(e.to_string()))?;

    let statement = match statements.as_slice() {
        [one] => one,
        [] => return Err(SqlError::StatementSyntax("statement is empty".to_string())),
        many => {
            return Err(SqlError::UnsupportedStatement(format!(
                "expected a single statement, got {}",
                many.len()
            )))
        }
    };

    match statement {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(_) => Ok(()),
            other => Err(SqlError::UnsupportedStatement(format!(
                "query body must be a SELECT, got {other}"
            ))),
        },
        other => Err(SqlError::UnsupportedStatement(format!(
            "only SELECT queries are allowed, got {other}"
        ))),
    }
}
