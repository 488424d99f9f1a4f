//! Restricted filter expressions for retention actions.
//!
//! User-supplied filters are parsed with sqlparser and converted into
//! [`FilterExpr`], a closed subset of SQL scalar expressions: column
//! references, literals, comparisons, null checks, boolean combinators and a
//! short allow-list of scalar functions. Anything outside the subset is rejected
//! at parse time, so a filter that validates can be rendered back into SQL
//! and embedded in generated statements without further checks.

use std::fmt;

use sqlparser::ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::error::{Result, SqlError};
use crate::ident::check_field;

/// Scalar functions permitted inside filter expressions.
pub const ALLOWED_FUNCTIONS: &[&str] = &["lower", "upper", "length"];

/// A validated filter expression over a single collection's fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Column(String),
    Literal(Literal),
    Comparison {
        op: CompareOp,
        left: Box<FilterExpr>,
        right: Box<FilterExpr>,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    IsNull { expr: Box<FilterExpr>, negated: bool },
    Function { name: String, args: Vec<FilterExpr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Numeric literal, kept verbatim as written.
    Number(String),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Parse and validate a filter expression.
///
/// The whole input must be a single expression; trailing tokens (for example
/// a second statement after a semicolon) are a syntax error.
pub fn parse_filter(text: &str) -> Result<FilterExpr> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SqlError::ExpressionSyntax("filter is empty".to_string()));
    }

    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(trimmed)
        .map_err(|e| SqlError::ExpressionSyntax(e.to_string()))?;
    let expr = parser
        .parse_expr()
        .map_err(|e| SqlError::ExpressionSyntax(e.to_string()))?;
    if parser.peek_token().token != Token::EOF {
        return Err(SqlError::ExpressionSyntax(format!(
            "unexpected trailing input after expression: {}",
            parser.peek_token()
        )));
    }
    convert(&expr)
}

fn convert(expr: &ast::Expr) -> Result<FilterExpr> {
    match expr {
        ast::Expr::Identifier(ident) => {
            check_field(&ident.value)?;
            Ok(FilterExpr::Column(ident.value.clone()))
        }
        ast::Expr::CompoundIdentifier(_) => Err(SqlError::DisallowedConstruct(
            "qualified column references".to_string(),
        )),
        ast::Expr::Value(value) => convert_literal(value),
        ast::Expr::Nested(inner) => convert(inner),
        ast::Expr::UnaryOp {
            op: ast::UnaryOperator::Not,
            expr,
        } => Ok(FilterExpr::Not(Box::new(convert(expr)?))),
        ast::Expr::IsNull(inner) => Ok(FilterExpr::IsNull {
            expr: Box::new(convert(inner)?),
            negated: false,
        }),
        ast::Expr::IsNotNull(inner) => Ok(FilterExpr::IsNull {
            expr: Box::new(convert(inner)?),
            negated: true,
        }),
        ast::Expr::BinaryOp { left, op, right } => {
            let compare = |op| {
                Ok(FilterExpr::Comparison {
                    op,
                    left: Box::new(convert(left)?),
                    right: Box::new(convert(right)?),
                })
            };
            match op {
                ast::BinaryOperator::And => Ok(FilterExpr::And(
                    Box::new(convert(left)?),
                    Box::new(convert(right)?),
                )),
                ast::BinaryOperator::Or => Ok(FilterExpr::Or(
                    Box::new(convert(left)?),
                    Box::new(convert(right)?),
                )),
                ast::BinaryOperator::Eq => compare(CompareOp::Eq),
                ast::BinaryOperator::NotEq => compare(CompareOp::NotEq),
                ast::BinaryOperator::Lt => compare(CompareOp::Lt),
                ast::BinaryOperator::LtEq => compare(CompareOp::LtEq),
                ast::BinaryOperator::Gt => compare(CompareOp::Gt),
                ast::BinaryOperator::GtEq => compare(CompareOp::GtEq),
                other => Err(SqlError::DisallowedConstruct(format!(
                    "operator {other}"
                ))),
            }
        }
        ast::Expr::Function(func) => convert_function(func),
        ast::Expr::Subquery(_) | ast::Expr::InSubquery { .. } | ast::Expr::Exists { .. } => Err(
            SqlError::DisallowedConstruct("subqueries in filter expressions".to_string()),
        ),
        other => Err(SqlError::DisallowedConstruct(format!("{other}"))),
    }
}

fn convert_function(func: &ast::Function) -> Result<FilterExpr> {
    let name = func.name.to_string().to_ascii_lowercase();
    if !ALLOWED_FUNCTIONS.contains(&name.as_str()) {
        return Err(SqlError::DisallowedConstruct(format!("function {name}")));
    }
    if func.over.is_some() || func.distinct {
        return Err(SqlError::DisallowedConstruct(format!(
            "window or aggregate form of function {name}"
        )));
    }
    let mut args = Vec::with_capacity(func.args.len());
    for arg in &func.args {
        match arg {
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(expr)) => {
                args.push(convert(expr)?);
            }
            _ => {
                return Err(SqlError::DisallowedConstruct(format!(
                    "argument form in function {name}"
                )))
            }
        }
    }
    Ok(FilterExpr::Function { name, args })
}

fn convert_literal(value: &ast::Value) -> Result<FilterExpr> {
    let literal = match value {
        ast::Value::Number(n, _) => Literal::Number(n.clone()),
        ast::Value::SingleQuotedString(s) => Literal::String(s.clone()),
        ast::Value::Boolean(b) => Literal::Boolean(*b),
        ast::Value::Null => Literal::Null,
        other => {
            return Err(SqlError::DisallowedConstruct(format!(
                "literal form {other}"
            )))
        }
    };
    Ok(FilterExpr::Literal(literal))
}

impl fmt::Display for FilterExpr {
    /// Renders the expression back into SQL. Columns are double-quoted and
    /// string literals single-quote escaped, so the output is safe to embed
    /// in generated statements.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Column(name) => write!(f, "\"{name}\""),
            FilterExpr::Literal(literal) => write!(f, "{literal}"),
            FilterExpr::Comparison { op, left, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
            FilterExpr::And(left, right) => write!(f, "({left} AND {right})"),
            FilterExpr::Or(left, right) => write!(f, "({left} OR {right})"),
            FilterExpr::Not(inner) => write!(f, "(NOT {inner})"),
            FilterExpr::IsNull { expr, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                write!(f, "({expr} {keyword})")
            }
            FilterExpr::Function { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{n}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Null => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_comparison() {
        let expr = parse_filter("source = 'google'").unwrap();
        assert_eq!(
            expr,
            FilterExpr::Comparison {
                op: CompareOp::Eq,
                left: Box::new(FilterExpr::Column("source".to_string())),
                right: Box::new(FilterExpr::Literal(Literal::String("google".to_string()))),
            }
        );
        assert_eq!(expr.to_string(), "(\"source\" = 'google')");
    }

    #[test]
    fn test_parses_boolean_combinators() {
        let expr = parse_filter("a > 1 AND (b = TRUE OR NOT c)").unwrap();
        assert_eq!(
            expr.to_string(),
            "((\"a\" > 1) AND ((\"b\" = TRUE) OR (NOT \"c\")))"
        );
    }

    #[test]
    fn test_parses_allowed_function() {
        let expr = parse_filter("lower(country) = 'us'").unwrap();
        assert_eq!(expr.to_string(), "(lower(\"country\") = 'us')");
    }

    #[test]
    fn test_escapes_string_literals() {
        let expr = parse_filter("name = 'o''brien'").unwrap();
        assert_eq!(expr.to_string(), "(\"name\" = 'o''brien')");
    }

    #[test]
    fn test_null_checks_render_as_is_null() {
        let expr = parse_filter("referrer IS NULL").unwrap();
        assert_eq!(
            expr,
            FilterExpr::IsNull {
                expr: Box::new(FilterExpr::Column("referrer".to_string())),
                negated: false,
            }
        );
        assert_eq!(expr.to_string(), "(\"referrer\" IS NULL)");

        let expr = parse_filter("referrer IS NOT NULL").unwrap();
        assert_eq!(expr.to_string(), "(\"referrer\" IS NOT NULL)");
    }

    #[test]
    fn test_rejects_trailing_tokens() {
        let err = parse_filter("a = 1; DROP TABLE events").unwrap_err();
        assert!(matches!(err, SqlError::ExpressionSyntax(_)), "{err}");
    }

    #[test]
    fn test_rejects_subquery() {
        let err = parse_filter("a IN (SELECT b FROM t)").unwrap_err();
        assert!(matches!(err, SqlError::DisallowedConstruct(_)), "{err}");
    }

    #[test]
    fn test_rejects_unknown_function() {
        let err = parse_filter("sleep(10) = 0").unwrap_err();
        assert!(matches!(err, SqlError::DisallowedConstruct(_)), "{err}");
    }

    #[test]
    fn test_rejects_qualified_column() {
        let err = parse_filter("t.a = 1").unwrap_err();
        assert!(matches!(err, SqlError::DisallowedConstruct(_)), "{err}");
    }

    #[test]
    fn test_rejects_invalid_column_name() {
        let err = parse_filter("\"bad name\" = 1").unwrap_err();
        assert!(matches!(err, SqlError::InvalidIdentifier(_)), "{err}");
    }

    #[test]
    fn test_rejects_empty_filter() {
        assert!(matches!(
            parse_filter("   "),
            Err(SqlError::ExpressionSyntax(_))
        ));
    }

    #[test]
    fn test_rejects_arithmetic() {
        let err = parse_filter("a + 1 = 2").unwrap_err();
        assert!(matches!(err, SqlError::DisallowedConstruct(_)), "{err}");
    }
}
