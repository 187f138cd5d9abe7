//! Completion criteria for achievements.
//!
//! Criteria are SQL-style boolean expressions over player fields, for example
//! `player.LastScore >= 15 AND NOT player.Username = 'guest'`. They are parsed
//! with `sqlparser` and only comparisons, `AND`, `OR`, `NOT`, parentheses,
//! literals and field paths are accepted.
//!
//! A leading `player` segment on a path is optional. Missing fields read as
//! `null`; ordering comparisons involving `null` are false.

use std::cmp::Ordering;

use dontdie_db::Record;
use serde_json::{Number, Value};
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value as SqlValue};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use thiserror::Error;

/// Longest criteria text accepted. Keeps the expression tree shallow.
pub const MAX_CRITERIA_LEN: usize = 1024;

/// Deepest nesting of parentheses and `NOT` accepted.
pub const MAX_CRITERIA_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CriteriaError {
    #[error("criteria too long ({0} bytes)")]
    TooLong(usize),

    #[error("invalid criteria: {0}")]
    Parse(#[from] ParserError),

    #[error("unexpected '{0}' after criteria")]
    TrailingInput(String),

    #[error("unsupported expression in criteria: {0}")]
    Unsupported(String),

    #[error("invalid number '{0}' in criteria")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Field(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Or(Box<Criteria>, Box<Criteria>),
    And(Box<Criteria>, Box<Criteria>),
    Not(Box<Criteria>),
    Compare(Operand, CompareOp, Operand),
    Truthy(Operand),
}

impl Criteria {
    pub fn parse(text: &str) -> Result<Self, CriteriaError> {
        if text.len() > MAX_CRITERIA_LEN {
            return Err(CriteriaError::TooLong(text.len()));
        }

        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .with_recursion_limit(MAX_CRITERIA_DEPTH)
            .try_with_sql(text)?;
        let expr = parser.parse_expr()?;

        let next = parser.next_token();
        if next.token != Token::EOF {
            return Err(CriteriaError::TrailingInput(next.token.to_string()));
        }

        Criteria::from_expr(expr)
    }

    fn from_expr(expr: Expr) -> Result<Self, CriteriaError> {
        match expr {
            Expr::Nested(inner) => Criteria::from_expr(*inner),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => Ok(Criteria::And(
                Box::new(Criteria::from_expr(*left)?),
                Box::new(Criteria::from_expr(*right)?),
            )),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => Ok(Criteria::Or(
                Box::new(Criteria::from_expr(*left)?),
                Box::new(Criteria::from_expr(*right)?),
            )),
            Expr::BinaryOp { left, op, right } => {
                let op = CompareOp::from_sql(&op)?;
                Ok(Criteria::Compare(Operand::from_expr(*left)?, op, Operand::from_expr(*right)?))
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(Criteria::Not(Box::new(Criteria::from_expr(*expr)?))),
            other => Ok(Criteria::Truthy(Operand::from_expr(other)?)),
        }
    }

    /// Evaluate against a player's fields.
    pub fn evaluate(&self, fields: &Record) -> bool {
        match self {
            Criteria::Or(a, b) => a.evaluate(fields) || b.evaluate(fields),
            Criteria::And(a, b) => a.evaluate(fields) && b.evaluate(fields),
            Criteria::Not(inner) => !inner.evaluate(fields),
            Criteria::Compare(lhs, op, rhs) => compare(&lhs.resolve(fields), *op, &rhs.resolve(fields)),
            Criteria::Truthy(operand) => truthy(&operand.resolve(fields)),
        }
    }
}

impl CompareOp {
    fn from_sql(op: &BinaryOperator) -> Result<Self, CriteriaError> {
        match op {
            BinaryOperator::Eq => Ok(CompareOp::Eq),
            BinaryOperator::NotEq => Ok(CompareOp::Ne),
            BinaryOperator::Lt => Ok(CompareOp::Lt),
            BinaryOperator::LtEq => Ok(CompareOp::Le),
            BinaryOperator::Gt => Ok(CompareOp::Gt),
            BinaryOperator::GtEq => Ok(CompareOp::Ge),
            other => Err(CriteriaError::Unsupported(other.to_string())),
        }
    }
}

impl Operand {
    fn from_expr(expr: Expr) -> Result<Self, CriteriaError> {
        match expr {
            Expr::Nested(inner) => Operand::from_expr(*inner),
            Expr::Identifier(ident) => Ok(Operand::Field(vec![ident.value])),
            Expr::CompoundIdentifier(idents) => Ok(Operand::Field(
                idents.into_iter().map(|ident| ident.value).collect(),
            )),
            Expr::Value(value) => literal(value.value, false).map(Operand::Literal),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match *expr {
                Expr::Value(value) => literal(value.value, true).map(Operand::Literal),
                other => Err(CriteriaError::Unsupported(format!("-{other}"))),
            },
            other => Err(CriteriaError::Unsupported(other.to_string())),
        }
    }

    fn resolve(&self, fields: &Record) -> Value {
        match self {
            Operand::Literal(value) => value.clone(),
            Operand::Field(path) => {
                let mut segments = path.iter().map(String::as_str).peekable();
                if path.len() > 1 && segments.peek() == Some(&"player") {
                    segments.next();
                }

                let Some(first) = segments.next() else {
                    return Value::Null;
                };
                let mut current = match fields.get(first) {
                    Some(value) => value,
                    None => return Value::Null,
                };
                for segment in segments {
                    current = match current.get(segment) {
                        Some(value) => value,
                        None => return Value::Null,
                    };
                }
                current.clone()
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => as_number(lhs)?.partial_cmp(&as_number(rhs)?),
    }
}

fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq => equal(lhs, rhs),
        CompareOp::Ne => !equal(lhs, rhs),
        CompareOp::Lt => ordering(lhs, rhs) == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering(lhs, rhs), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering(lhs, rhs) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering(lhs, rhs), Some(Ordering::Greater | Ordering::Equal)),
    }
}

fn equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(lhs), as_number(rhs)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => lhs == rhs,
    }
}

fn literal(value: SqlValue, negative: bool) -> Result<Value, CriteriaError> {
    match value {
        SqlValue::Number(digits, _) => {
            let text = if negative { format!("-{digits}") } else { digits };
            serde_json::from_str::<Number>(&text)
                .map(Value::Number)
                .map_err(|_| CriteriaError::InvalidNumber(text))
        }
        other if negative => Err(CriteriaError::Unsupported(format!("-{other}"))),
        SqlValue::SingleQuotedString(s) => Ok(Value::String(s)),
        SqlValue::Boolean(b) => Ok(Value::Bool(b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(CriteriaError::Unsupported(other.to_string())),
    }
}
