//! Experiment file search filters
//!
//! Grammar (version 1), case-insensitive, `not` > `and` > `or`:
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := unary (["and"] unary)*
//! unary      := "not" unary | primary
//! primary    := "(" expr ")" | term
//! term       := word | quoted | ("name:" | "category:") (word | quoted)
//!             | op operand
//! op         := "<" | ">" | "=" | "<=" | ">="
//! operand    := digits [b|kb|mb|gb]
//!             | YYYY-MM[-DD[(_|T| )HH[:MM[:SS]]]]
//! ```
//!
//! A plain word matches when the file name or category label contains it.
//! Size operands use decimal units. Date operands compare the file's
//! modification time at the precision written, so `=2024-01` matches any
//! file modified in January 2024. Parentheses and `not` may nest at most
//! 256 deep.

mod lexer;
mod parser;

use crate::types::ExperimentFile;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use thiserror::Error;
use tracing::debug;

/// Filter compilation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("empty filter expression")]
    Empty,

    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("unbalanced parentheses")]
    UnbalancedParen,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("invalid comparison {0}")]
    InvalidComparison(String),

    #[error("expression nested too deeply")]
    TooDeep,
}

/// Fields a text term can look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    /// Name or category
    Any,
    Name,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Comparison {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            "=" => Some(Comparison::Eq),
            ">=" => Some(Comparison::Ge),
            ">" => Some(Comparison::Gt),
            _ => None,
        }
    }

    fn holds<T: Ord>(&self, lhs: T, rhs: T) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Gt => lhs > rhs,
        }
    }
}

/// Granularity of a date operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DatePrecision {
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePrecision {
    /// Start of the period containing `t`
    fn truncate(&self, t: NaiveDateTime) -> NaiveDateTime {
        let day = match self {
            DatePrecision::Month => t.date().with_day(1).unwrap_or(t.date()),
            _ => t.date(),
        };
        let (h, m, s) = match self {
            DatePrecision::Month | DatePrecision::Day => (0, 0, 0),
            DatePrecision::Hour => (t.hour(), 0, 0),
            DatePrecision::Minute => (t.hour(), t.minute(), 0),
            DatePrecision::Second => (t.hour(), t.minute(), t.second()),
        };
        day.and_hms_opt(h, m, s).unwrap_or(t)
    }
}

/// Leaf test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Case-insensitive substring match; `value` is lower-case
    Text { field: TextField, value: String },
    /// Size in bytes
    Size { op: Comparison, bytes: u64 },
    /// Modification time; `at` is the start of the period
    Date {
        op: Comparison,
        at: NaiveDateTime,
        precision: DatePrecision,
    },
}

impl Term {
    /// Build a size or date comparison from its written operand
    pub fn comparison(op: Comparison, operand: &str) -> Result<Self, FilterError> {
        let invalid = || FilterError::InvalidComparison(operand.to_string());

        if looks_like_date(operand) {
            let (at, precision) = parse_date(operand).ok_or_else(invalid)?;
            return Ok(Term::Date { op, at, precision });
        }

        let bytes = parse_size(operand).ok_or_else(invalid)?;
        Ok(Term::Size { op, bytes })
    }

    fn matches(&self, file: &ExperimentFile) -> bool {
        match self {
            Term::Text { field, value } => {
                let in_name = || file.name.to_lowercase().contains(value.as_str());
                let in_category = || file.category.label().to_lowercase().contains(value.as_str());
                match field {
                    TextField::Any => in_name() || in_category(),
                    TextField::Name => in_name(),
                    TextField::Category => in_category(),
                }
            }
            Term::Size { op, bytes } => op.holds(file.size, *bytes),
            Term::Date { op, at, precision } => file
                .date_time
                .is_some_and(|t| op.holds(precision.truncate(t), *at)),
        }
    }
}

/// Compiled boolean expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Term(Term),
}

impl FilterNode {
    /// Evaluate the expression against one file
    pub fn evaluate(&self, file: &ExperimentFile) -> bool {
        match self {
            FilterNode::And(children) => children.iter().all(|c| c.evaluate(file)),
            FilterNode::Or(children) => children.iter().any(|c| c.evaluate(file)),
            FilterNode::Not(child) => !child.evaluate(file),
            FilterNode::Term(term) => term.matches(file),
        }
    }
}

/// Parse an expression, reporting why it failed
pub fn parse(expression: &str) -> Result<FilterNode, FilterError> {
    let tokens = lexer::tokenize(expression)?;
    parser::Parser::new(tokens).parse()
}

/// Compile an expression; `None` for empty or invalid input.
///
/// A caller holding a non-empty expression that compiles to `None` must
/// treat it as matching nothing.
pub fn compile(expression: &str) -> Option<FilterNode> {
    match parse(expression) {
        Ok(node) => Some(node),
        Err(FilterError::Empty) => None,
        Err(e) => {
            debug!(expression, error = %e, "Filter expression rejected");
            None
        }
    }
}

fn looks_like_date(operand: &str) -> bool {
    let bytes = operand.as_bytes();
    bytes.len() >= 7 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-'
}

fn parse_date(operand: &str) -> Option<(NaiveDateTime, DatePrecision)> {
    let (date, time) = match operand.find(['_', 't', 'T', ' ']) {
        Some(idx) => (&operand[..idx], Some(&operand[idx + 1..])),
        None => (operand, None),
    };

    let parts: Vec<u32> = date
        .split('-')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;

    let (year, month, day, mut precision) = match parts.as_slice() {
        [y, m] => (*y, *m, 1, DatePrecision::Month),
        [y, m, d] => (*y, *m, *d, DatePrecision::Day),
        _ => return None,
    };
    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;

    let mut hms = [0u32; 3];
    if let Some(time) = time {
        if precision == DatePrecision::Month {
            return None;
        }
        let fields: Vec<u32> = time
            .split(':')
            .map(|p| p.parse().ok())
            .collect::<Option<_>>()?;
        precision = match fields.len() {
            1 => DatePrecision::Hour,
            2 => DatePrecision::Minute,
            3 => DatePrecision::Second,
            _ => return None,
        };
        hms[..fields.len()].copy_from_slice(&fields);
    }

    let at = date.and_hms_opt(hms[0], hms[1], hms[2])?;
    Some((at, precision))
}

fn parse_size(operand: &str) -> Option<u64> {
    let split = operand
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(operand.len());
    let (digits, unit) = operand.split_at(split);

    let value: u64 = digits.parse().ok()?;
    let scale = match unit {
        "" | "b" => 1,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        _ => return None,
    };
    value.checked_mul(scale)
}
