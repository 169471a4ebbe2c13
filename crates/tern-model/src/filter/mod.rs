//! Filter predicates over job status.
//!
//! A filter is a list of expressions. A status matches when it satisfies
//! every expression; an expression is satisfied when any of its terms is.

mod error;
pub use error::FilterError;

mod matcher;
pub use matcher::matches;

mod parse;
pub use parse::{parse, parse_expression};

use serde::{Deserialize, Serialize};

/// Comparison applied between a status field and the term value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

impl FilterOp {
    /// Operator token as written in a filter term.
    pub fn token(&self) -> &'static str {
        match self {
            FilterOp::Equals => "==",
            FilterOp::Contains => "~=",
            FilterOp::StartsWith => "|=",
            FilterOp::EndsWith => "=|",
        }
    }

    fn apply(&self, field: &str, value: &str) -> bool {
        match self {
            FilterOp::Equals => field == value,
            FilterOp::Contains => field.contains(value),
            FilterOp::StartsWith => field.starts_with(value),
            FilterOp::EndsWith => field.ends_with(value),
        }
    }
}

/// `<field><op><value>`, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTerm {
    pub field: String,
    pub value: String,
    pub op: FilterOp,
    #[serde(default)]
    pub negate: bool,
}

impl FilterTerm {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            op,
            negate: false,
        }
    }

    /// The same term with its negation flipped.
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

/// Alternatives: satisfied when any term matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterExpression {
    pub terms: Vec<FilterTerm>,
}

impl FilterExpression {
    pub fn new(terms: Vec<FilterTerm>) -> Self {
        Self { terms }
    }

    pub fn single(term: FilterTerm) -> Self {
        Self { terms: vec![term] }
    }
}
