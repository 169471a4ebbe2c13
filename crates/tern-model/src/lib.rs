mod domain;
pub use domain::*;

pub mod filter;
pub use filter::{FilterError, FilterExpression, FilterOp, FilterTerm};
