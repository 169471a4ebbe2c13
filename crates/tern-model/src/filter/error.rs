use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("missing operator")]
    MissingOp,
    #[error("missing field in {0:?}")]
    MissingField(String),
    #[error("invalid phase: {0}")]
    InvalidPhase(String),
}
