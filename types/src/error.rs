//! Validation errors for the shared data model.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid quantity {0:?}: expected 0x-prefixed hex")]
    InvalidQuantity(String),

    #[error("invalid ballot: {0}")]
    InvalidBallot(String),

    #[error("inconsistent election state: {0}")]
    InconsistentElectionState(String),

    #[error("unknown provenance tag: {0}")]
    UnknownProvenance(String),
}
