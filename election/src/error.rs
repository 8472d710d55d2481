use ballotguard_types::{ElectionStatus, TypesError};
use thiserror::Error;

use crate::ElectionAction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElectionError {
    #[error("cannot {action} an election that is {from}")]
    InvalidTransition {
        from: ElectionStatus,
        action: ElectionAction,
    },

    #[error("unknown election action {0:?}")]
    UnknownAction(String),

    #[error("persisted election state rejected: {0}")]
    InvalidSnapshot(#[from] TypesError),
}
