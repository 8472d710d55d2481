//! Election lifecycle status and its timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Timestamp, TypesError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    #[default]
    NotStarted,
    Voting,
    Paused,
    Finished,
}

impl ElectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Voting => "voting",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status plus the timestamps of the transitions that led to it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionState {
    pub status: ElectionStatus,
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    #[serde(default)]
    pub pause_time: Option<Timestamp>,
    #[serde(default)]
    pub finish_time: Option<Timestamp>,
}

impl ElectionState {
    /// Reconciliation may only run while ballots can still arrive.
    pub fn sync_allowed(&self) -> bool {
        matches!(self.status, ElectionStatus::Voting | ElectionStatus::Paused)
    }

    /// Check that the timestamps agree with the status.
    pub fn validate(&self) -> Result<(), TypesError> {
        let fail = |msg: &str| Err(TypesError::InconsistentElectionState(format!("{}: {msg}", self.status)));
        match self.status {
            ElectionStatus::NotStarted => {
                if self.start_time.is_some() || self.pause_time.is_some() || self.finish_time.is_some() {
                    return fail("no timestamps may be set");
                }
            }
            ElectionStatus::Voting => {
                if self.start_time.is_none() {
                    return fail("start time missing");
                }
                if self.pause_time.is_some() || self.finish_time.is_some() {
                    return fail("pause/finish time set while voting");
                }
            }
            ElectionStatus::Paused => {
                if self.start_time.is_none() || self.pause_time.is_none() {
                    return fail("start and pause time required");
                }
                if self.finish_time.is_some() {
                    return fail("finish time set while paused");
                }
            }
            ElectionStatus::Finished => {
                if self.start_time.is_none() || self.finish_time.is_none() {
                    return fail("start and finish time required");
                }
            }
        }
        Ok(())
    }
}
