use std::fmt;
use std::str::FromStr;

use ballotguard_types::{ElectionState, ElectionStatus, Timestamp};
use tokio::sync::watch;

use crate::ElectionError;

/// An administrative lifecycle command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElectionAction {
    Start,
    Pause,
    Finish,
    Reset,
}

impl ElectionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Finish => "finish",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for ElectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElectionAction {
    type Err = ElectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "finish" => Ok(Self::Finish),
            "reset" => Ok(Self::Reset),
            other => Err(ElectionError::UnknownAction(other.to_string())),
        }
    }
}

/// Compute the state `action` leads to from `current`, or refuse.
fn next_state(
    current: &ElectionState,
    action: ElectionAction,
    now: Timestamp,
) -> Result<ElectionState, ElectionError> {
    use ElectionAction::*;
    use ElectionStatus::*;

    let next = match (current.status, action) {
        (NotStarted, Start) => ElectionState {
            status: Voting,
            start_time: Some(now),
            pause_time: None,
            finish_time: None,
        },
        (Paused, Start) => ElectionState {
            status: Voting,
            pause_time: None,
            ..current.clone()
        },
        (Voting, Pause) => ElectionState {
            status: Paused,
            pause_time: Some(now),
            ..current.clone()
        },
        (Voting | Paused, Finish) => ElectionState {
            status: Finished,
            pause_time: None,
            finish_time: Some(now),
            ..current.clone()
        },
        (_, Reset) => ElectionState::default(),
        (from, action) => return Err(ElectionError::InvalidTransition { from, action }),
    };
    Ok(next)
}

/// Owns the process-wide [`ElectionState`] and publishes every change.
///
/// Transitions are atomic: status and timestamps change together under the
/// channel's lock, and an invalid transition leaves the state untouched.
#[derive(Debug)]
pub struct ElectionStateMachine {
    state: watch::Sender<ElectionState>,
}

impl ElectionStateMachine {
    pub fn new() -> Self {
        Self::with_state(ElectionState::default())
    }

    fn with_state(state: ElectionState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { state: tx }
    }

    /// Seed from a persisted snapshot. Inconsistent snapshots are rejected.
    pub fn restored(snapshot: ElectionState) -> Result<Self, ElectionError> {
        snapshot.validate()?;
        Ok(Self::with_state(snapshot))
    }

    /// Replace the current state with a persisted snapshot.
    pub fn restore(&self, snapshot: ElectionState) -> Result<(), ElectionError> {
        snapshot.validate()?;
        tracing::info!(status = %snapshot.status, "election state restored");
        self.state.send_replace(snapshot);
        Ok(())
    }

    pub fn state(&self) -> ElectionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ElectionStatus {
        self.state.borrow().status
    }

    pub fn sync_allowed(&self) -> bool {
        self.state.borrow().sync_allowed()
    }

    /// A change feed starting at the current state.
    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state.subscribe()
    }

    pub fn start(&self) -> Result<ElectionState, ElectionError> {
        self.apply(ElectionAction::Start, Timestamp::now())
    }

    pub fn pause(&self) -> Result<ElectionState, ElectionError> {
        self.apply(ElectionAction::Pause, Timestamp::now())
    }

    pub fn finish(&self) -> Result<ElectionState, ElectionError> {
        self.apply(ElectionAction::Finish, Timestamp::now())
    }

    pub fn reset(&self) -> Result<ElectionState, ElectionError> {
        self.apply(ElectionAction::Reset, Timestamp::now())
    }

    pub fn apply(
        &self,
        action: ElectionAction,
        now: Timestamp,
    ) -> Result<ElectionState, ElectionError> {
        let mut outcome = None;
        self.state.send_if_modified(|state| match next_state(state, action, now) {
            Ok(next) => {
                let changed = *state != next;
                *state = next.clone();
                outcome = Some(Ok(next));
                changed
            }
            Err(e) => {
                outcome = Some(Err(e));
                false
            }
        });

        // send_if_modified always runs the closure
        let outcome = outcome.unwrap_or_else(|| Ok(self.state()));
        match &outcome {
            Ok(state) => tracing::info!(%action, status = %state.status, "election transition"),
            Err(e) => tracing::warn!(%action, "election transition refused: {e}"),
        }
        outcome
    }
}

impl Default for ElectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
