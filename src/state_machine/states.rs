use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a retrying upload unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Built and queued, no attempt started yet
    #[default]
    Ready,
    /// Holding a worker slot; an attempt is in flight or about to be retried
    Executing,
    /// Reached a natural end: success or retries exhausted
    Finished,
    /// Stopped before reaching a natural end
    Cancelled,
}

impl UnitState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// A retry is not a transition: the unit stays `Executing` across
    /// attempts.
    pub fn can_transition_to(&self, next: UnitState) -> bool {
        matches!(
            (self, next),
            (Self::Ready, Self::Executing)
                | (Self::Ready, Self::Cancelled)
                | (Self::Executing, Self::Finished)
                | (Self::Executing, Self::Cancelled)
        )
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Executing => write!(f, "executing"),
            Self::Finished => write!(f, "finished"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for UnitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Self::Ready),
            "executing" => Ok(Self::Executing),
            "finished" => Ok(Self::Finished),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid unit state: {s}")),
        }
    }
}

/// How a unit ended.
///
/// `RetriesExhausted` and `Cancelled` stay distinct for reporting but both
/// count as failure in the batch aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Succeeded,
    RetriesExhausted,
    Cancelled,
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Lifecycle state a unit with this outcome ends in
    pub fn terminal_state(&self) -> UnitState {
        match self {
            Self::Succeeded | Self::RetriesExhausted => UnitState::Finished,
            Self::Cancelled => UnitState::Cancelled,
        }
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::RetriesExhausted => write!(f, "retries_exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a single attempt produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResponse {
    /// The transport reported success
    Succeeded,
    /// The transport reported failure
    Failed,
    /// The transport dropped its completion handle without answering
    Abandoned,
    /// No answer arrived within the configured attempt timeout
    TimedOut,
    /// The upload function panicked while starting the attempt
    Panicked,
}

impl AttemptResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for AttemptResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}
