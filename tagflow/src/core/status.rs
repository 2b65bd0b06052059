//! Stage outcome status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage's unit of execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage reached its terminal count.
    Completed,
    /// The stage hit a fatal fault.
    Failed,
    /// The stage stopped because a sibling faulted.
    Cancelled,
    /// The stage's task panicked.
    Panicked,
}

impl StageStatus {
    /// Returns the process-style exit code for this status.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Failed | Self::Cancelled => 1,
            Self::Panicked => 101,
        }
    }

    /// Returns true if the stage reached its terminal state.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}
