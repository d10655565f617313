//! Run lifecycle state machine

use serde::{Deserialize, Serialize};

/// State of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Run created, plan compiled, nothing dispatched yet
    Pending,

    /// The run-owner worker is walking the plan's groups
    Running,

    /// Every step and quality check finalized without errors
    Succeeded,

    /// A step failed, or the run was externally marked failed
    Failed,

    /// The worker died mid-run; successful step logs survive and the run
    /// can be resumed
    Crashed,
}

impl RunState {
    /// The wire/database string for this state
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Crashed => "crashed",
        }
    }

    /// Terminal states never transition except back into Running on resume
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed | RunState::Crashed)
    }

    /// States a run can be resumed from, skipping already-successful steps
    pub fn resumable(&self) -> bool {
        matches!(self, RunState::Failed | RunState::Crashed)
    }

    /// Validate if a state transition is legal.
    ///
    /// # Allowed Transitions
    ///
    /// - Pending → Running
    /// - Running → Succeeded, Failed, Crashed
    /// - Failed → Running (resume)
    /// - Crashed → Running (resume)
    pub fn is_valid_transition(from: RunState, to: RunState) -> bool {
        use RunState::*;

        matches!(
            (from, to),
            (Pending, Running) | (Running, Succeeded | Failed | Crashed) | (Failed | Crashed, Running)
        )
    }
}

impl From<RunState> for String {
    fn from(state: RunState) -> Self {
        state.as_str().to_string()
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::convert::TryFrom<&str> for RunState {
    type Error = crate::Error;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "pending" => Ok(RunState::Pending),
            "running" => Ok(RunState::Running),
            "succeeded" => Ok(RunState::Succeeded),
            "failed" => Ok(RunState::Failed),
            "crashed" => Ok(RunState::Crashed),
            _ => Err(crate::Error::InvalidState(format!(
                "Unknown run state: {s}"
            ))),
        }
    }
}
