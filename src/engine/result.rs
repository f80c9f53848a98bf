// ABOUTME: Lifecycle of a single isolated invocation
// ABOUTME: Tracks the invocation state machine and reports each transition through tracing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InvocationState {
    Defined,
    ArgsMarshalled,
    ScriptGenerated,
    EnvProvisioned,
    SubprocessRunning,
    Success,
    ProvisioningFailed,
    SubprocessFailed,
    DecodeFailed,
}

impl InvocationState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            InvocationState::Success
                | InvocationState::ProvisioningFailed
                | InvocationState::SubprocessFailed
                | InvocationState::DecodeFailed
        )
    }

    /// States reachable in one step from `self`.
    fn can_advance_to(&self, next: InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Defined, ArgsMarshalled)
                | (ArgsMarshalled, ScriptGenerated)
                | (ScriptGenerated, EnvProvisioned)
                | (ScriptGenerated, ProvisioningFailed)
                | (EnvProvisioned, SubprocessRunning)
                | (SubprocessRunning, Success)
                | (SubprocessRunning, SubprocessFailed)
                | (SubprocessRunning, DecodeFailed)
        )
    }
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationState::Defined => write!(f, "defined"),
            InvocationState::ArgsMarshalled => write!(f, "args_marshalled"),
            InvocationState::ScriptGenerated => write!(f, "script_generated"),
            InvocationState::EnvProvisioned => write!(f, "env_provisioned"),
            InvocationState::SubprocessRunning => write!(f, "subprocess_running"),
            InvocationState::Success => write!(f, "success"),
            InvocationState::ProvisioningFailed => write!(f, "provisioning_failed"),
            InvocationState::SubprocessFailed => write!(f, "subprocess_failed"),
            InvocationState::DecodeFailed => write!(f, "decode_failed"),
        }
    }
}

/// State of one isolated invocation. Only observable through logs.
#[derive(Debug, Clone)]
pub struct InvocationTracker {
    pub task_id: String,
    pub state: InvocationState,
    pub start_time: DateTime<Utc>,
    pub history: Vec<InvocationState>,
}

impl InvocationTracker {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: InvocationState::Defined,
            start_time: Utc::now(),
            history: vec![InvocationState::Defined],
        }
    }

    pub fn advance(&mut self, next: InvocationState) {
        if !self.state.can_advance_to(next) {
            error!(
                "Task {}: unexpected invocation transition {} -> {}",
                self.task_id, self.state, next
            );
        }
        debug!("Task {}: {} -> {}", self.task_id, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
