//! Per-device task record for one job execution.

use std::fmt;

use log::{debug, warn};

use crate::error::ErrorKind;

/// Lifecycle of a device task within one execution.
///
/// `Pending -> Connecting -> Running -> Succeeded | Failed`, with `Retrying`
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Connecting,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Connecting => "CONNECTING",
            TaskState::Running => "RUNNING",
            TaskState::Retrying => "RETRYING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
        }
    }

    fn can_become(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Connecting | Failed)
                | (Connecting, Running | Retrying | Failed)
                | (Running, Succeeded | Retrying | Failed)
                | (Retrying, Connecting | Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device's progress through a job execution.
///
/// Created when the device is submitted and discarded once its terminal state
/// has been folded into the job's [`Tally`](super::Tally).
#[derive(Debug, Clone)]
pub struct DeviceTask {
    device_id: String,
    state: TaskState,
    attempts: u32,
    last_error: Option<ErrorKind>,
    output: Option<String>,
    version_id: Option<String>,
}

impl DeviceTask {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            output: None,
            version_id: None,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// Redacted output of the successful attempt.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    /// Move to `next`. Staying in the current state is a no-op; a transition
    /// the lifecycle does not allow leaves the task unchanged and returns false.
    pub fn advance(&mut self, next: TaskState) -> bool {
        if next == self.state {
            return true;
        }
        if !self.state.can_become(next) {
            warn!(
                "device {}: ignoring transition {} -> {}",
                self.device_id, self.state, next
            );
            return false;
        }
        debug!("device {}: {} -> {}", self.device_id, self.state, next);
        self.state = next;
        true
    }

    /// Begin a new attempt.
    pub fn start_attempt(&mut self) -> bool {
        let started = self.advance(TaskState::Connecting);
        if started {
            self.attempts += 1;
        }
        started
    }

    pub fn succeed(&mut self, output: String, version_id: Option<String>) -> bool {
        let done = self.advance(TaskState::Succeeded);
        if done {
            self.output = Some(output);
            self.version_id = version_id;
        }
        done
    }

    /// Record a failed attempt and either wait for a retry or give up.
    pub fn fail(&mut self, kind: ErrorKind, retry: bool) -> bool {
        self.last_error = Some(kind);
        self.advance(if retry {
            TaskState::Retrying
        } else {
            TaskState::Failed
        })
    }
}
