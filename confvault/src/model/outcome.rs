//! Per-device and per-job outcomes.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::TaskState;
use crate::error::DeviceError;

/// Aggregate status of one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobOutcome {
    Success,
    PartialFailure,
    Failure,
    NoDevices,
}

impl JobOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Success => "SUCCESS",
            JobOutcome::PartialFailure => "PARTIAL_FAILURE",
            JobOutcome::Failure => "FAILURE",
            JobOutcome::NoDevices => "NO_DEVICES",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one executor attempt against one device.
#[derive(Debug, Clone)]
pub enum DeviceOutcome {
    Succeeded {
        /// Redacted command output.
        output: String,
        /// Snapshot version, when the output was committed.
        version_id: Option<String>,
    },
    Failed(DeviceError),
}

impl DeviceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeviceOutcome::Succeeded { .. })
    }

    pub fn error(&self) -> Option<&DeviceError> {
        match self {
            DeviceOutcome::Failed(err) => Some(err),
            DeviceOutcome::Succeeded { .. } => None,
        }
    }
}

/// Counters folded from terminal task states.
///
/// Folding is commutative, so the resulting outcome does not depend on the
/// order in which tasks finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    /// Devices rejected by validation; never counted as attempted.
    pub skipped: usize,
}

impl Tally {
    /// Fold one task's final state. A task that never reached a terminal
    /// state did not succeed and counts as failed.
    pub fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Succeeded => self.succeeded += 1,
            TaskState::Failed
            | TaskState::Pending
            | TaskState::Connecting
            | TaskState::Running
            | TaskState::Retrying => self.failed += 1,
        }
    }

    pub fn submitted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Percentage of submitted devices that succeeded.
    pub fn success_rate(&self) -> f64 {
        match self.submitted() {
            0 => 0.0,
            n => self.succeeded as f64 * 100.0 / n as f64,
        }
    }

    pub fn outcome(&self) -> JobOutcome {
        match (self.succeeded, self.failed) {
            (0, 0) => JobOutcome::NoDevices,
            (_, 0) => JobOutcome::Success,
            (0, _) => JobOutcome::Failure,
            _ => JobOutcome::PartialFailure,
        }
    }
}

/// What survives a job execution besides its logs.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub outcome: JobOutcome,
    pub tally: Tally,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn new(job_id: impl Into<String>, tally: Tally, elapsed: Duration) -> Self {
        Self {
            job_id: job_id.into(),
            outcome: tally.outcome(),
            tally,
            elapsed,
        }
    }

    /// One-line summary, also written as the final job log entry.
    pub fn summary(&self) -> String {
        format!(
            "Job {} finished: {} ({} succeeded, {} failed, {} skipped, success_rate={:.0}%) in {:.1}s",
            self.job_id,
            self.outcome,
            self.tally.succeeded,
            self.tally.failed,
            self.tally.skipped,
            self.tally.success_rate(),
            self.elapsed.as_secs_f64()
        )
    }
}
