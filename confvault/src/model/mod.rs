//! Job, device and outcome types shared by the execution core.

mod device;
mod job;
mod outcome;
mod task;

pub use device::{Credential, Device};
pub use job::{CommandIntent, Job, RetryPolicy};
pub use outcome::{DeviceOutcome, JobOutcome, JobReport, Tally};
pub use task::{DeviceTask, TaskState};
