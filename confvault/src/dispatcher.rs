//! Bounded fan-out of a job over its devices.
//!
//! Each valid device gets one task on a [`JoinSet`], tracked by a
//! [`DeviceTask`]. A [`Semaphore`] caps how many attempts run at once; a task
//! holds its permit only while an attempt is in flight, so backoff sleeps never
//! starve other devices. Every attempt runs on its own spawned task so a panic
//! fails that device and nothing else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::DeviceError;
use crate::executor::Executor;
use crate::model::{
    Device, DeviceOutcome, DeviceTask, Job, JobReport, RetryPolicy, Tally, TaskState,
};
use crate::store::{LogLevel, LogWriter};

/// Default number of concurrent device sessions.
pub const DEFAULT_WORKERS: usize = 5;

/// Runs a job against a device list and folds the results into a [`JobReport`].
pub struct Dispatcher {
    executor: Arc<Executor>,
    logs: Arc<dyn LogWriter>,
    workers: usize,
    retry: RetryPolicy,
    job_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(executor: Arc<Executor>, logs: Arc<dyn LogWriter>) -> Self {
        Self {
            executor,
            logs,
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            job_timeout: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub async fn run(&self, job: &Job, devices: Vec<Device>) -> JobReport {
        let started = Instant::now();
        let mut tally = Tally::default();

        let mut valid = Vec::with_capacity(devices.len());
        for device in devices {
            match device.validate() {
                Ok(()) => valid.push(device),
                Err(reason) => {
                    tally.skipped += 1;
                    warn!("job {}: skipping device '{}': {}", job.id, device.id, reason);
                    let device_id = Some(device.id.as_str()).filter(|id| !id.trim().is_empty());
                    self.logs
                        .write_job_log(
                            &job.id,
                            device_id,
                            LogLevel::Warning,
                            &format!("Skipping invalid device '{}': {}", device.id, reason),
                        )
                        .await;
                }
            }
        }

        if valid.is_empty() {
            self.logs
                .write_job_log(
                    &job.id,
                    None,
                    LogLevel::Warning,
                    &format!("Job {} has no valid devices; nothing dispatched", job.id),
                )
                .await;
            return JobReport::new(&job.id, tally, started.elapsed());
        }

        let workers = job.workers.unwrap_or(self.workers).max(1);
        let ctx = Arc::new(TaskContext {
            job: job.clone(),
            executor: self.executor.clone(),
            logs: self.logs.clone(),
            permits: Arc::new(Semaphore::new(workers)),
            retry: self.retry.for_job(job),
            deadline: job.timeout.or(self.job_timeout).map(|t| started + t),
        });

        info!(
            "job {}: dispatching {} to {} device(s) with {} worker(s)",
            job.id,
            job.intent,
            valid.len(),
            workers
        );
        self.logs
            .write_job_log(
                &job.id,
                None,
                LogLevel::Info,
                &format!(
                    "Dispatching {} to {} device(s) with {} worker(s)",
                    job.intent,
                    valid.len(),
                    workers
                ),
            )
            .await;

        let mut unfinished: HashMap<String, usize> = HashMap::new();
        let mut tasks = JoinSet::new();
        for device in valid {
            *unfinished.entry(device.id.clone()).or_default() += 1;
            tasks.spawn(run_device(ctx.clone(), device));
        }

        let mut lost = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(task) => {
                    if let Some(count) = unfinished.get_mut(task.device_id()) {
                        *count -= 1;
                    }
                    if !task.state().is_terminal() {
                        error!(
                            "job {}: device {} returned in state {}",
                            job.id,
                            task.device_id(),
                            task.state()
                        );
                    }
                    tally.record(task.state());
                }
                Err(e) => {
                    error!("job {}: device task lost: {}", job.id, e);
                    lost.push(e.to_string());
                }
            }
        }

        // devices whose task died before returning its record
        let reason = lost.join("; ");
        for (device_id, count) in unfinished {
            for _ in 0..count {
                tally.record(TaskState::Failed);
                self.logs
                    .write_job_log(
                        &job.id,
                        Some(&device_id),
                        LogLevel::Error,
                        &format!(
                            "Device {} completed: FAILED, task lost: {}",
                            device_id, reason
                        ),
                    )
                    .await;
            }
        }

        let report = JobReport::new(&job.id, tally, started.elapsed());
        info!("{}", report.summary());
        self.logs
            .write_job_log(&job.id, None, LogLevel::Info, &report.summary())
            .await;
        report
    }
}

struct TaskContext {
    job: Job,
    executor: Arc<Executor>,
    logs: Arc<dyn LogWriter>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    deadline: Option<Instant>,
}

impl TaskContext {
    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Drive one device to a terminal state.
async fn run_device(ctx: Arc<TaskContext>, device: Device) -> DeviceTask {
    let device = Arc::new(device);
    let max_attempts = ctx.retry.max_attempts();
    let mut task = DeviceTask::new(device.id.clone());

    let last_error = loop {
        let outcome = {
            let Ok(_permit) = ctx.permits.acquire().await else {
                let err = DeviceError::command("worker pool closed");
                task.fail(err.kind(), false);
                break Some(err);
            };
            task.start_attempt();
            attempt_once(&ctx, &device, &mut task).await
        };

        let err = match outcome {
            DeviceOutcome::Succeeded { output, version_id } => {
                // a successful attempt always had an open session
                task.advance(TaskState::Running);
                task.succeed(output, version_id);
                break None;
            }
            DeviceOutcome::Failed(err) => err,
        };

        if !err.is_retriable() || task.attempts() >= max_attempts {
            task.fail(err.kind(), false);
            break Some(err);
        }
        if ctx.expired() {
            log_deadline(&ctx, &device).await;
            task.fail(err.kind(), false);
            break Some(err);
        }

        task.fail(err.kind(), true);
        let delay = ctx.retry.delay_for(task.attempts() - 1);
        ctx.logs
            .write_job_log(
                &ctx.job.id,
                Some(&device.id),
                LogLevel::Warning,
                &format!(
                    "Retrying {} in {:.1}s (attempt {}/{}) after [{}] {}",
                    device.id,
                    delay.as_secs_f64(),
                    task.attempts() + 1,
                    max_attempts,
                    err.kind(),
                    err
                ),
            )
            .await;
        tokio::time::sleep(delay).await;

        if ctx.expired() {
            log_deadline(&ctx, &device).await;
            task.advance(TaskState::Failed);
            break Some(err);
        }
    };

    if task.state() == TaskState::Succeeded {
        debug!(
            "job {}: {} returned {} byte(s), snapshot {:?}",
            ctx.job.id,
            device.id,
            task.output().map_or(0, str::len),
            task.version_id()
        );
    } else if let Some(kind) = task.last_error() {
        debug!("job {}: {} gave up on {}", ctx.job.id, device.id, kind);
    }

    let (level, message) = match &last_error {
        None => (
            LogLevel::Info,
            format!(
                "Device {} completed: {} after {} attempt(s)",
                device.id,
                task.state(),
                task.attempts()
            ),
        ),
        Some(err) => (
            LogLevel::Error,
            format!(
                "Device {} completed: {} after {} attempt(s): [{}] {}",
                device.id,
                task.state(),
                task.attempts(),
                err.kind(),
                err
            ),
        ),
    };
    ctx.logs
        .write_job_log(&ctx.job.id, Some(&device.id), level, &message)
        .await;
    task
}

async fn log_deadline(ctx: &TaskContext, device: &Device) {
    ctx.logs
        .write_job_log(
            &ctx.job.id,
            Some(&device.id),
            LogLevel::Warning,
            &format!("Job deadline passed; not retrying {}", device.id),
        )
        .await;
}

/// One executor attempt on its own task so a panic stays local.
///
/// Session progress reported by the executor is applied to `task` while the
/// attempt runs.
async fn attempt_once(
    ctx: &Arc<TaskContext>,
    device: &Arc<Device>,
    task: &mut DeviceTask,
) -> DeviceOutcome {
    let (progress, mut state) = watch::channel(TaskState::Connecting);
    let task_ctx = ctx.clone();
    let task_device = device.clone();
    let mut handle = tokio::spawn(async move {
        task_ctx
            .executor
            .handle_with_progress(&task_ctx.job, &task_device, &progress)
            .await
    });

    let joined = loop {
        tokio::select! {
            joined = &mut handle => break joined,
            Ok(()) = state.changed() => {
                let next = *state.borrow_and_update();
                task.advance(next);
            }
        }
    };
    let reached = *state.borrow();
    task.advance(reached);

    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            let reason = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            error!(
                "job {}: task for {} aborted: {}",
                ctx.job.id, device.id, reason
            );
            let err = DeviceError::command(format!("device task panicked: {}", reason));
            ctx.logs
                .write_connection_log(
                    &ctx.job.id,
                    &device.id,
                    LogLevel::Error,
                    &format!("[{}] {}", err.kind(), err),
                )
                .await;
            DeviceOutcome::Failed(err)
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
