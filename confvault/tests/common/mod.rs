//! Shared fixtures: a scripted in-process driver and temp-dir stores.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use confvault::driver::{CliDriver, CliSession, Response, SessionTimeouts};
use confvault::error::LogError;
use confvault::model::RetryPolicy;
use confvault::store::{LogEntry, LogKind};
use confvault::{
    CommandIntent, Credential, Device, DeviceError, Dispatcher, DriverRegistry, Executor,
    GitSnapshotStore, LogWriter, Redactor, SnapshotWriter, SqliteLogStore,
};

pub const PLATFORM: &str = "scripted";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What one connection attempt does.
#[derive(Debug, Clone)]
pub enum Step {
    Output(String),
    ConnectErr(DeviceError),
    RunErr(DeviceError),
    Panic,
}

pub fn unreachable(device: &str) -> DeviceError {
    DeviceError::ConnectionUnreachable {
        target: format!("{}.lab:22", device),
        reason: "connection refused".into(),
    }
}

pub fn timed_out(device: &str) -> DeviceError {
    DeviceError::ConnectionTimeout {
        target: format!("{}.lab:22", device),
        timeout: Duration::from_secs(10),
    }
}

pub fn auth_failed() -> DeviceError {
    DeviceError::AuthenticationFailed {
        user: "admin".into(),
        reason: "credentials rejected".into(),
    }
}

#[derive(Default)]
struct DriverState {
    attempts: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Driver whose behaviour per device and attempt is fixed in advance.
///
/// A device's script is consumed one step per attempt; the last step repeats.
/// Devices without a script return `hostname <id>`.
#[derive(Default)]
pub struct ScriptedDriver {
    scripts: HashMap<String, Vec<Step>>,
    delay: Duration,
    state: Arc<DriverState>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, device: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(device.to_string(), steps);
        self
    }

    /// Time every connect takes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self, device: &str) -> usize {
        self.state
            .attempts
            .lock()
            .unwrap()
            .get(device)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.state.attempts.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    fn next_step(&self, device: &str) -> Step {
        let attempt = {
            let mut attempts = self.state.attempts.lock().unwrap();
            let n = attempts.entry(device.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        match self.scripts.get(device) {
            Some(steps) => steps
                .get(attempt - 1)
                .or(steps.last())
                .cloned()
                .unwrap_or_else(|| Step::Output(format!("hostname {}\n", device))),
            None => Step::Output(format!("hostname {}\n", device)),
        }
    }
}

#[async_trait]
impl CliDriver for ScriptedDriver {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn command_for(&self, intent: &CommandIntent) -> Option<String> {
        match intent {
            CommandIntent::RunningConfig => Some("show running-config".into()),
            CommandIntent::StartupConfig => Some("show startup-config".into()),
            CommandIntent::Version => Some("show version".into()),
            CommandIntent::Custom(command) => Some(command.clone()),
        }
    }

    async fn connect(
        &self,
        device: &Device,
        _timeouts: SessionTimeouts,
    ) -> Result<Box<dyn CliSession>, DeviceError> {
        let step = self.next_step(&device.id);

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match step {
            Step::ConnectErr(err) => {
                self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
            Step::Panic => {
                self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("scripted panic on {}", device.id)
            }
            step => Ok(Box::new(ScriptedSession {
                step,
                state: self.state.clone(),
            })),
        }
    }
}

struct ScriptedSession {
    step: Step,
    state: Arc<DriverState>,
}

#[async_trait]
impl CliSession for ScriptedSession {
    async fn run(&mut self, command: &str) -> Result<Response, DeviceError> {
        match &self.step {
            Step::Output(output) => Ok(Response::new(
                command,
                output.clone(),
                "device#",
                Duration::from_millis(1),
            )),
            Step::RunErr(err) => Err(err.clone()),
            Step::ConnectErr(_) | Step::Panic => unreachable!(),
        }
    }

    async fn disconnect(self: Box<Self>) {
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Log writer that rejects every entry.
pub struct BrokenLogs;

#[async_trait]
impl LogWriter for BrokenLogs {
    async fn append(&self, _entry: LogEntry) -> Result<(), LogError> {
        Err(LogError::Worker("log database unavailable".into()))
    }
}

/// Forwards to a real store but panics on the first entry starting with `trigger`.
pub struct PanickingLogs {
    inner: Arc<SqliteLogStore>,
    trigger: &'static str,
}

impl PanickingLogs {
    pub fn new(inner: Arc<SqliteLogStore>, trigger: &'static str) -> Self {
        Self { inner, trigger }
    }
}

#[async_trait]
impl LogWriter for PanickingLogs {
    async fn append(&self, entry: LogEntry) -> Result<(), LogError> {
        if entry.message.starts_with(self.trigger) {
            panic!("log writer crashed on '{}'", entry.message);
        }
        self.inner.append(entry).await
    }
}

pub fn device(id: &str) -> Device {
    Device::new(
        id,
        format!("{}.lab", id),
        PLATFORM,
        Credential::password("admin", "pw"),
    )
}

/// Backoff short enough that retry tests finish quickly.
pub fn fast_retry(retries: u32) -> RetryPolicy {
    RetryPolicy::new(retries, Duration::from_millis(1), Duration::from_millis(5))
}

/// Scripted driver plus real git and SQLite stores in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub driver: Arc<ScriptedDriver>,
    pub logs: Arc<SqliteLogStore>,
    pub snapshots: Arc<GitSnapshotStore>,
}

impl Harness {
    pub fn new(driver: ScriptedDriver) -> Self {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let logs = Arc::new(SqliteLogStore::open(dir.path().join("logs.db")).unwrap());
        let snapshots = Arc::new(GitSnapshotStore::new(dir.path().join("snapshots")));
        Self {
            dir,
            driver: Arc::new(driver),
            logs,
            snapshots,
        }
    }

    pub fn registry(&self) -> DriverRegistry {
        let mut registry = DriverRegistry::new();
        registry.register(self.driver.clone()).unwrap();
        registry
    }

    pub fn executor_with(&self, logs: Arc<dyn LogWriter>) -> Arc<Executor> {
        let snapshots: Arc<dyn SnapshotWriter> = self.snapshots.clone();
        Arc::new(Executor::new(
            Arc::new(self.registry()),
            Redactor::default(),
            snapshots,
            logs,
            SessionTimeouts::default(),
        ))
    }

    pub fn dispatcher(&self, workers: usize, retries: u32) -> Dispatcher {
        let logs: Arc<dyn LogWriter> = self.logs.clone();
        Dispatcher::new(self.executor_with(logs.clone()), logs)
            .with_workers(workers)
            .with_retry_policy(fast_retry(retries))
    }

    pub async fn job_messages(&self, job_id: &str) -> Vec<String> {
        self.logs
            .entries(job_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == LogKind::Job)
            .map(|e| e.message)
            .collect()
    }

    pub async fn connection_logs(&self, job_id: &str) -> Vec<LogEntry> {
        self.logs
            .entries(job_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == LogKind::Connection)
            .collect()
    }
}
