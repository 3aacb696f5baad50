//! One device's lifecycle within a job attempt.
//!
//! connect, run, redact, snapshot, log, classify. The executor never returns an
//! error: every failure becomes a [`DeviceOutcome::Failed`] and every storage
//! problem is logged without changing the device's classification.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::watch;

use crate::driver::{CliDriver, DriverRegistry, Response, SessionTimeouts};
use crate::error::DeviceError;
use crate::model::{Device, DeviceOutcome, Job, TaskState};
use crate::redact::Redactor;
use crate::store::{LogLevel, LogWriter, SnapshotWriter};

/// Runs a job's command against a single device.
pub struct Executor {
    drivers: Arc<DriverRegistry>,
    redactor: Redactor,
    snapshots: Arc<dyn SnapshotWriter>,
    logs: Arc<dyn LogWriter>,
    timeouts: SessionTimeouts,
}

impl Executor {
    pub fn new(
        drivers: Arc<DriverRegistry>,
        redactor: Redactor,
        snapshots: Arc<dyn SnapshotWriter>,
        logs: Arc<dyn LogWriter>,
        timeouts: SessionTimeouts,
    ) -> Self {
        Self {
            drivers,
            redactor,
            snapshots,
            logs,
            timeouts,
        }
    }

    /// One attempt against `device`. Sessions are always disconnected.
    pub async fn handle(&self, job: &Job, device: &Device) -> DeviceOutcome {
        let (progress, _) = watch::channel(TaskState::Connecting);
        self.handle_with_progress(job, device, &progress).await
    }

    /// Like [`handle`](Self::handle), publishing [`TaskState::Running`] on
    /// `progress` once the session is open.
    pub async fn handle_with_progress(
        &self,
        job: &Job,
        device: &Device,
        progress: &watch::Sender<TaskState>,
    ) -> DeviceOutcome {
        match self.retrieve(job, device, progress).await {
            Ok(response) => self.on_success(job, device, response).await,
            Err(err) => self.on_failure(job, device, err).await,
        }
    }

    async fn retrieve(
        &self,
        job: &Job,
        device: &Device,
        progress: &watch::Sender<TaskState>,
    ) -> Result<Response, DeviceError> {
        let driver = self.drivers.get(&device.platform).ok_or_else(|| {
            DeviceError::command(format!(
                "no driver registered for platform '{}'",
                device.platform
            ))
        })?;
        let command = resolve_command(driver.as_ref(), job)?;

        debug!(
            "job {}: connecting to {} ({}) for '{}'",
            job.id,
            device.id,
            device.target(),
            command
        );
        let mut session = driver.connect(device, self.timeouts).await?;
        progress.send_replace(TaskState::Running);
        let result = session.run(&command).await;
        session.disconnect().await;
        result
    }

    async fn on_success(&self, job: &Job, device: &Device, response: Response) -> DeviceOutcome {
        let output = self.redactor.redact(&response.result);

        let version_id = if job.intent.captures_config() {
            match self.snapshots.commit(&device.id, &output, &job.id).await {
                Ok(version) => Some(version),
                Err(e) => {
                    warn!("job {}: snapshot of {} failed: {}", job.id, device.id, e);
                    self.logs
                        .write_job_log(
                            &job.id,
                            Some(&device.id),
                            LogLevel::Warning,
                            &format!("[{}] snapshot not stored: {}", e.kind(), e),
                        )
                        .await;
                    None
                }
            }
        } else {
            None
        };

        let transcript = self.redactor.redact(&response.transcript(&output));
        self.logs
            .write_connection_log(&job.id, &device.id, LogLevel::Info, &transcript)
            .await;

        let message = match &version_id {
            Some(version) => format!(
                "Retrieved '{}' from {} in {:.1}s, snapshot {}",
                response.command,
                device.id,
                response.elapsed.as_secs_f64(),
                version
            ),
            None => format!(
                "Retrieved '{}' from {} in {:.1}s",
                response.command,
                device.id,
                response.elapsed.as_secs_f64()
            ),
        };
        self.logs
            .write_job_log(&job.id, Some(&device.id), LogLevel::Info, &message)
            .await;

        DeviceOutcome::Succeeded { output, version_id }
    }

    async fn on_failure(&self, job: &Job, device: &Device, err: DeviceError) -> DeviceOutcome {
        debug!("job {}: {} failed: {}", job.id, device.id, err);
        let message = format!("[{}] {}", err.kind(), err);
        self.logs
            .write_connection_log(&job.id, &device.id, LogLevel::Error, &message)
            .await;
        self.logs
            .write_job_log(
                &job.id,
                Some(&device.id),
                LogLevel::Error,
                &format!("Attempt on {} failed: {}", device.id, message),
            )
            .await;
        DeviceOutcome::Failed(err)
    }
}

fn resolve_command(driver: &dyn CliDriver, job: &Job) -> Result<String, DeviceError> {
    driver.command_for(&job.intent).ok_or_else(|| {
        DeviceError::command(format!(
            "platform '{}' has no command for {}",
            driver.platform(),
            job.intent
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::driver::CliSession;
    use crate::error::{ErrorKind, LogError, SnapshotError};
    use crate::model::{CommandIntent, Credential};
    use crate::store::{LogEntry, LogKind};

    struct FixedDriver {
        output: Result<&'static str, DeviceError>,
        disconnects: Arc<AtomicUsize>,
    }

    struct FixedSession {
        output: Result<&'static str, DeviceError>,
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CliDriver for FixedDriver {
        fn platform(&self) -> &str {
            "fake"
        }

        fn command_for(&self, intent: &CommandIntent) -> Option<String> {
            match intent {
                CommandIntent::Custom(c) => Some(c.clone()),
                CommandIntent::RunningConfig => Some("show running-config".into()),
                _ => None,
            }
        }

        async fn connect(
            &self,
            _device: &Device,
            _timeouts: SessionTimeouts,
        ) -> Result<Box<dyn CliSession>, DeviceError> {
            Ok(Box::new(FixedSession {
                output: self.output.clone(),
                disconnects: self.disconnects.clone(),
            }))
        }
    }

    #[async_trait]
    impl CliSession for FixedSession {
        async fn run(&mut self, command: &str) -> Result<Response, DeviceError> {
            self.output
                .clone()
                .map(|out| Response::new(command, out, "r1#", Duration::from_millis(5)))
        }

        async fn disconnect(self: Box<Self>) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MemoryLogs(Mutex<Vec<LogEntry>>);

    #[async_trait]
    impl LogWriter for MemoryLogs {
        async fn append(&self, entry: LogEntry) -> Result<(), LogError> {
            self.0.lock().unwrap().push(entry);
            Ok(())
        }
    }

    struct BrokenSnapshots;

    #[async_trait]
    impl SnapshotWriter for BrokenSnapshots {
        async fn commit(&self, _: &str, _: &str, _: &str) -> Result<String, SnapshotError> {
            Err(SnapshotError::Worker("disk full".into()))
        }
    }

    #[derive(Default)]
    struct MemorySnapshots(Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl SnapshotWriter for MemorySnapshots {
        async fn commit(&self, device_id: &str, config: &str, _: &str) -> Result<String, SnapshotError> {
            let mut stored = self.0.lock().unwrap();
            stored.push((device_id.to_string(), config.to_string()));
            Ok(format!("v{}", stored.len()))
        }
    }

    fn executor(
        output: Result<&'static str, DeviceError>,
        snapshots: Arc<dyn SnapshotWriter>,
        logs: Arc<MemoryLogs>,
    ) -> (Executor, Arc<AtomicUsize>) {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let mut registry = DriverRegistry::new();
        registry
            .register(Arc::new(FixedDriver {
                output,
                disconnects: disconnects.clone(),
            }))
            .unwrap();
        let executor = Executor::new(
            Arc::new(registry),
            Redactor::default(),
            snapshots,
            logs,
            SessionTimeouts::default(),
        );
        (executor, disconnects)
    }

    fn device(platform: &str) -> Device {
        Device::new("r1", "10.0.0.1", platform, Credential::password("admin", "pw"))
    }

    #[tokio::test]
    async fn test_success_redacts_and_snapshots() {
        let logs = Arc::new(MemoryLogs::default());
        let snapshots = Arc::new(MemorySnapshots::default());
        let (executor, disconnects) = executor(
            Ok("hostname r1\nenable secret 5 $1$abc\n"),
            snapshots.clone(),
            logs.clone(),
        );
        let job = Job::new("j1", CommandIntent::RunningConfig);

        let outcome = executor.handle(&job, &device("fake")).await;

        match outcome {
            DeviceOutcome::Succeeded { output, version_id } => {
                assert_eq!(output, "hostname r1\n[REDACTED]\n");
                assert_eq!(version_id.as_deref(), Some("v1"));
            }
            DeviceOutcome::Failed(e) => panic!("unexpected failure: {e}"),
        }
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(snapshots.0.lock().unwrap()[0].1, "hostname r1\n[REDACTED]\n");

        let entries = logs.0.lock().unwrap();
        assert!(entries.iter().all(|e| !e.message.contains("$1$abc")));
        assert_eq!(
            entries.iter().filter(|e| e.kind == LogKind::Connection).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_custom_command_is_not_snapshotted() {
        let logs = Arc::new(MemoryLogs::default());
        let snapshots = Arc::new(MemorySnapshots::default());
        let (executor, _) = executor(Ok("up 3 days"), snapshots.clone(), logs);
        let job = Job::new("j1", CommandIntent::Custom("uptime".into()));

        let outcome = executor.handle(&job, &device("fake")).await;
        assert!(outcome.is_success());
        assert!(snapshots.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_failure_keeps_success() {
        let logs = Arc::new(MemoryLogs::default());
        let (executor, _) = executor(Ok("hostname r1"), Arc::new(BrokenSnapshots), logs.clone());
        let job = Job::new("j1", CommandIntent::RunningConfig);

        let outcome = executor.handle(&job, &device("fake")).await;
        assert!(outcome.is_success());

        let entries = logs.0.lock().unwrap();
        assert!(
            entries
                .iter()
                .any(|e| e.level == LogLevel::Warning && e.message.contains("SnapshotError"))
        );
    }

    #[tokio::test]
    async fn test_failure_is_logged_and_disconnected() {
        let logs = Arc::new(MemoryLogs::default());
        let (executor, disconnects) = executor(
            Err(DeviceError::command("% Invalid input")),
            Arc::new(MemorySnapshots::default()),
            logs.clone(),
        );
        let job = Job::new("j1", CommandIntent::RunningConfig);

        let outcome = executor.handle(&job, &device("fake")).await;
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::CommandError));
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        let entries = logs.0.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.level == LogLevel::Error));
    }

    #[tokio::test]
    async fn test_unknown_platform_is_command_error() {
        let logs = Arc::new(MemoryLogs::default());
        let (executor, _) = executor(Ok(""), Arc::new(MemorySnapshots::default()), logs);
        let job = Job::new("j1", CommandIntent::RunningConfig);

        let outcome = executor.handle(&job, &device("vax_vms")).await;
        let err = outcome.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::CommandError);
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn test_progress_reports_open_session() {
        let logs = Arc::new(MemoryLogs::default());
        let (executor, _) = executor(
            Err(DeviceError::command("% Invalid input")),
            Arc::new(MemorySnapshots::default()),
            logs,
        );
        let job = Job::new("j1", CommandIntent::RunningConfig);

        let (progress, state) = watch::channel(TaskState::Connecting);
        executor
            .handle_with_progress(&job, &device("vax_vms"), &progress)
            .await;
        assert_eq!(*state.borrow(), TaskState::Connecting);

        executor
            .handle_with_progress(&job, &device("fake"), &progress)
            .await;
        assert_eq!(*state.borrow(), TaskState::Running);
    }

    #[tokio::test]
    async fn test_unsupported_intent_is_command_error() {
        let logs = Arc::new(MemoryLogs::default());
        let (executor, _) = executor(Ok(""), Arc::new(MemorySnapshots::default()), logs);
        let job = Job::new("j1", CommandIntent::Version);

        let outcome = executor.handle(&job, &device("fake")).await;
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::CommandError));
    }
}
