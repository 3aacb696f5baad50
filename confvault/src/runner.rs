//! Job entry point used by the queue consumer.

use std::sync::Arc;

use log::{info, warn};

use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::driver::{CliDriver, DriverRegistry, SessionTimeouts, SshDriver, SshOptions};
use crate::error::Result;
use crate::executor::Executor;
use crate::inventory::Inventory;
use crate::model::{JobOutcome, JobReport, Tally};
use crate::platform::PlatformDefinition;
use crate::redact::Redactor;
use crate::store::{GitSnapshotStore, LogLevel, LogWriter, SnapshotWriter, SqliteLogStore};

/// Resolves a job from the inventory and runs it to completion.
pub struct Runner {
    inventory: Arc<dyn Inventory>,
    dispatcher: Dispatcher,
    logs: Arc<dyn LogWriter>,
}

impl Runner {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        dispatcher: Dispatcher,
        logs: Arc<dyn LogWriter>,
    ) -> Self {
        Self {
            inventory,
            dispatcher,
            logs,
        }
    }

    pub fn builder(inventory: Arc<dyn Inventory>) -> RunnerBuilder {
        RunnerBuilder::new(inventory)
    }

    /// Run `job_id` and return its outcome.
    ///
    /// Device failures never surface here; only a job or device list that
    /// cannot be loaded is an error.
    pub async fn run(&self, job_id: &str) -> Result<JobOutcome> {
        Ok(self.execute(job_id).await?.outcome)
    }

    /// Like [`run`](Runner::run), returning the full report.
    pub async fn execute(&self, job_id: &str) -> Result<JobReport> {
        let job = self.inventory.job(job_id).await?;
        let devices = self.inventory.devices_for_job(job_id).await?;

        if devices.is_empty() {
            warn!("job {}: no devices, nothing to do", job_id);
            self.logs
                .write_job_log(
                    job_id,
                    None,
                    LogLevel::Warning,
                    &format!("Job {} has no devices", job_id),
                )
                .await;
            return Ok(JobReport::new(job_id, Tally::default(), Default::default()));
        }

        let report = self.dispatcher.run(&job, devices).await;

        let level = match report.outcome {
            JobOutcome::Success => LogLevel::Info,
            JobOutcome::PartialFailure | JobOutcome::NoDevices => LogLevel::Warning,
            JobOutcome::Failure => LogLevel::Error,
        };
        info!("job {}: status {}", job_id, report.outcome);
        self.logs
            .write_job_log(
                job_id,
                None,
                level,
                &format!("Job {} status: {}", job_id, report.outcome),
            )
            .await;

        Ok(report)
    }
}

/// Builds a [`Runner`] from [`Settings`], opening the default stores for any
/// collaborator not supplied explicitly.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use confvault::{FileInventory, Runner, Settings};
///
/// # async fn example() -> Result<(), confvault::Error> {
/// let settings = Settings::from_file("confvault.toml")?;
/// let inventory = Arc::new(FileInventory::from_file("inventory.toml")?);
/// let runner = Runner::builder(inventory).settings(settings).build()?;
/// let outcome = runner.run("nightly").await?;
/// # Ok(())
/// # }
/// ```
pub struct RunnerBuilder {
    inventory: Arc<dyn Inventory>,
    settings: Settings,
    drivers: Option<DriverRegistry>,
    custom_platforms: Vec<PlatformDefinition>,
    custom_drivers: Vec<Arc<dyn CliDriver>>,
    logs: Option<Arc<dyn LogWriter>>,
    snapshots: Option<Arc<dyn SnapshotWriter>>,
}

impl RunnerBuilder {
    pub fn new(inventory: Arc<dyn Inventory>) -> Self {
        Self {
            inventory,
            settings: Settings::default(),
            drivers: None,
            custom_platforms: Vec::new(),
            custom_drivers: Vec::new(),
            logs: None,
            snapshots: None,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Use this registry instead of the built-in platforms.
    pub fn drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = Some(drivers);
        self
    }

    /// Add or override a platform served by the SSH driver.
    pub fn custom_platform(mut self, platform: PlatformDefinition) -> Self {
        self.custom_platforms.push(platform);
        self
    }

    /// Add or override a driver for its platform.
    pub fn driver(mut self, driver: Arc<dyn CliDriver>) -> Self {
        self.custom_drivers.push(driver);
        self
    }

    pub fn log_writer(mut self, logs: Arc<dyn LogWriter>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn snapshot_writer(mut self, snapshots: Arc<dyn SnapshotWriter>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn build(self) -> Result<Runner> {
        let settings = self.settings;
        settings.validate()?;

        let ssh_options = SshOptions::from(&settings.ssh);
        let mut drivers = match self.drivers {
            Some(drivers) => drivers,
            None => DriverRegistry::with_builtin(ssh_options.clone())?,
        };
        for platform in self.custom_platforms {
            drivers.replace(Arc::new(SshDriver::new(platform, ssh_options.clone())?));
        }
        for driver in self.custom_drivers {
            drivers.replace(driver);
        }

        let logs: Arc<dyn LogWriter> = match self.logs {
            Some(logs) => logs,
            None => Arc::new(SqliteLogStore::open(&settings.storage.log_database)?),
        };
        let snapshots: Arc<dyn SnapshotWriter> = match self.snapshots {
            Some(snapshots) => snapshots,
            None => Arc::new(GitSnapshotStore::new(&settings.storage.snapshot_repo)),
        };

        let executor = Executor::new(
            Arc::new(drivers),
            Redactor::new(&settings.redaction.patterns),
            snapshots,
            logs.clone(),
            SessionTimeouts {
                connect: settings.connection_timeout,
                command: settings.command_timeout,
            },
        );
        let dispatcher = Dispatcher::new(Arc::new(executor), logs.clone())
            .with_workers(settings.thread_pool_size)
            .with_retry_policy(settings.retry_policy())
            .with_job_timeout(settings.job_timeout);

        Ok(Runner::new(self.inventory, dispatcher, logs))
    }
}
