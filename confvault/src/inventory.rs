//! Job and device lookup.
//!
//! The execution core only asks two questions of the outside world: what is
//! job X, and which devices does it target. [`FileInventory`] answers them
//! from a TOML file:
//!
//! ```toml
//! [[devices]]
//! id = "core-1"
//! host = "10.0.0.1"
//! platform = "cisco_iosxe"
//! username = "backup"
//! secret = "hunter2"
//!
//! [[jobs]]
//! id = "nightly"
//! intent = "running_config"
//! devices = ["core-1"]
//! retry_attempts = 1
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use secrecy::SecretString;
use serde::Deserialize;

use crate::config::optional_seconds;
use crate::error::{ConfigError, InventoryError};
use crate::model::{CommandIntent, Credential, Device, Job};

/// Read-only source of jobs and their target devices.
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn job(&self, job_id: &str) -> Result<Job, InventoryError>;

    async fn devices_for_job(&self, job_id: &str) -> Result<Vec<Device>, InventoryError>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InventoryFile {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
    #[serde(default)]
    jobs: Vec<JobRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceRecord {
    id: String,
    #[serde(default)]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    platform: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    secret: String,
    key_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobRecord {
    id: String,
    intent: CommandIntent,
    #[serde(default)]
    devices: Vec<String>,
    retry_attempts: Option<u32>,
    #[serde(default, deserialize_with = "optional_seconds")]
    retry_backoff_base: Option<Duration>,
    workers: Option<usize>,
    #[serde(default, deserialize_with = "optional_seconds")]
    timeout: Option<Duration>,
}

impl From<DeviceRecord> for Device {
    fn from(record: DeviceRecord) -> Self {
        let credential = Credential {
            username: record.username,
            secret: SecretString::from(record.secret),
            key_path: record.key_path,
        };
        Device::new(record.id, record.host, record.platform, credential).with_port(record.port)
    }
}

/// Inventory loaded once from a TOML file.
#[derive(Debug)]
pub struct FileInventory {
    devices: HashMap<String, Device>,
    jobs: HashMap<String, (Job, Vec<String>)>,
}

impl FileInventory {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, InventoryError> {
        let file: InventoryFile = toml::from_str(text).map_err(ConfigError::from)?;

        let mut devices = HashMap::with_capacity(file.devices.len());
        for record in file.devices {
            if devices.contains_key(&record.id) {
                return Err(InventoryError::Invalid {
                    message: format!("duplicate device id '{}'", record.id),
                });
            }
            devices.insert(record.id.clone(), Device::from(record));
        }

        let mut jobs = HashMap::with_capacity(file.jobs.len());
        for record in file.jobs {
            if jobs.contains_key(&record.id) {
                return Err(InventoryError::Invalid {
                    message: format!("duplicate job id '{}'", record.id),
                });
            }
            let job = Job {
                id: record.id.clone(),
                intent: record.intent,
                retry_attempts: record.retry_attempts,
                retry_backoff_base: record.retry_backoff_base,
                workers: record.workers,
                timeout: record.timeout,
            };
            jobs.insert(record.id, (job, record.devices));
        }

        Ok(Self { devices, jobs })
    }

    fn entry(&self, job_id: &str) -> Result<&(Job, Vec<String>), InventoryError> {
        self.jobs.get(job_id).ok_or_else(|| InventoryError::UnknownJob {
            job_id: job_id.to_string(),
        })
    }
}

#[async_trait]
impl Inventory for FileInventory {
    async fn job(&self, job_id: &str) -> Result<Job, InventoryError> {
        Ok(self.entry(job_id)?.0.clone())
    }

    async fn devices_for_job(&self, job_id: &str) -> Result<Vec<Device>, InventoryError> {
        let (_, ids) = self.entry(job_id)?;
        let mut devices = Vec::with_capacity(ids.len());
        for id in ids {
            match self.devices.get(id) {
                Some(device) => devices.push(device.clone()),
                None => warn!("job {}: device '{}' not in inventory, ignoring", job_id, id),
            }
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
        [[devices]]
        id = "r1"
        host = "10.0.0.1"
        platform = "cisco_iosxe"
        username = "admin"
        secret = "pw"

        [[devices]]
        id = "r2"
        host = "10.0.0.2"
        port = 2222
        platform = "juniper_junos"
        username = "admin"
        key_path = "/etc/confvault/id_ed25519"

        [[jobs]]
        id = "nightly"
        intent = "running_config"
        devices = ["r1", "r2", "ghost"]
        retry_attempts = 1
        retry_backoff_base = 0.5

        [[jobs]]
        id = "clock"
        intent = { custom = "show clock" }
        devices = ["r1"]
        workers = 2
        timeout = 120

        [[jobs]]
        id = "empty"
        intent = "version"
    "#;

    #[tokio::test]
    async fn test_job_lookup() {
        let inventory = FileInventory::from_toml_str(INVENTORY).unwrap();

        let job = inventory.job("nightly").await.unwrap();
        assert_eq!(job.intent, CommandIntent::RunningConfig);
        assert_eq!(job.retry_attempts, Some(1));
        assert_eq!(job.retry_backoff_base, Some(Duration::from_millis(500)));

        let job = inventory.job("clock").await.unwrap();
        assert_eq!(job.intent, CommandIntent::Custom("show clock".into()));
        assert_eq!(job.workers, Some(2));
        assert_eq!(job.timeout, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_unknown_devices_are_omitted() {
        let inventory = FileInventory::from_toml_str(INVENTORY).unwrap();
        let devices = inventory.devices_for_job("nightly").await.unwrap();

        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["r1", "r2"]);
        assert_eq!(devices[1].port, 2222);
        assert!(devices[1].credential.key_path.is_some());
    }

    #[tokio::test]
    async fn test_job_without_devices() {
        let inventory = FileInventory::from_toml_str(INVENTORY).unwrap();
        assert!(inventory.devices_for_job("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let inventory = FileInventory::from_toml_str(INVENTORY).unwrap();
        let err = inventory.job("weekly").await.unwrap_err();
        assert!(matches!(err, InventoryError::UnknownJob { .. }));
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let text = r#"
            [[devices]]
            id = "r1"
            [[devices]]
            id = "r1"
        "#;
        let err = FileInventory::from_toml_str(text).unwrap_err();
        assert!(matches!(err, InventoryError::Invalid { .. }));
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let inventory = FileInventory::from_toml_str(INVENTORY).unwrap();
        let debug = format!("{:?}", inventory);
        assert!(!debug.contains("\"pw\""));
    }
}
