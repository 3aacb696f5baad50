//! Runtime settings loaded from TOML.
//!
//! Durations are written as seconds and may be fractional:
//!
//! ```toml
//! thread_pool_size = 8
//! connection_timeout = 10
//! command_timeout = 45.5
//! retry_attempts = 2
//! retry_backoff_base = 2
//!
//! [redaction]
//! patterns = ["password", "secret", "community"]
//!
//! [storage]
//! snapshot_repo = "/var/lib/confvault/backups"
//! log_database = "/var/lib/confvault/logs.db"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::model::RetryPolicy;
use crate::redact::DEFAULT_TRIGGERS;
use crate::transport::HostKeyVerification;

/// Top-level settings for the execution core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Maximum device sessions open at once.
    pub thread_pool_size: usize,

    #[serde(deserialize_with = "seconds")]
    pub connection_timeout: Duration,

    #[serde(deserialize_with = "seconds")]
    pub command_timeout: Duration,

    /// Retries after the first attempt for retriable failures.
    pub retry_attempts: u32,

    #[serde(deserialize_with = "seconds")]
    pub retry_backoff_base: Duration,

    #[serde(deserialize_with = "seconds")]
    pub retry_backoff_max: Duration,

    pub retry_jitter: bool,

    /// Deadline for a whole job; checked before each retry.
    #[serde(deserialize_with = "optional_seconds")]
    pub job_timeout: Option<Duration>,

    pub redaction: RedactionSettings,
    pub storage: StorageSettings,
    pub ssh: SshSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedactionSettings {
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    /// Git repository holding configuration snapshots.
    pub snapshot_repo: PathBuf,
    /// SQLite database holding job and connection logs.
    pub log_database: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSettings {
    pub host_key_verification: HostKeyVerification,
    pub known_hosts_path: Option<PathBuf>,
    /// Bytes from the end of the output searched for a prompt.
    pub search_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thread_pool_size: 5,
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            retry_attempts: 2,
            retry_backoff_base: Duration::from_secs(2),
            retry_backoff_max: Duration::from_secs(60),
            retry_jitter: true,
            job_timeout: None,
            redaction: RedactionSettings::default(),
            storage: StorageSettings::default(),
            ssh: SshSettings::default(),
        }
    }
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_TRIGGERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            snapshot_repo: PathBuf::from("backups"),
            log_database: PathBuf::from("confvault.db"),
        }
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            search_depth: 1000,
        }
    }
}

impl Settings {
    /// Load and validate settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_pool_size == 0 {
            return Err(invalid("thread_pool_size must be at least 1"));
        }
        if self.connection_timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if self.retry_backoff_max < self.retry_backoff_base {
            return Err(invalid("retry_backoff_max must not be below retry_backoff_base"));
        }
        if self.ssh.search_depth == 0 {
            return Err(invalid("ssh.search_depth must be at least 1"));
        }
        Ok(())
    }

    /// Default retry policy before per-job overrides.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            self.retry_backoff_base,
            self.retry_backoff_max,
        )
        .with_jitter(self.retry_jitter)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

pub(crate) fn optional_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.thread_pool_size, 5);
        assert_eq!(settings.retry_attempts, 2);
        assert_eq!(settings.command_timeout, Duration::from_secs(30));
        assert!(settings.job_timeout.is_none());
        assert!(settings.redaction.patterns.contains(&"password".to_string()));
        assert_eq!(
            settings.ssh.host_key_verification,
            HostKeyVerification::AcceptNew
        );
    }

    #[test]
    fn test_full_file() {
        let settings = Settings::from_toml_str(
            r#"
            thread_pool_size = 8
            connection_timeout = 2.5
            command_timeout = 60
            retry_attempts = 4
            retry_backoff_base = 0.5
            retry_backoff_max = 8
            retry_jitter = false
            job_timeout = 600

            [redaction]
            patterns = ["secret"]

            [storage]
            snapshot_repo = "/tmp/snapshots"
            log_database = "/tmp/logs.db"

            [ssh]
            host_key_verification = "strict"
            "#,
        )
        .unwrap();

        assert_eq!(settings.thread_pool_size, 8);
        assert_eq!(settings.connection_timeout, Duration::from_millis(2500));
        assert_eq!(settings.job_timeout, Some(Duration::from_secs(600)));
        assert_eq!(settings.redaction.patterns, vec!["secret".to_string()]);
        assert_eq!(settings.storage.log_database, PathBuf::from("/tmp/logs.db"));
        assert_eq!(settings.ssh.host_key_verification, HostKeyVerification::Strict);

        let policy = settings.retry_policy();
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert!(!policy.jitter);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let err = Settings::from_toml_str("thread_pool_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_rejects_negative_duration() {
        assert!(Settings::from_toml_str("command_timeout = -1").is_err());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(Settings::from_toml_str("thread_pool = 3").is_err());
    }
}
