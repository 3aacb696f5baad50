//! Job definition and retry policy.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// What a job asks every device to do.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandIntent {
    /// Retrieve the running configuration.
    RunningConfig,
    /// Retrieve the saved startup configuration.
    StartupConfig,
    /// Retrieve software version information.
    Version,
    /// Run a literal command on every device.
    Custom(String),
}

impl CommandIntent {
    /// Key into a platform's command table; `None` for literal commands.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            CommandIntent::RunningConfig => Some("running_config"),
            CommandIntent::StartupConfig => Some("startup_config"),
            CommandIntent::Version => Some("version"),
            CommandIntent::Custom(_) => None,
        }
    }

    /// Whether the command output is a configuration worth snapshotting.
    pub fn captures_config(&self) -> bool {
        matches!(
            self,
            CommandIntent::RunningConfig | CommandIntent::StartupConfig
        )
    }
}

impl fmt::Display for CommandIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandIntent::Custom(command) => write!(f, "custom({})", command),
            other => f.write_str(other.key().unwrap_or_default()),
        }
    }
}

/// A unit of work: one intent applied to a set of devices.
///
/// Per-job overrides take precedence over the global settings.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub intent: CommandIntent,
    pub retry_attempts: Option<u32>,
    pub retry_backoff_base: Option<Duration>,
    pub workers: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Job {
    pub fn new(id: impl Into<String>, intent: CommandIntent) -> Self {
        Self {
            id: id.into(),
            intent,
            retry_attempts: None,
            retry_backoff_base: None,
            workers: None,
            timeout: None,
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Exponential backoff for retriable device failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to a quarter of the delay at random.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Apply a job's overrides.
    pub fn for_job(&self, job: &Job) -> Self {
        Self {
            max_retries: job.retry_attempts.unwrap_or(self.max_retries),
            base_delay: job.retry_backoff_base.unwrap_or(self.base_delay),
            ..self.clone()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `base_delay * 2^retry`, capped at `max_delay`. `retry` starts at 0.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter {
            delay + jitter(delay / 4)
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(2), Duration::from_secs(60)).with_jitter(true)
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(50, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy =
            RetryPolicy::new(3, Duration::from_millis(400), Duration::from_secs(10)).with_jitter(true);
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(800));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_job_overrides() {
        let defaults = RetryPolicy::default();
        let mut job = Job::new("nightly", CommandIntent::RunningConfig).with_retry_attempts(0);
        job.retry_backoff_base = Some(Duration::from_millis(10));

        let policy = defaults.for_job(&job);
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, defaults.max_delay);
    }

    #[test]
    fn test_intent_keys() {
        assert_eq!(CommandIntent::RunningConfig.key(), Some("running_config"));
        assert_eq!(CommandIntent::Custom("show clock".into()).key(), None);
        assert!(CommandIntent::StartupConfig.captures_config());
        assert!(!CommandIntent::Version.captures_config());
    }
}
