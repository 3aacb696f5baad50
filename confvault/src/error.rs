//! Error types for confvault.
//!
//! Device interaction failures are reported through [`DeviceError`], a closed
//! taxonomy whose [`ErrorKind`] decides whether the dispatcher retries. The
//! transport and channel layers keep their own detailed errors and are folded
//! into a `DeviceError` at the driver boundary.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Classification of a failure, independent of its message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ConnectionUnreachable,
    ConnectionTimeout,
    AuthenticationFailed,
    CommandError,
    SnapshotError,
    LoggingError,
}

impl ErrorKind {
    /// Transient network conditions are retried, everything else is final.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionUnreachable | ErrorKind::ConnectionTimeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConnectionUnreachable => "ConnectionUnreachable",
            ErrorKind::ConnectionTimeout => "ConnectionTimeout",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::CommandError => "CommandError",
            ErrorKind::SnapshotError => "SnapshotError",
            ErrorKind::LoggingError => "LoggingError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one device task attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not be reached at all.
    #[error("Device {target} unreachable: {reason}")]
    ConnectionUnreachable { target: String, reason: String },

    /// Connecting to, or waiting on, the device exceeded its timeout.
    #[error("Timed out after {timeout:?} waiting on {target}")]
    ConnectionTimeout { target: String, timeout: Duration },

    /// Credentials or host identity were rejected.
    #[error("Authentication failed for user '{user}': {reason}")]
    AuthenticationFailed { user: String, reason: String },

    /// The command could not be issued or the device reported an error.
    #[error("Command failed: {message}")]
    CommandError { message: String },
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::ConnectionUnreachable { .. } => ErrorKind::ConnectionUnreachable,
            DeviceError::ConnectionTimeout { .. } => ErrorKind::ConnectionTimeout,
            DeviceError::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            DeviceError::CommandError { .. } => ErrorKind::CommandError,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }

    pub fn command(message: impl Into<String>) -> Self {
        DeviceError::CommandError {
            message: message.into(),
        }
    }
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key is not present in known_hosts (strict mode)
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel layer errors (pattern matching, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(#[from] russh::Error),
}

impl TransportError {
    /// Fold a transport failure into the device error taxonomy.
    pub fn classify(self, target: &str, username: &str) -> DeviceError {
        match self {
            TransportError::ConnectionFailed { source, .. } => DeviceError::ConnectionUnreachable {
                target: target.to_string(),
                reason: source.to_string(),
            },
            TransportError::Timeout(timeout) => DeviceError::ConnectionTimeout {
                target: target.to_string(),
                timeout,
            },
            TransportError::AuthenticationFailed { user } => DeviceError::AuthenticationFailed {
                user,
                reason: "credentials rejected".to_string(),
            },
            e @ (TransportError::HostKeyUnknown { .. } | TransportError::HostKeyChanged { .. }) => {
                DeviceError::AuthenticationFailed {
                    user: username.to_string(),
                    reason: e.to_string(),
                }
            }
            TransportError::Key(reason) => DeviceError::AuthenticationFailed {
                user: username.to_string(),
                reason,
            },
            TransportError::KnownHosts(reason) => DeviceError::command(reason),
            TransportError::Ssh(e) => classify_ssh(e, target),
        }
    }
}

impl ChannelError {
    pub fn classify(self, target: &str) -> DeviceError {
        match self {
            ChannelError::PatternTimeout(timeout) => DeviceError::ConnectionTimeout {
                target: target.to_string(),
                timeout,
            },
            ChannelError::Closed => DeviceError::ConnectionUnreachable {
                target: target.to_string(),
                reason: "channel closed by peer".to_string(),
            },
            ChannelError::Ssh(e) => classify_ssh(e, target),
        }
    }
}

fn classify_ssh(error: russh::Error, target: &str) -> DeviceError {
    match error {
        russh::Error::IO(e) => DeviceError::ConnectionUnreachable {
            target: target.to_string(),
            reason: e.to_string(),
        },
        russh::Error::Disconnect | russh::Error::HUP => DeviceError::ConnectionUnreachable {
            target: target.to_string(),
            reason: "disconnected by peer".to_string(),
        },
        russh::Error::ConnectionTimeout
        | russh::Error::KeepaliveTimeout
        | russh::Error::InactivityTimeout => DeviceError::ConnectionTimeout {
            target: target.to_string(),
            timeout: Duration::ZERO,
        },
        other => DeviceError::command(format!("SSH protocol error: {other}")),
    }
}

/// Snapshot store errors.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Device id '{0}' cannot be used as a snapshot path")]
    InvalidDeviceId(String),

    #[error("No snapshot of device '{device_id}' in version {version_id}")]
    NotFound {
        device_id: String,
        version_id: String,
    },

    #[error("Snapshot worker failed: {0}")]
    Worker(String),
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::SnapshotError
    }
}

/// Log store errors.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Malformed log row: {0}")]
    Malformed(String),

    #[error("Log worker failed: {0}")]
    Worker(String),
}

impl LogError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::LoggingError
    }
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors raised while resolving a job and its devices.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Unknown job '{job_id}'")]
    UnknownJob { job_id: String },

    #[error("Invalid inventory: {message}")]
    Invalid { message: String },

    #[error("Inventory configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Driver registration errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Invalid platform definition
    #[error("Invalid platform definition: {message}")]
    InvalidDefinition { message: String },

    #[error("Invalid prompt pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Platform '{name}' is already registered")]
    AlreadyRegistered { name: String },
}

/// Main error type for confvault operations that can surface to a caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Log store error: {0}")]
    Log(#[from] LogError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Result type alias using confvault's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_conditions_are_retriable() {
        assert!(ErrorKind::ConnectionUnreachable.is_retriable());
        assert!(ErrorKind::ConnectionTimeout.is_retriable());
        assert!(!ErrorKind::AuthenticationFailed.is_retriable());
        assert!(!ErrorKind::CommandError.is_retriable());
        assert!(!ErrorKind::SnapshotError.is_retriable());
        assert!(!ErrorKind::LoggingError.is_retriable());
    }

    #[test]
    fn test_transport_classification() {
        let refused = TransportError::ConnectionFailed {
            host: "10.0.0.1".into(),
            port: 22,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(
            refused.classify("10.0.0.1:22", "admin").kind(),
            ErrorKind::ConnectionUnreachable
        );

        let timeout = TransportError::Timeout(Duration::from_secs(5));
        assert_eq!(
            timeout.classify("10.0.0.1:22", "admin").kind(),
            ErrorKind::ConnectionTimeout
        );

        let changed = TransportError::HostKeyChanged {
            host: "10.0.0.1".into(),
            port: 22,
            line: 3,
        };
        let err = changed.classify("10.0.0.1:22", "admin");
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_channel_timeout_is_retriable() {
        let err = ChannelError::PatternTimeout(Duration::from_secs(30)).classify("r1");
        assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);
        assert!(err.is_retriable());
    }
}
