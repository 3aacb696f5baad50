//! Vendor CLI drivers.
//!
//! The executor only sees the [`CliDriver`] and [`CliSession`] traits. Concrete
//! drivers are registered per platform in a [`DriverRegistry`] at startup; the
//! built-in [`SshDriver`] covers every platform in
//! [`platform::vendors`](crate::platform::vendors).

mod registry;
pub(crate) mod response;
mod ssh;

pub use registry::DriverRegistry;
pub use response::Response;
pub use ssh::{SshDriver, SshOptions};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DeviceError;
use crate::model::{CommandIntent, Device};

/// Timeouts applied to every session a driver opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Bound on connecting, authenticating and reaching the first prompt.
    pub connect: Duration,
    /// Bound on each command until its prompt returns.
    pub command: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            command: Duration::from_secs(30),
        }
    }
}

/// Opens CLI sessions for one platform family.
#[async_trait]
pub trait CliDriver: Send + Sync {
    /// Platform name this driver is registered under.
    fn platform(&self) -> &str;

    /// Translate a job intent into this platform's command.
    fn command_for(&self, intent: &CommandIntent) -> Option<String>;

    /// Connect and authenticate, leaving the session at a ready prompt.
    async fn connect(
        &self,
        device: &Device,
        timeouts: SessionTimeouts,
    ) -> Result<Box<dyn CliSession>, DeviceError>;
}

/// An open CLI session on one device.
#[async_trait]
pub trait CliSession: Send {
    /// Run one command and return its normalized output.
    async fn run(&mut self, command: &str) -> Result<Response, DeviceError>;

    /// Close the session. Errors are logged, not returned.
    async fn disconnect(self: Box<Self>);
}
