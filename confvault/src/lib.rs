//! # confvault
//!
//! Concurrent configuration backup engine for network devices.
//!
//! A job names a command intent and a set of devices. confvault opens a CLI
//! session to every device over SSH with bounded parallelism, retries transient
//! network failures with exponential backoff, masks sensitive lines, commits
//! retrieved configurations to a git repository and records every interaction
//! in a SQLite log.
//!
//! ## Features
//!
//! - Async SSH sessions via russh, with host key verification
//! - Multi-vendor platforms (Linux, Cisco IOS-XE, Arista EOS, Juniper, Nokia, Arrcus)
//! - Tail-searching prompt matcher with ANSI stripping
//! - Closed error taxonomy deciding what is retried
//! - Pluggable drivers and stores behind traits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use confvault::{FileInventory, JobOutcome, Runner, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), confvault::Error> {
//!     let settings = Settings::from_file("confvault.toml")?;
//!     let inventory = Arc::new(FileInventory::from_file("inventory.toml")?);
//!
//!     let runner = Runner::builder(inventory).settings(settings).build()?;
//!     match runner.run("nightly").await? {
//!         JobOutcome::Success => println!("all devices backed up"),
//!         other => println!("job finished with {}", other),
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod model;
pub mod platform;
pub mod redact;
pub mod runner;
pub mod store;
pub mod transport;

// Re-export main types for convenience
pub use config::Settings;
pub use dispatcher::Dispatcher;
pub use driver::{CliDriver, CliSession, DriverRegistry, Response, SessionTimeouts};
pub use error::{DeviceError, Error, ErrorKind, Result};
pub use executor::Executor;
pub use inventory::{FileInventory, Inventory};
pub use model::{CommandIntent, Credential, Device, DeviceOutcome, Job, JobOutcome, JobReport};
pub use platform::PlatformDefinition;
pub use redact::Redactor;
pub use runner::{Runner, RunnerBuilder};
pub use store::{GitSnapshotStore, LogLevel, LogWriter, SnapshotWriter, SqliteLogStore};
