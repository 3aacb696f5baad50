//! confvault command line: run backup jobs and inspect their results.
//!
//! ```bash
//! confvault --config confvault.toml --inventory inventory.toml run nightly
//! confvault --config confvault.toml history core-1
//! RUST_LOG=debug confvault --inventory inventory.toml run nightly
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::error;

use confvault::platform::vendors;
use confvault::{FileInventory, GitSnapshotStore, JobOutcome, Runner, Settings, SqliteLogStore};

/// Concurrent configuration backup for network devices
#[derive(Parser, Debug)]
#[command(name = "confvault", version)]
struct Cli {
    /// Settings file (TOML); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Inventory file (TOML) with devices and jobs
    #[arg(short, long, global = true, default_value = "inventory.toml")]
    inventory: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a job against all of its devices
    Run {
        job_id: String,
    },
    /// List built-in platforms
    Platforms,
    /// List stored snapshot versions of a device, newest first
    History {
        device_id: String,
    },
    /// Print a device's configuration at a snapshot version
    Show {
        device_id: String,
        version_id: String,
    },
    /// Print the log entries of a job
    Logs {
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode, confvault::Error> {
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Run { job_id } => {
            let inventory = Arc::new(FileInventory::from_file(&cli.inventory)?);
            let runner = Runner::builder(inventory).settings(settings).build()?;
            let report = runner.execute(&job_id).await?;
            println!("{}", report.summary());
            Ok(exit_code(report.outcome))
        }
        Command::Platforms => {
            for platform in vendors::builtin() {
                let intents: Vec<&str> = platform.commands.keys().map(String::as_str).collect();
                println!("{:<16} {}", platform.name, intents.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::History { device_id } => {
            let store = GitSnapshotStore::new(&settings.storage.snapshot_repo);
            for version in store.history(&device_id).await? {
                println!("{}", version);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Show {
            device_id,
            version_id,
        } => {
            let store = GitSnapshotStore::new(&settings.storage.snapshot_repo);
            print!("{}", store.read(&device_id, &version_id).await?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Logs { job_id } => {
            let store = SqliteLogStore::open(&settings.storage.log_database)?;
            for entry in store.entries(&job_id).await? {
                println!(
                    "{} {:<7} {:<10} {:<12} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.level,
                    entry.kind.as_str(),
                    entry.device_id.as_deref().unwrap_or("-"),
                    entry.message
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(outcome: JobOutcome) -> ExitCode {
    match outcome {
        JobOutcome::Success => ExitCode::SUCCESS,
        JobOutcome::PartialFailure => ExitCode::from(3),
        JobOutcome::Failure => ExitCode::from(1),
        JobOutcome::NoDevices => ExitCode::from(4),
    }
}
