//! Versioned configuration snapshots in a git repository.
//!
//! Each successful retrieval writes `<device>.cfg` in the repository work tree
//! and records exactly one commit. The commit id is the snapshot's version id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use git2::{ErrorCode, Oid, Repository, Signature, Sort};
use log::debug;

use crate::error::SnapshotError;

/// Destination for retrieved configurations.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    /// Store `config` for `device_id` and return the new version id.
    async fn commit(
        &self,
        device_id: &str,
        config: &str,
        job_id: &str,
    ) -> Result<String, SnapshotError>;
}

const MESSAGE_PREFIX: &str = "Config backup for device ";
const MESSAGE_JOB: &str = " | Job ID: ";

/// Commit message recorded with every snapshot.
pub fn commit_message(device_id: &str, job_id: &str) -> String {
    format!("{}{}{}{}", MESSAGE_PREFIX, device_id, MESSAGE_JOB, job_id)
}

/// Device id named by a snapshot commit message.
fn message_device(message: &str) -> Option<&str> {
    message
        .strip_prefix(MESSAGE_PREFIX)?
        .rsplit_once(MESSAGE_JOB)
        .map(|(device, _)| device)
}

/// Git-backed snapshot store.
///
/// File writes for different devices run in parallel; writes for the same
/// device are serialised; index and HEAD updates are serialised repository-wide.
pub struct GitSnapshotStore {
    root: PathBuf,
    repo_lock: Arc<Mutex<()>>,
    device_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GitSnapshotStore {
    /// The repository is created on first commit if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            repo_lock: Arc::new(Mutex::new(())),
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name a device's configuration is stored under.
    ///
    /// ASCII letters, digits, `-`, `_` and any `.` but a leading one are kept.
    /// Every other byte becomes `%XX`, so two ids never share a file.
    pub fn file_name(device_id: &str) -> Result<String, SnapshotError> {
        if device_id.is_empty() {
            return Err(SnapshotError::InvalidDeviceId(device_id.to_string()));
        }
        let mut name = String::with_capacity(device_id.len() + 4);
        for (i, b) in device_id.bytes().enumerate() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0) {
                name.push(char::from(b));
            } else {
                name.push_str(&format!("%{:02X}", b));
            }
        }
        name.push_str(".cfg");
        Ok(name)
    }

    fn device_lock(&self, file_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .device_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(file_name.to_string()).or_default().clone()
    }

    /// Forget a device's lock once no commit holds or awaits it.
    fn release_device_lock(&self, file_name: &str) {
        let mut locks = self
            .device_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(file_name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(file_name);
        }
    }

    /// Version ids of a device's snapshots, newest first.
    pub async fn history(&self, device_id: &str) -> Result<Vec<String>, SnapshotError> {
        let root = self.root.clone();
        let device_id = device_id.to_string();
        blocking(move || {
            let repo = match Repository::open(&root) {
                Ok(repo) => repo,
                Err(e) if e.code() == ErrorCode::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let mut walk = repo.revwalk()?;
            match walk.push_head() {
                Ok(()) => {}
                Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            }
            walk.set_sorting(Sort::TOPOLOGICAL)?;

            let mut versions = Vec::new();
            for oid in walk {
                let oid = oid?;
                let commit = repo.find_commit(oid)?;
                if commit.message().and_then(message_device) == Some(device_id.as_str()) {
                    versions.push(oid.to_string());
                }
            }
            Ok(versions)
        })
        .await
    }

    /// Configuration text of a device at a given version.
    pub async fn read(&self, device_id: &str, version_id: &str) -> Result<String, SnapshotError> {
        let root = self.root.clone();
        let file = Self::file_name(device_id)?;
        let device_id = device_id.to_string();
        let version_id = version_id.to_string();
        blocking(move || {
            let repo = Repository::open(&root)?;
            let commit = repo.find_commit(Oid::from_str(&version_id)?)?;
            if commit.message().and_then(message_device) != Some(device_id.as_str()) {
                return Err(SnapshotError::NotFound {
                    device_id,
                    version_id,
                });
            }
            let entry = commit
                .tree()?
                .get_path(Path::new(&file))
                .map_err(|_| SnapshotError::NotFound {
                    device_id,
                    version_id,
                })?;
            let blob = repo.find_blob(entry.id())?;
            Ok(String::from_utf8_lossy(blob.content()).into_owned())
        })
        .await
    }
}

#[async_trait]
impl SnapshotWriter for GitSnapshotStore {
    async fn commit(
        &self,
        device_id: &str,
        config: &str,
        job_id: &str,
    ) -> Result<String, SnapshotError> {
        let file = Self::file_name(device_id)?;
        let lock = self.device_lock(&file);

        let result = {
            let _device_guard = lock.lock().await;

            let root = self.root.clone();
            let repo_lock = self.repo_lock.clone();
            let path = file.clone();
            let config = config.to_string();
            let message = commit_message(device_id, job_id);

            blocking(move || {
                let repo = {
                    let _guard = repo_lock.lock().unwrap_or_else(|p| p.into_inner());
                    open_or_init(&root)?
                };

                std::fs::write(root.join(&path), config.as_bytes())?;

                let _guard = repo_lock.lock().unwrap_or_else(|p| p.into_inner());
                commit_file(&repo, Path::new(&path), &message)
            })
            .await
        };
        drop(lock);
        self.release_device_lock(&file);

        let version = result?;

        debug!("snapshot {} committed for device {}", version, device_id);
        Ok(version)
    }
}

fn open_or_init(root: &Path) -> Result<Repository, SnapshotError> {
    match Repository::open(root) {
        Ok(repo) => Ok(repo),
        Err(e) if e.code() == ErrorCode::NotFound => {
            std::fs::create_dir_all(root)?;
            debug!("initialising snapshot repository at {}", root.display());
            Ok(Repository::init(root)?)
        }
        Err(e) => Err(e.into()),
    }
}

fn commit_file(repo: &Repository, file: &Path, message: &str) -> Result<String, SnapshotError> {
    let mut index = repo.index()?;
    index.read(true)?;
    index.add_path(file)?;
    index.write()?;

    let tree = repo.find_tree(index.write_tree()?)?;
    let sig = repo
        .signature()
        .or_else(|_| Signature::now("confvault", "confvault@localhost"))?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
    Ok(oid.to_string())
}

async fn blocking<T, F>(f: F) -> Result<T, SnapshotError>
where
    F: FnOnce() -> Result<T, SnapshotError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SnapshotError::Worker(e.to_string()))?
}
