//! Persistent cross-process job queue
//!
//! The queue is one JSON file plus a companion lock file. Every logical
//! operation runs the full acquire -> read -> mutate -> write -> release
//! cycle under an exclusive advisory lock, so no process ever observes a
//! partial update. The whole file is read and rewritten on every mutation;
//! there is no incremental format.
//!
//! A missing or unparsable queue file is never repaired: it loads as the
//! empty store and the next write replaces it, losing any pending entries.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One queued job: `args[0]` is the executable name, resolved against PATH
/// at launch time, not at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Monotonic job id, assigned at enqueue
    pub id: u64,
    /// Full argument vector, passed to the job verbatim
    pub args: Vec<String>,
}

/// On-disk queue state
///
/// Invariant: every id in `queue` is `< last_id`, ids are unique and
/// strictly increasing in queue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    /// Next id to assign; only ever incremented
    pub last_id: u64,
    /// Pending jobs in FIFO order
    pub queue: Vec<QueueEntry>,
}

/// Handle on the shared queue files
///
/// Cheap to clone; holds no open file descriptors between operations.
#[derive(Debug, Clone)]
pub struct QueueStore {
    queue_path: PathBuf,
    lock_path: PathBuf,
}

/// RAII guard for the exclusive advisory lock
///
/// The lock is released on drop; the OS also releases it if the holder dies.
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(error = %e, "failed to release queue lock");
        }
    }
}

impl QueueStore {
    /// Create a store handle for the given queue and lock file paths
    pub fn new(queue_path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            queue_path: queue_path.into(),
            lock_path: lock_path.into(),
        }
    }

    /// Path of the queue file
    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    /// Path of the lock file
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Whether both store files exist
    ///
    /// Their presence is the "a coordinator is running" marker checked by
    /// every invocation at startup.
    pub fn is_initialized(&self) -> bool {
        self.queue_path.exists() && self.lock_path.exists()
    }

    /// Try to claim coordinatorship by creating the lock file exclusively
    ///
    /// Clears any stale files first, then creates the lock file with an
    /// atomic exclusive create and writes the empty queue. When two
    /// invocations race, exactly one create succeeds; the loser gets
    /// `Ok(false)` and must fall back to enqueueing as a client.
    pub fn try_claim(&self) -> Result<bool> {
        self.reset().context("failed to clear stale queue files")?;

        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory {}", parent.display()))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&self.lock_path) {
            Ok(_) => {
                self.write_state(&QueueState::default())?;
                debug!(path = %self.queue_path.display(), "claimed queue store");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("lost claim race, another coordinator won");
                Ok(false)
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to create lock file {}", self.lock_path.display()))
            }
        }
    }

    /// Append a job to the tail of the queue, returning its assigned id
    pub fn enqueue(&self, args: &[String]) -> Result<u64> {
        let _lock = self.acquire_lock()?;
        let mut state = self.read_state();

        let id = state.last_id;
        state.last_id += 1;
        state.queue.push(QueueEntry {
            id,
            args: args.to_vec(),
        });

        self.write_state(&state)?;
        debug!(id, "enqueued job");
        Ok(id)
    }

    /// Remove and return the head of the queue plus the post-pop length
    ///
    /// Returns `None` without touching the file when the queue is empty. A
    /// popped entry is gone from durable state whether or not its launch
    /// later succeeds.
    pub fn pop_front(&self) -> Result<Option<(QueueEntry, usize)>> {
        let _lock = self.acquire_lock()?;
        let mut state = self.read_state();

        if state.queue.is_empty() {
            return Ok(None);
        }

        let entry = state.queue.remove(0);
        let remaining = state.queue.len();
        self.write_state(&state)?;
        debug!(id = entry.id, remaining, "popped job");
        Ok(Some((entry, remaining)))
    }

    /// Read the current queue state under the lock
    pub fn snapshot(&self) -> Result<QueueState> {
        let _lock = self.acquire_lock()?;
        Ok(self.read_state())
    }

    /// Delete both store files
    ///
    /// Best-effort teardown: a file that is already gone is fine, any other
    /// I/O error propagates rather than being masked.
    pub fn reset(&self) -> Result<()> {
        remove_if_present(&self.lock_path)?;
        remove_if_present(&self.queue_path)?;
        Ok(())
    }

    /// Block until the exclusive advisory lock is held
    fn acquire_lock(&self) -> Result<StoreLock> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("failed to open lock file {}", self.lock_path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", self.lock_path.display()))?;

        Ok(StoreLock { file })
    }

    /// Load the queue state; missing or unparsable files load as empty
    fn read_state(&self) -> QueueState {
        match fs::read_to_string(&self.queue_path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(error = %e, path = %self.queue_path.display(), "queue file unparsable, treating as empty");
                    QueueState::default()
                }
            },
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(error = %e, path = %self.queue_path.display(), "queue file unreadable, treating as empty");
                }
                QueueState::default()
            }
        }
    }

    /// Replace the whole queue file contents
    fn write_state(&self, state: &QueueState) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("failed to serialize queue state")?;
        fs::write(&self.queue_path, json)
            .with_context(|| format!("failed to write queue file {}", self.queue_path.display()))
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
