//! Slot pool and scheduler loop
//!
//! The coordinator owns a fixed pool of execution slots, one per GPU, and
//! runs a single-threaded polling loop: reap finished jobs, assign free
//! slots from the queue, sleep when no further progress is possible. It
//! terminates, deleting both store files, the moment it observes the queue
//! empty; launched jobs are detached and keep running on their own.

use std::thread;
use std::time::Duration;

use eyre::Result;
use tracing::{info, warn};

use crate::launcher::{self, RunningJob};
use crate::store::QueueStore;

/// One execution slot, either free or holding a running job
///
/// A single tagged array of these is the whole scheduling state; the slot
/// index doubles as the device index handed to the job.
#[derive(Debug)]
pub enum Slot {
    Free,
    Occupied(RunningJob),
}

impl Slot {
    /// Whether this slot can take a job
    pub fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

/// Deletes the store files when dropped
///
/// Established right after the coordinator claims the store, so teardown
/// happens on every exit path: normal drain, startup failure, panic.
pub struct TeardownGuard {
    store: QueueStore,
}

impl TeardownGuard {
    pub fn new(store: QueueStore) -> Self {
        Self { store }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if let Err(e) = self.store.reset() {
            warn!(error = %e, "failed to tear down queue files");
        }
    }
}

/// The scheduler: a slot pool fed from the shared queue store
pub struct Coordinator {
    store: QueueStore,
    slots: Vec<Slot>,
    interval: Duration,
}

impl Coordinator {
    /// Create a coordinator with `device_count` slots, all free
    pub fn new(store: QueueStore, device_count: usize, interval: Duration) -> Self {
        let slots = (0..device_count).map(|_| Slot::Free).collect();
        Self { store, slots, interval }
    }

    /// Number of slots currently occupied
    pub fn running_jobs(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_free()).count()
    }

    /// Run the scheduler loop until the queue drains
    ///
    /// The only success path is termination: an empty pop means the backlog
    /// is gone, so the store files are deleted and the coordinator exits.
    /// Jobs still running at that point are detached and unaffected.
    ///
    /// Returns the number of jobs dropped because their executable could not
    /// be resolved or spawned.
    pub fn run(&mut self) -> Result<usize> {
        let mut dropped = 0;

        loop {
            self.reap();

            while let Some(idx) = self.lowest_free_slot() {
                let Some((entry, remaining)) = self.store.pop_front()? else {
                    info!("queue is empty, shutting down");
                    self.store.reset()?;
                    return Ok(dropped);
                };

                match launcher::launch(&entry, idx) {
                    Ok(job) => self.slots[idx] = Slot::Occupied(job),
                    // Drop-and-continue: the entry is already popped and
                    // there is no caller left to report to
                    Err(e) => {
                        warn!(id = entry.id, error = %e, "dropping job");
                        dropped += 1;
                    }
                }

                if remaining == 0 {
                    break;
                }
            }

            thread::sleep(self.interval);
        }
    }

    /// Free every slot whose process has exited, logging the exit code
    fn reap(&mut self) {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let Slot::Occupied(job) = slot else { continue };

            match job.child.try_wait() {
                Ok(Some(status)) => {
                    info!(id = job.id, code = ?status.code(), device = idx, "job finished");
                    *slot = Slot::Free;
                }
                Ok(None) => {}
                Err(e) => {
                    // Can't poll it, can't hold the device forever
                    warn!(id = job.id, error = %e, device = idx, "failed to poll job, freeing slot");
                    *slot = Slot::Free;
                }
            }
        }
    }

    /// Lowest-indexed free slot, if any (stable tie-break)
    fn lowest_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Slot::is_free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> QueueStore {
        QueueStore::new(temp.path().join("queue.json"), temp.path().join("queue.json.lock"))
    }

    fn claimed_store(temp: &TempDir) -> QueueStore {
        let store = store_in(temp);
        assert!(store.try_claim().unwrap());
        store
    }

    fn sh_job(script: String) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script]
    }

    fn wait_for_file(path: &std::path::Path) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(content) = fs::read_to_string(path) {
                if !content.is_empty() {
                    return content;
                }
            }
            assert!(Instant::now() < deadline, "file {} never appeared", path.display());
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_empty_queue_terminates_and_removes_files() {
        let temp = TempDir::new().unwrap();
        let store = claimed_store(&temp);

        let mut coordinator = Coordinator::new(store.clone(), 2, Duration::from_millis(10));
        coordinator.run().unwrap();

        assert!(!store.is_initialized());
        assert!(!store.queue_path().exists());
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn test_jobs_run_with_exclusive_devices() {
        let temp = TempDir::new().unwrap();
        let store = claimed_store(&temp);

        for i in 0..2 {
            let out = temp.path().join(format!("job{}.out", i));
            store
                .enqueue(&sh_job(format!("echo $CUDA_VISIBLE_DEVICES > {}", out.display())))
                .unwrap();
        }

        let mut coordinator = Coordinator::new(store, 2, Duration::from_millis(10));
        coordinator.run().unwrap();

        let dev0 = wait_for_file(&temp.path().join("job0.out"));
        let dev1 = wait_for_file(&temp.path().join("job1.out"));
        assert_eq!(dev0.trim(), "0");
        assert_eq!(dev1.trim(), "1");
    }

    #[test]
    fn test_single_slot_runs_jobs_in_fifo_order() {
        let temp = TempDir::new().unwrap();
        let store = claimed_store(&temp);
        let order = temp.path().join("order.txt");

        for i in 0..3 {
            store
                .enqueue(&sh_job(format!("echo {} >> {}", i, order.display())))
                .unwrap();
        }

        let mut coordinator = Coordinator::new(store, 1, Duration::from_millis(10));
        coordinator.run().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let lines: Vec<String> = fs::read_to_string(&order)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect();
            if lines.len() == 3 {
                assert_eq!(lines, ["0", "1", "2"]);
                break;
            }
            assert!(Instant::now() < deadline, "jobs never completed");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_unresolvable_executable_is_dropped() {
        let temp = TempDir::new().unwrap();
        let store = claimed_store(&temp);
        let out = temp.path().join("survivor.out");

        store.enqueue(&["gpuq-no-such-binary-xyz".to_string()]).unwrap();
        store.enqueue(&sh_job(format!("echo ok > {}", out.display()))).unwrap();

        // The bogus job must not crash the loop or wedge the slot
        let mut coordinator = Coordinator::new(store.clone(), 1, Duration::from_millis(10));
        let dropped = coordinator.run().unwrap();

        assert_eq!(dropped, 1);
        assert_eq!(wait_for_file(&out).trim(), "ok");
        assert!(!store.is_initialized());
    }

    #[test]
    fn test_teardown_guard_removes_files() {
        let temp = TempDir::new().unwrap();
        let store = claimed_store(&temp);
        assert!(store.is_initialized());

        {
            let _guard = TeardownGuard::new(store.clone());
            // Simulates the coordinator dying before its loop ever runs
        }

        assert!(!store.is_initialized());
    }

    #[test]
    fn test_slot_pool_size_matches_device_count() {
        let temp = TempDir::new().unwrap();
        let store = claimed_store(&temp);

        let coordinator = Coordinator::new(store, 4, Duration::from_millis(10));
        assert_eq!(coordinator.slots.len(), 4);
        assert!(coordinator.slots.iter().all(Slot::is_free));
        assert_eq!(coordinator.running_jobs(), 0);
    }
}
