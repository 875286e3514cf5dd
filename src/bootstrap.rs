//! Detached relaunch and coordinator election
//!
//! Every invocation runs this sequence exactly once. The shell-facing
//! process does nothing but re-exec itself with a private marker argument in
//! a new process group and exit 0, so the rest of the tool always runs
//! decoupled from the invoking terminal. The detached phase then either
//! claims the store and becomes the coordinator, or enqueues and exits.

use std::process::Command;

use eyre::{Context, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::coordinator::{Coordinator, TeardownGuard};
use crate::devices;
use crate::launcher;
use crate::store::QueueStore;

/// Private marker distinguishing the detached re-exec from the original
/// shell-facing invocation. Stripped before anything else looks at the
/// argument vector, so it can never leak into a job's argv.
pub const RELAUNCH_MARKER: &str = "--gpuq-detached-f3a9";

/// Re-exec the current binary with the marker appended, detached from the
/// invoking shell
///
/// Stdio stays inherited: the detached process still prints the assigned
/// job id to the caller's terminal.
pub fn relaunch_detached(args: &[String]) -> Result<()> {
    let exe = std::env::current_exe().context("failed to resolve current executable")?;

    let mut cmd = Command::new(&exe);
    cmd.args(args).arg(RELAUNCH_MARKER);
    launcher::detach(&mut cmd);

    cmd.spawn().context("failed to spawn detached gpuq process")?;
    debug!("relaunched detached, shell-facing process exiting");
    Ok(())
}

/// The detached phase: elect a coordinator or enqueue as a client
///
/// `job_args` is the caller's argument vector with the program name and the
/// relaunch marker already removed.
pub fn run(config: &Config, job_args: &[String]) -> Result<()> {
    let store = QueueStore::new(&config.queue_file, &config.lock_file);

    // Files present means a coordinator is presumably alive; the exclusive
    // create inside try_claim settles simultaneous elections
    if store.is_initialized() || !store.try_claim()? {
        return enqueue_and_exit(&store, job_args);
    }

    // We own the store from here on, whatever happens below
    let _teardown = TeardownGuard::new(store.clone());

    if !job_args.is_empty() {
        let id = store.enqueue(job_args)?;
        println!("enqueued id {}", id);
    }

    let device_count = devices::detect_device_count(config)?;
    info!(
        devices = device_count,
        pid = std::process::id(),
        "initializing queue coordinator"
    );

    let dropped = Coordinator::new(store, device_count, config.poll_interval()).run()?;
    if dropped > 0 {
        return Err(eyre::eyre!("dropped {} job(s) whose executable could not be launched", dropped));
    }
    Ok(())
}

fn enqueue_and_exit(store: &QueueStore, job_args: &[String]) -> Result<()> {
    if job_args.is_empty() {
        debug!("nothing to enqueue");
        return Ok(());
    }

    let id = store.enqueue(job_args)?;
    println!("enqueued id {}", id);
    Ok(())
}

/// Remove every occurrence of the relaunch marker from an argument vector
pub fn strip_marker(args: &mut Vec<String>) -> bool {
    let had_marker = args.iter().any(|a| a == RELAUNCH_MARKER);
    args.retain(|a| a != RELAUNCH_MARKER);
    had_marker
}
