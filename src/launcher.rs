//! PATH resolution and detached process launch
//!
//! A launched job is a fully independent OS process in its own process
//! group: it inherits the coordinator's environment and working directory,
//! with one override naming the GPU it may see.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use thiserror::Error;
use tracing::info;

use crate::store::QueueEntry;

/// Environment variable restricting a job to its assigned device
pub const DEVICE_ENV: &str = "CUDA_VISIBLE_DEVICES";

/// Launch failures; the scheduler drops the job and keeps going either way
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("executable '{name}' not found on PATH")]
    NotFound { name: String },

    #[error("failed to spawn '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A job running on one slot
#[derive(Debug)]
pub struct RunningJob {
    /// Handle used for non-blocking exit polling
    pub child: Child,
    /// Argument vector the job was launched with
    pub args: Vec<String>,
    /// Queue id, for logging
    pub id: u64,
}

/// Resolve an executable name against the PATH in effect right now
///
/// Names containing a path separator are taken as explicit candidates and
/// skip the search.
pub fn resolve_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|full| is_executable(full))
}

/// Spawn a queue entry as a detached process bound to one device index
pub fn launch(entry: &QueueEntry, device_index: usize) -> Result<RunningJob, LaunchError> {
    let name = entry.args.first().cloned().unwrap_or_default();
    let resolved = resolve_executable(&name).ok_or_else(|| LaunchError::NotFound { name: name.clone() })?;

    info!(id = entry.id, args = ?entry.args, device = device_index, "launching job");

    let mut cmd = Command::new(&resolved);
    cmd.args(&entry.args[1..])
        .env(DEVICE_ENV, device_index.to_string());
    detach(&mut cmd);

    let child = cmd.spawn().map_err(|source| LaunchError::Spawn { name, source })?;

    Ok(RunningJob {
        child,
        args: entry.args.clone(),
        id: entry.id,
    })
}

/// Put the spawned process in its own process group so it is decoupled from
/// the coordinator and from the shell the coordinator itself detached from
pub(crate) fn detach(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
