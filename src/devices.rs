//! GPU detection for sizing the slot pool
//!
//! The device count is resolved once at coordinator startup: an explicit
//! `GPUQ_DEVICES` override wins, then a pinned count from the config file,
//! then an `nvidia-smi` probe. Zero devices is a fatal startup error.

use std::env;
use std::process::Command;

use eyre::{Context, Result};
use tracing::debug;

use crate::config::Config;

/// Environment override for the device count (useful on hosts where
/// nvidia-smi is unavailable, and in tests)
pub const DEVICE_COUNT_ENV: &str = "GPUQ_DEVICES";

/// Number of execution slots the coordinator should manage
pub fn detect_device_count(config: &Config) -> Result<usize> {
    if let Ok(raw) = env::var(DEVICE_COUNT_ENV) {
        let count: usize = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {} value '{}'", DEVICE_COUNT_ENV, raw))?;
        if count == 0 {
            return Err(eyre::eyre!("{} is set but names zero devices", DEVICE_COUNT_ENV));
        }
        debug!(count, "device count from {}", DEVICE_COUNT_ENV);
        return Ok(count);
    }

    if let Some(count) = config.devices {
        if count == 0 {
            return Err(eyre::eyre!("config pins zero devices"));
        }
        debug!(count, "device count from config");
        return Ok(count);
    }

    query_device_count()
}

/// Count GPUs by asking nvidia-smi for one index per line
fn query_device_count() -> Result<usize> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=index", "--format=csv,noheader"])
        .output()
        .context("failed to execute nvidia-smi; ensure NVIDIA drivers are installed")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            return Err(eyre::eyre!("nvidia-smi returned non-zero exit status ({})", output.status));
        }
        return Err(eyre::eyre!("nvidia-smi query failed: {}", stderr));
    }

    let stdout = String::from_utf8(output.stdout).context("nvidia-smi output was not UTF-8")?;
    let count = parse_device_count(&stdout)?;
    if count == 0 {
        return Err(eyre::eyre!("nvidia-smi reported no NVIDIA devices"));
    }

    Ok(count)
}

fn parse_device_count(raw: &str) -> Result<usize> {
    let mut count = 0;
    for (line_idx, raw_line) in raw.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        line.parse::<u32>()
            .with_context(|| format!("unexpected nvidia-smi output at line {}: '{}'", line_idx + 1, line))?;
        count += 1;
    }
    Ok(count)
}
