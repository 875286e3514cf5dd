//! gpuq - Single-host GPU job queue
//!
//! Any shell can run `gpuq <command...>` to append a job to a shared on-disk
//! queue. The first invocation that finds no queue elects itself coordinator:
//! a detached background process that drains the queue onto the machine's
//! GPUs, one job per device, and tears the queue down once it runs dry.
//!
//! # Core Concepts
//!
//! - **One file, one lock**: the queue is a single JSON file; every
//!   read-modify-write cycle holds an exclusive advisory lock on a companion
//!   lock file, across all processes
//! - **Self-electing coordinator**: no daemon to manage; whichever
//!   invocation creates the lock file becomes the coordinator, and the queue
//!   files double as the "coordinator is running" marker
//! - **Detached jobs**: launched processes outlive the coordinator; the only
//!   post-launch interaction is non-blocking exit polling
//!
//! # Modules
//!
//! - [`store`] - Persistent cross-process job queue
//! - [`bootstrap`] - Detached relaunch and coordinator election
//! - [`coordinator`] - Slot pool and scheduler loop
//! - [`launcher`] - PATH resolution and detached process launch
//! - [`devices`] - GPU detection for sizing the slot pool
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod devices;
pub mod launcher;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{Coordinator, Slot, TeardownGuard};
pub use launcher::{LaunchError, RunningJob};
pub use store::{QueueEntry, QueueState, QueueStore};
