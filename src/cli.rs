//! CLI surface
//!
//! gpuq deliberately has no flags or subcommands: the entire trailing
//! argument vector is the job to enqueue, passed through verbatim, so any
//! token gpuq claimed for itself would shadow an executable of the same name.

use clap::Parser;

/// gpuq - enqueue a command to run on the next free GPU
#[derive(Debug, Parser)]
#[command(
    name = "gpuq",
    about = "Enqueue a command to run on the next free GPU",
    version,
    after_help = "Logs are written to: ~/.local/share/gpuq/logs/gpuq.log"
)]
pub struct Cli {
    /// Command to enqueue (executable followed by its arguments)
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}
