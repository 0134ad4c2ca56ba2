//! Command-line interface for neighbor.
//!
//! Provides the `run` command plus run-file loading.

mod commands;
mod run_file;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, RunArgs};
pub use run_file::RunFile;
