//! # Overlay Render CLI
//!
//! This is the binary entry point for the `overlay-render` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Installing the `env_logger` backend for the library's `log` output.
//! - Executing the appropriate command and reporting top-level errors.
//!
//! The rendering logic lives in the `overlay_render` library crate; the binary
//! is a thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
