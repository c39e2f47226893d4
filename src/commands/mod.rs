//! # CLI Command Implementations
//!
//! Each subcommand of `overlay-render` lives in its own file with an `Args`
//! struct derived using `clap` and an `execute` function that calls into the
//! `overlay_render` library.

pub mod completions;
pub mod render;
