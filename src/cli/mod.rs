//! Command Line Interface (CLI) layer for s2harvest.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration glue (`runner`) that merges a config file with
//! command-line flags and hands the result to `s2harvest::api`.
//!
//! If you are embedding s2harvest into another application, prefer using
//! the high-level `s2harvest::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
