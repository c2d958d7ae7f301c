//! Tenaz CLI: inspect, validate and probe resilient element locators
//!
//! ## Usage
//!
//! ```bash
//! tenaz init                                  # Write a starter tenaz.yaml
//! tenaz config --validate                     # Check the run configuration
//! tenaz targets                               # List candidate chains
//! tenaz parse 'role=button[name="Login"]'     # Normalize a selector
//! tenaz probe --url /login --target email     # Resolve against a live page
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, ConfigFormat, InitArgs, ParseArgs, ProbeArgs,
    ProbeFormat, ProbeTarget, TargetsArgs,
};
pub use config::{log_level, CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
