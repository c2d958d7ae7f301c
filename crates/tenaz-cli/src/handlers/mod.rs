//! Command handlers - extracted from main.rs for testability
//!
//! Handlers return the text they would print; `main` decides where it goes.

pub mod config;
pub mod init;
pub mod parse;
pub mod probe;
pub mod targets;

pub use config::{execute_config, load_run_config, render_config};
pub use init::{execute_init, init_target};
pub use parse::{execute_parse, render_selector};
#[cfg(feature = "browser")]
pub use probe::execute_probe;
pub use probe::{build_probe_plan, run_probe, ProbeKind, ProbeOutcome, ProbePlan};
pub use targets::{execute_targets, render_targets};
