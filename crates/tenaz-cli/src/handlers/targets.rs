//! Targets command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::handlers::config::load_run_config;
use crate::TargetsArgs;
use std::fmt::Write as _;
use tenaz::{RunConfig, TenazError};

/// List named targets and indicator sets, optionally just one
pub fn render_targets(run: &RunConfig, only: Option<&str>) -> CliResult<String> {
    if let Some(name) = only {
        if !run.targets.contains_key(name) && !run.indicators.contains_key(name) {
            return Err(TenazError::UnknownTarget {
                name: name.to_string(),
            }
            .into());
        }
    }
    let wanted = |name: &str| only.is_none_or(|n| n == name);

    let mut out = String::new();
    let targets: Vec<_> = run.targets.keys().filter(|n| wanted(n)).collect();
    if !targets.is_empty() {
        out.push_str("targets:\n");
        for name in targets {
            let locator = run.target(name)?;
            let _ = writeln!(out, "  {name}");
            for (i, candidate) in locator.candidates().iter().enumerate() {
                let _ = writeln!(out, "    [{i}] {candidate}");
            }
        }
    }

    let sets: Vec<_> = run.indicators.keys().filter(|n| wanted(n)).collect();
    if !sets.is_empty() {
        out.push_str("indicators:\n");
        for name in sets {
            let set = run.indicator(name)?;
            let _ = writeln!(out, "  {name} (any of {})", set.groups().len());
            for (i, group) in set.groups().iter().enumerate() {
                let _ = writeln!(out, "    [{i}] {}", group.chain_string());
            }
        }
    }

    if out.is_empty() {
        out.push_str("no targets or indicator sets configured\n");
    }
    Ok(out)
}

/// Execute the targets command
pub fn execute_targets(config: &CliConfig, args: &TargetsArgs) -> CliResult<String> {
    let run = load_run_config(config)?;
    render_targets(&run, args.name.as_deref())
}
