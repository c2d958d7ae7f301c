//! Config command handler

use crate::commands::ConfigFormat;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::ConfigArgs;
use tenaz::RunConfig;
use tracing::debug;

/// Load the run configuration named on the command line, applying overrides
pub fn load_run_config(config: &CliConfig) -> CliResult<RunConfig> {
    let mut run = RunConfig::load(&config.config_path)?;
    if let Some(base_url) = &config.base_url {
        debug!(%base_url, "base URL overridden");
        run.use_options.base_url = Some(base_url.clone());
    }
    Ok(run)
}

/// Serialize the effective configuration
pub fn render_config(run: &RunConfig, format: ConfigFormat) -> CliResult<String> {
    let text = match format {
        ConfigFormat::Yaml => run.to_yaml()?,
        ConfigFormat::Json => run.to_json()?,
    };
    Ok(text)
}

/// Execute the config command
pub fn execute_config(config: &CliConfig, args: &ConfigArgs) -> CliResult<String> {
    let run = load_run_config(config)?;
    if args.validate {
        return Ok(format!(
            "{} is valid ({} targets, {} indicator sets, {} projects)",
            config.config_path.display(),
            run.targets.len(),
            run.indicators.len(),
            run.projects.len()
        ));
    }
    render_config(&run, args.format)
}
