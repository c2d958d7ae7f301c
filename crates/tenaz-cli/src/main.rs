//! Tenaz CLI entry point

use clap::Parser;
use std::process::ExitCode;
use tenaz_cli::{
    handlers, log_level, Cli, CliConfig, CliResult, ColorChoice, Commands, ProbeArgs,
    ProgressReporter, Verbosity,
};
use tracing_subscriber::EnvFilter;

/// Probe ran but nothing was found
#[cfg(feature = "browser")]
const EXIT_NOT_FOUND: u8 = 1;
/// Browser, page or navigation failure
const EXIT_ENVIRONMENT: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = build_config(&cli);
    let mut reporter = ProgressReporter::new(config.color.should_color(), config.verbosity);

    match run(cli.command, &config, &mut reporter) {
        Ok(code) => code,
        Err(e) => {
            reporter.failure(&e.to_string());
            if e.is_environment() {
                ExitCode::from(EXIT_ENVIRONMENT)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = log_level(cli.quiet, cli.verbose);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_config_path(cli.config.clone())
        .with_base_url(cli.base_url.clone())
}

fn run(command: Commands, config: &CliConfig, reporter: &mut ProgressReporter) -> CliResult<ExitCode> {
    match command {
        Commands::Init(args) => {
            let path = handlers::execute_init(config, &args)?;
            reporter.success(&format!("Created {}", path.display()));
        }
        Commands::Config(args) => {
            let out = handlers::execute_config(config, &args)?;
            if args.validate {
                reporter.success(&out);
            } else {
                print!("{out}");
            }
        }
        Commands::Targets(args) => print!("{}", handlers::execute_targets(config, &args)?),
        Commands::Parse(args) => print!("{}", handlers::execute_parse(&args)?),
        Commands::Probe(args) => return run_probe(config, &args, reporter),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "browser")]
fn run_probe(
    config: &CliConfig,
    args: &ProbeArgs,
    reporter: &mut ProgressReporter,
) -> CliResult<ExitCode> {
    let outcome = handlers::execute_probe(config, args, reporter)?;
    match args.format {
        tenaz_cli::ProbeFormat::Text => print!("{}", outcome.render_text()),
        tenaz_cli::ProbeFormat::Json => println!("{}", outcome.render_json()?),
    }
    if outcome.found {
        Ok(ExitCode::SUCCESS)
    } else {
        reporter.warning(&format!("`{}` not found on {}", outcome.target, outcome.url));
        Ok(ExitCode::from(EXIT_NOT_FOUND))
    }
}

#[cfg(not(feature = "browser"))]
fn run_probe(
    _config: &CliConfig,
    _args: &ProbeArgs,
    _reporter: &mut ProgressReporter,
) -> CliResult<ExitCode> {
    Err(tenaz_cli::CliError::config(
        "probe needs a browser; rebuild with --features browser",
    ))
}
