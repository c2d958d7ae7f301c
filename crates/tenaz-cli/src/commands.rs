//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tenaz: inspect, validate and probe resilient element locators
#[derive(Parser, Debug)]
#[command(name = "tenaz")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Run configuration file (.yaml, .yml or .json)
    #[arg(short, long, env = "TENAZ_CONFIG", default_value = "tenaz.yaml", global = true)]
    pub config: PathBuf,

    /// Override `use.base_url` from the configuration
    #[arg(long, env = "TENAZ_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter tenaz.yaml
    Init(InitArgs),

    /// Load, validate and print the effective configuration
    Config(ConfigArgs),

    /// List named targets and indicator sets with their candidate chains
    Targets(TargetsArgs),

    /// Parse selector expressions and print their normalized form
    Parse(ParseArgs),

    /// Resolve a locator against a live page (exit 0 found, 1 not found, 2 error)
    Probe(ProbeArgs),
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to write tenaz.yaml into
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Only validate; print nothing but the verdict
    #[arg(long)]
    pub validate: bool,

    /// Output format
    #[arg(long, default_value = "yaml")]
    pub format: ConfigFormat,
}

/// Configuration output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    #[default]
    Yaml,
    /// JSON
    Json,
}

/// Arguments for the targets command
#[derive(Parser, Debug)]
pub struct TargetsArgs {
    /// Only show this target or indicator set
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Arguments for the parse command
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Selector expressions (e.g. 'role=button[name="Login"]')
    #[arg(required = true)]
    pub selectors: Vec<String>,

    /// Also print the browser-side query expression
    #[arg(long)]
    pub js: bool,
}

/// What to probe for
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ProbeTarget {
    /// Named target (or indicator set with --any) from the configuration
    #[arg(short, long)]
    pub target: Option<String>,

    /// Inline candidates in priority order (one group each with --any)
    #[arg(long = "candidate", num_args = 1..)]
    pub candidates: Vec<String>,
}

/// Arguments for the probe command
#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// Page to open (relative paths are joined to the base URL)
    #[arg(short, long)]
    pub url: String,

    /// Target selection
    #[command(flatten)]
    pub what: ProbeTarget,

    /// Treat the target as an any-of indicator set
    #[arg(long)]
    pub any: bool,

    /// Required state, comma separated (attached, visible, enabled, editable, checked, unchecked)
    #[arg(long)]
    pub state: Option<String>,

    /// Budget in milliseconds (per group with --any)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Project to launch (default: first configured)
    #[arg(short, long)]
    pub project: Option<String>,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ProbeFormat,
}

/// Probe output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

/// Color argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
