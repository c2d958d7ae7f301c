//! Output formatting and progress reporting

use crate::config::Verbosity;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Status lines and the probe spinner, written to stderr
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    spinner: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Output verbosity
    pub verbosity: Verbosity,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, Verbosity::Normal)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, verbosity: Verbosity) -> Self {
        Self {
            term: Term::stderr(),
            spinner: None,
            use_color,
            verbosity,
        }
    }

    /// Spinner is off when quiet and when log lines would interleave with it
    fn shows_spinner(&self) -> bool {
        !self.verbosity.is_quiet() && !self.verbosity.is_verbose()
    }

    /// Start a spinner while waiting on the page
    pub fn start_spinner(&mut self, message: &str) {
        if !self.shows_spinner() || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(message.to_string());
        self.spinner = Some(pb);
    }

    /// Update spinner message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.spinner {
            pb.set_message(message.to_string());
        }
    }

    /// Clear the spinner
    pub fn finish(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.verbosity.is_quiet() {
            return;
        }
        self.line(&self.prefix("✓", "PASS", Tone::Good), message);
    }

    /// Print a failure message (also in quiet mode)
    pub fn failure(&self, message: &str) {
        self.line(&self.prefix("✗", "FAIL", Tone::Bad), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity.is_quiet() {
            return;
        }
        self.line(&self.prefix("⚠", "WARN", Tone::Warn), message);
    }

    fn prefix(&self, symbol: &str, plain: &str, tone: Tone) -> String {
        if !self.use_color {
            return plain.to_string();
        }
        let styled = style(symbol).bold();
        match tone {
            Tone::Good => styled.green(),
            Tone::Bad => styled.red(),
            Tone::Warn => styled.yellow(),
        }
        .to_string()
    }

    fn line(&self, prefix: &str, message: &str) {
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }
}

#[derive(Debug, Clone, Copy)]
enum Tone {
    Good,
    Bad,
    Warn,
}
