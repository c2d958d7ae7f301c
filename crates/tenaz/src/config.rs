//! Run configuration.
//!
//! One file (`tenaz.yaml` or `tenaz.json`) carries the timeouts, artifact
//! policy, browser projects and the named locator chains scenarios use:
//!
//! ```yaml
//! timeout_ms: 30000
//! retries: 1
//! use:
//!   base_url: https://staging.example.com
//!   screenshot: only-on-failure
//!   video: retain-on-failure
//!   trace: on-first-retry
//! projects:
//!   - name: chromium
//!     browser: chromium
//!     device: desktop-chrome
//! targets:
//!   email:
//!     - role=textbox[name=/username|email/i]
//!     - attr=id=email
//! indicators:
//!   admin:
//!     - [text=Admin Panel]
//!     - [text=Manage]
//!     - [role=navigation]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::{BrowserConfig, DeviceDescriptor};
use crate::locator::{IndicatorSet, Locator};
use crate::result::{TenazError, TenazResult};
use crate::wait::{
    RequiredState, ResolveOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PROBE_TIMEOUT_MS,
    DEFAULT_TIMEOUT_MS,
};

/// Default per-attempt scenario timeout (30 seconds)
pub const DEFAULT_SCENARIO_TIMEOUT_MS: u64 = 30_000;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "tenaz.yaml";

/// Starter configuration written by `tenaz init`
pub const STARTER_CONFIG: &str = r"# Tenaz run configuration
test_dir: tests/e2e
timeout_ms: 30000
retries: 0
expect_timeout_ms: 5000
probe_timeout_ms: 500
poll_interval_ms: 50
output_dir: target/tenaz

use:
  base_url: http://localhost:3000
  headless: true
  screenshot: only-on-failure
  video: retain-on-failure
  trace: on-first-retry

projects:
  - name: chromium
    browser: chromium
    device: desktop-chrome

targets:
  email:
    - role=textbox[name=/username|email/i]
    - attr=id=email
  password:
    - label=Password
    - css=input[type=password]
  submit:
    - role=button[name=/log ?in|sign ?in/i]
    - css=button[type=submit]

indicators:
  logged_in:
    - [role=navigation]
    - [text=Dashboard]
    - [text=/welcome/i]
";

// =============================================================================
// ARTIFACT POLICY
// =============================================================================

/// When to capture a screenshot at the end of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenshotMode {
    /// Never
    Off,
    /// Always
    On,
    /// Only when the attempt failed
    #[default]
    OnlyOnFailure,
}

impl ScreenshotMode {
    /// Whether to capture for an attempt with this result
    #[must_use]
    pub const fn should_capture(self, passed: bool) -> bool {
        match self {
            Self::Off => false,
            Self::On => true,
            Self::OnlyOnFailure => !passed,
        }
    }
}

/// Recording policy shared by video and trace capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordMode {
    /// Never record
    #[default]
    Off,
    /// Record and keep every attempt
    On,
    /// Record every attempt, keep failures
    RetainOnFailure,
    /// Record only the first retry (attempt 1)
    OnFirstRetry,
}

/// Video policy
pub type VideoMode = RecordMode;

/// Trace policy
pub type TraceMode = RecordMode;

impl RecordMode {
    /// Whether attempt `attempt` (0 = first run) is recorded at all
    #[must_use]
    pub const fn should_record(self, attempt: u32) -> bool {
        match self {
            Self::Off => false,
            Self::On | Self::RetainOnFailure => true,
            Self::OnFirstRetry => attempt == 1,
        }
    }

    /// Whether a recording of this attempt is kept
    #[must_use]
    pub const fn should_retain(self, passed: bool, attempt: u32) -> bool {
        if !self.should_record(attempt) {
            return false;
        }
        match self {
            Self::RetainOnFailure => !passed,
            Self::Off => false,
            Self::On | Self::OnFirstRetry => true,
        }
    }
}

// =============================================================================
// PROJECTS
// =============================================================================

/// Browser engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// Chromium / Chrome
    #[default]
    Chromium,
    /// Firefox
    Firefox,
    /// WebKit / Safari
    Webkit,
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        };
        write!(f, "{name}")
    }
}

/// Emulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    /// Desktop Chrome
    #[default]
    #[serde(rename = "desktop-chrome")]
    DesktopChrome,
    /// Desktop Firefox
    #[serde(rename = "desktop-firefox")]
    DesktopFirefox,
    /// Desktop Safari
    #[serde(rename = "desktop-safari")]
    DesktopSafari,
    /// Pixel 5
    #[serde(rename = "pixel-5")]
    Pixel5,
    /// iPhone 13
    #[serde(rename = "iphone-13")]
    Iphone13,
}

impl Device {
    /// Viewport, scale, input and user agent for this device
    #[must_use]
    pub const fn descriptor(self) -> DeviceDescriptor {
        match self {
            Self::DesktopChrome => DeviceDescriptor::DESKTOP_CHROME,
            Self::DesktopFirefox => DeviceDescriptor::DESKTOP_FIREFOX,
            Self::DesktopSafari => DeviceDescriptor::DESKTOP_SAFARI,
            Self::Pixel5 => DeviceDescriptor::PIXEL_5,
            Self::Iphone13 => DeviceDescriptor::IPHONE_13,
        }
    }
}

/// A named browser + device combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project name (unique)
    pub name: String,
    /// Browser engine
    #[serde(default)]
    pub browser: BrowserKind,
    /// Emulated device
    #[serde(default)]
    pub device: Device,
}

impl Project {
    /// Create a project
    #[must_use]
    pub fn new(name: impl Into<String>, browser: BrowserKind, device: Device) -> Self {
        Self {
            name: name.into(),
            browser,
            device,
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new("chromium", BrowserKind::Chromium, Device::DesktopChrome)
    }
}

// =============================================================================
// USE OPTIONS
// =============================================================================

/// Options shared by every project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UseOptions {
    /// Base URL relative navigations are joined to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Stored authentication state handed to the driver factory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<PathBuf>,
    /// Run browsers headless
    pub headless: bool,
    /// Screenshot policy
    pub screenshot: ScreenshotMode,
    /// Video policy
    pub video: VideoMode,
    /// Trace policy
    pub trace: TraceMode,
}

impl Default for UseOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            storage_state: None,
            headless: true,
            screenshot: ScreenshotMode::OnlyOnFailure,
            video: RecordMode::RetainOnFailure,
            trace: RecordMode::OnFirstRetry,
        }
    }
}

impl UseOptions {
    /// Join `path` onto `base_url`; absolute URLs pass through
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        match &self.base_url {
            Some(base) if !path.contains("://") => {
                if path.is_empty() {
                    base.clone()
                } else {
                    format!(
                        "{}/{}",
                        base.trim_end_matches('/'),
                        path.trim_start_matches('/')
                    )
                }
            }
            _ => path.to_string(),
        }
    }
}

// =============================================================================
// RUN CONFIG
// =============================================================================

/// Whole run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding scenarios
    pub test_dir: PathBuf,
    /// Per-attempt scenario timeout
    pub timeout_ms: u64,
    /// Retries after a failed attempt
    pub retries: u32,
    /// Budget for required resolutions and expectations
    pub expect_timeout_ms: u64,
    /// Per-group budget inside any-of checks
    pub probe_timeout_ms: u64,
    /// Poll interval
    pub poll_interval_ms: u64,
    /// Artifact root
    pub output_dir: PathBuf,
    /// Shared options
    #[serde(rename = "use")]
    pub use_options: UseOptions,
    /// Browser projects
    pub projects: Vec<Project>,
    /// Named locator chains
    pub targets: BTreeMap<String, Vec<String>>,
    /// Named indicator sets
    pub indicators: BTreeMap<String, Vec<Vec<String>>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_dir: PathBuf::from("tests/e2e"),
            timeout_ms: DEFAULT_SCENARIO_TIMEOUT_MS,
            retries: 0,
            expect_timeout_ms: DEFAULT_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            output_dir: PathBuf::from("target/tenaz"),
            use_options: UseOptions::default(),
            projects: vec![Project::default()],
            targets: BTreeMap::new(),
            indicators: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// Load and validate a config file (`.yaml`/`.yml` or `.json`)
    ///
    /// # Errors
    ///
    /// I/O, parse and validation errors.
    pub fn load(path: &Path) -> TenazResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            other => {
                return Err(TenazError::config(format!(
                    "unsupported config extension {:?} for {}",
                    other.unwrap_or(""),
                    path.display()
                )))
            }
        };
        tracing::debug!(path = %path.display(), projects = config.projects.len(), "loaded run config");
        Ok(config)
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> TenazResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    pub fn from_json_str(json: &str) -> TenazResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> TenazResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> TenazResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// `Config` naming the first problem found.
    pub fn validate(&self) -> TenazResult<()> {
        for (field, value) in [
            ("timeout_ms", self.timeout_ms),
            ("expect_timeout_ms", self.expect_timeout_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(TenazError::config(format!("{field} must be greater than 0")));
            }
        }
        if self.probe_timeout_ms > self.expect_timeout_ms {
            return Err(TenazError::config(format!(
                "probe_timeout_ms ({}) must not exceed expect_timeout_ms ({})",
                self.probe_timeout_ms, self.expect_timeout_ms
            )));
        }

        if self.projects.is_empty() {
            return Err(TenazError::config("at least one project is required"));
        }
        let mut seen = HashSet::new();
        for project in &self.projects {
            if project.name.trim().is_empty() {
                return Err(TenazError::config("project name must not be empty"));
            }
            if !seen.insert(project.name.as_str()) {
                return Err(TenazError::config(format!(
                    "duplicate project name `{}`",
                    project.name
                )));
            }
        }

        for name in self.targets.keys() {
            self.target(name)?;
        }
        for name in self.indicators.keys() {
            self.indicator(name)?;
        }
        Ok(())
    }

    /// Named locator chain
    ///
    /// # Errors
    ///
    /// `UnknownTarget`, or `Config` wrapping a parse failure.
    pub fn target(&self, name: &str) -> TenazResult<Locator> {
        let chain = self
            .targets
            .get(name)
            .ok_or_else(|| TenazError::UnknownTarget {
                name: name.to_string(),
            })?;
        Locator::parse_chain(chain)
            .map(|l| l.named(name))
            .map_err(|e| TenazError::config(format!("target `{name}`: {e}")))
    }

    /// Named indicator set
    ///
    /// # Errors
    ///
    /// `UnknownTarget`, or `Config` wrapping a parse failure.
    pub fn indicator(&self, name: &str) -> TenazResult<IndicatorSet> {
        let groups = self
            .indicators
            .get(name)
            .ok_or_else(|| TenazError::UnknownTarget {
                name: name.to_string(),
            })?;
        IndicatorSet::parse(groups)
            .map(|s| s.named(name))
            .map_err(|e| TenazError::config(format!("indicator set `{name}`: {e}")))
    }

    /// Project by name
    #[must_use]
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Resolver options derived from the configured budgets
    #[must_use]
    pub const fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            state: RequiredState::visible(),
            timeout: Duration::from_millis(self.expect_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            deadline: None,
        }
    }

    /// Per-attempt scenario timeout
    #[must_use]
    pub const fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Launch options for `project`
    #[must_use]
    pub fn browser_config(&self, project: &Project) -> BrowserConfig {
        project
            .device
            .descriptor()
            .to_config()
            .with_headless(self.use_options.headless)
            .with_navigation_timeout(self.scenario_timeout())
    }

    /// Directory artifacts of `scenario` under `project` are written to
    #[must_use]
    pub fn artifact_dir(&self, scenario: &str, project: &str) -> PathBuf {
        self.output_dir
            .join(sanitize_path_segment(scenario))
            .join(sanitize_path_segment(project))
    }
}

/// Replace characters that are awkward in file names with `-`
#[must_use]
pub fn sanitize_path_segment(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-').to_string();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod policy_tests {
        use super::*;

        #[test]
        fn test_screenshot_mode() {
            assert!(!ScreenshotMode::Off.should_capture(false));
            assert!(ScreenshotMode::On.should_capture(true));
            assert!(ScreenshotMode::OnlyOnFailure.should_capture(false));
            assert!(!ScreenshotMode::OnlyOnFailure.should_capture(true));
        }

        #[test]
        fn test_record_modes() {
            assert!(!RecordMode::Off.should_record(0));
            assert!(RecordMode::On.should_retain(true, 0));
            assert!(RecordMode::RetainOnFailure.should_record(0));
            assert!(RecordMode::RetainOnFailure.should_retain(false, 0));
            assert!(!RecordMode::RetainOnFailure.should_retain(true, 2));
            assert!(!RecordMode::OnFirstRetry.should_record(0));
            assert!(RecordMode::OnFirstRetry.should_record(1));
            assert!(RecordMode::OnFirstRetry.should_retain(true, 1));
            assert!(!RecordMode::OnFirstRetry.should_retain(false, 2));
        }

        #[test]
        fn test_mode_names() {
            let m: RecordMode = serde_yaml_ng::from_str("on-first-retry").unwrap();
            assert_eq!(m, RecordMode::OnFirstRetry);
            let s: ScreenshotMode = serde_yaml_ng::from_str("only-on-failure").unwrap();
            assert_eq!(s, ScreenshotMode::OnlyOnFailure);
            let d: Device = serde_yaml_ng::from_str("pixel-5").unwrap();
            assert_eq!(d.descriptor().name, "Pixel 5");
        }
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_starter_config_is_valid() {
            let config = RunConfig::from_yaml_str(STARTER_CONFIG).unwrap();
            assert_eq!(config.timeout_ms, 30_000);
            assert_eq!(config.projects[0].device, Device::DesktopChrome);
            let email = config.target("email").unwrap();
            assert_eq!(email.name(), Some("email"));
            assert_eq!(email.candidates().len(), 2);
            assert_eq!(config.indicator("logged_in").unwrap().groups().len(), 3);
        }

        #[test]
        fn test_minimal_yaml_gets_defaults() {
            let config = RunConfig::from_yaml_str("retries: 2\n").unwrap();
            assert_eq!(config.retries, 2);
            assert_eq!(config.expect_timeout_ms, 5_000);
            assert_eq!(config.output_dir, PathBuf::from("target/tenaz"));
            assert_eq!(config.projects, vec![Project::default()]);
            assert!(config.use_options.headless);
        }

        #[test]
        fn test_load_by_extension() {
            let dir = TempDir::new().unwrap();
            let yaml = dir.path().join("tenaz.yaml");
            std::fs::write(&yaml, STARTER_CONFIG).unwrap();
            let from_yaml = RunConfig::load(&yaml).unwrap();

            let json = dir.path().join("tenaz.json");
            std::fs::write(&json, from_yaml.to_json().unwrap()).unwrap();
            assert_eq!(RunConfig::load(&json).unwrap(), from_yaml);

            let toml = dir.path().join("tenaz.toml");
            std::fs::write(&toml, "").unwrap();
            assert!(matches!(RunConfig::load(&toml), Err(TenazError::Config { .. })));
        }

        #[test]
        fn test_yaml_render_parses_back() {
            let config = RunConfig::from_yaml_str(STARTER_CONFIG).unwrap();
            let again = RunConfig::from_yaml_str(&config.to_yaml().unwrap()).unwrap();
            assert_eq!(again, config);
        }
    }

    mod validation_tests {
        use super::*;

        fn err(yaml: &str) -> String {
            RunConfig::from_yaml_str(yaml).unwrap_err().to_string()
        }

        #[test]
        fn test_rejects_zero_and_inverted_timeouts() {
            assert!(err("timeout_ms: 0").contains("timeout_ms must be greater than 0"));
            assert!(err("expect_timeout_ms: 100\nprobe_timeout_ms: 200")
                .contains("must not exceed expect_timeout_ms"));
        }

        #[test]
        fn test_rejects_bad_projects() {
            assert!(err("projects: []").contains("at least one project"));
            assert!(err("projects:\n  - name: a\n  - name: a\n").contains("duplicate project name `a`"));
        }

        #[test]
        fn test_rejects_bad_targets() {
            assert!(err("targets:\n  email: []\n").contains("target `email`"));
            assert!(err("targets:\n  email: ['role=']\n").contains("Invalid selector"));
            assert!(err("indicators:\n  admin: [[]]\n").contains("indicator set `admin`"));
        }

        #[test]
        fn test_unknown_target() {
            let config = RunConfig::default();
            assert!(matches!(
                config.target("nope"),
                Err(TenazError::UnknownTarget { .. })
            ));
        }
    }

    mod derived_tests {
        use super::*;

        #[test]
        fn test_resolve_options_from_budgets() {
            let config = RunConfig::from_yaml_str(
                "expect_timeout_ms: 8000\nprobe_timeout_ms: 250\npoll_interval_ms: 100\n",
            )
            .unwrap();
            let opts = config.resolve_options();
            assert_eq!(opts.timeout, Duration::from_millis(8_000));
            assert_eq!(opts.probe_timeout, Duration::from_millis(250));
            assert_eq!(opts.poll_interval, Duration::from_millis(100));
        }

        #[test]
        fn test_url_for() {
            let mut opts = UseOptions::default();
            assert_eq!(opts.url_for("/login"), "/login");
            opts.base_url = Some("https://app.example.com/".into());
            assert_eq!(opts.url_for("/login"), "https://app.example.com/login");
            assert_eq!(opts.url_for("users/invite"), "https://app.example.com/users/invite");
            assert_eq!(opts.url_for(""), "https://app.example.com/");
            assert_eq!(opts.url_for("https://other.example/x"), "https://other.example/x");
        }

        #[test]
        fn test_browser_config_for_project() {
            let mut config = RunConfig::default();
            config.use_options.headless = false;
            let project = Project::new("mobile", BrowserKind::Chromium, Device::Iphone13);
            let bc = config.browser_config(&project);
            assert!(!bc.headless);
            assert!(bc.is_mobile);
            assert_eq!(bc.viewport_width, 390);
            assert_eq!(bc.navigation_timeout, Duration::from_secs(30));
        }

        #[test]
        fn test_artifact_dir_sanitizes() {
            let config = RunConfig::default();
            assert_eq!(
                config.artifact_dir("Login with Remember Me!", "Desktop Chrome"),
                PathBuf::from("target/tenaz/login-with-remember-me/desktop-chrome")
            );
        }
    }
}
