//! Scenario runner.
//!
//! Runs each [`Scenario`] once per configured project: a fresh driver from
//! the [`DriverFactory`], the body inside [`Session::scope`] with the
//! per-attempt timeout, up to `retries` more attempts on failure, and the
//! artifact policy applied to every attempt. Screenshots and traces land in
//! `output_dir/<scenario>/<project>/`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Project, RunConfig};
use crate::driver::{BoxedDriver, BrowserConfig};
use crate::result::TenazResult;
use crate::session::{ScopeOutcome, Session};
use crate::trace::TraceLog;

/// Everything a factory needs to open a driver for one attempt
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Project being run
    pub project: Project,
    /// Launch options derived from the project's device
    pub browser: BrowserConfig,
    /// Stored authentication state to load
    pub storage_state: Option<PathBuf>,
    /// Directory to record video into, when the video policy records this attempt
    pub record_video: Option<PathBuf>,
    /// Attempt number (0 = first run)
    pub attempt: u32,
}

/// Opens a fresh driver per attempt
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Open a driver for `request`
    async fn open(&self, request: &LaunchRequest) -> TenazResult<BoxedDriver>;
}

#[async_trait]
impl<F> DriverFactory for F
where
    F: Fn(&LaunchRequest) -> TenazResult<BoxedDriver> + Send + Sync,
{
    async fn open(&self, request: &LaunchRequest) -> TenazResult<BoxedDriver> {
        self(request)
    }
}

/// Scenario body signature
pub type ScenarioFn =
    dyn for<'s> Fn(&'s mut Session<BoxedDriver>) -> BoxFuture<'s, TenazResult<()>> + Send + Sync;

/// A named scenario
#[derive(Clone)]
pub struct Scenario {
    name: String,
    body: Arc<ScenarioFn>,
}

impl Scenario {
    /// Create a scenario from an async body
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: for<'s> Fn(&'s mut Session<BoxedDriver>) -> BoxFuture<'s, TenazResult<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    /// Scenario name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Result of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptReport {
    /// Attempt number (0 = first run)
    pub attempt: u32,
    /// Whether the body succeeded
    pub passed: bool,
    /// Error text for failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Body duration
    pub duration_ms: u64,
    /// Saved screenshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
    /// Saved trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<PathBuf>,
    /// Kept video directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<PathBuf>,
}

/// Final status of a scenario on one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    /// First attempt passed
    Passed,
    /// Passed after at least one failed attempt
    Flaky,
    /// Every attempt failed
    Failed,
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Flaky => "flaky",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One scenario on one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: String,
    /// Project name
    pub project: String,
    /// Final status
    pub status: ScenarioStatus,
    /// Attempts in order
    pub attempts: Vec<AttemptReport>,
}

impl ScenarioReport {
    fn from_attempts(scenario: &str, project: &str, attempts: Vec<AttemptReport>) -> Self {
        let status = match attempts.iter().position(|a| a.passed) {
            Some(0) => ScenarioStatus::Passed,
            Some(_) => ScenarioStatus::Flaky,
            None => ScenarioStatus::Failed,
        };
        Self {
            scenario: scenario.to_string(),
            project: project.to_string(),
            status,
            attempts,
        }
    }

    /// Error text of the last failed attempt
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| a.error.as_deref())
    }
}

/// Whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Run ID
    pub id: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end
    pub finished_at: DateTime<Utc>,
    /// Scenario x project results
    pub results: Vec<ScenarioReport>,
}

impl SuiteReport {
    fn count(&self, status: ScenarioStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Passed on first attempt
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(ScenarioStatus::Passed)
    }

    /// Passed after a retry
    #[must_use]
    pub fn flaky(&self) -> usize {
        self.count(ScenarioStatus::Flaky)
    }

    /// Never passed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ScenarioStatus::Failed)
    }

    /// No failures
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Save to JSON file
    pub async fn save_json(&self, path: &Path) -> TenazResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, json).await?;
        Ok(())
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} flaky, {} failed",
            self.passed(),
            self.flaky(),
            self.failed()
        )
    }
}

/// Runs scenarios against every configured project
pub struct ScenarioRunner<F: DriverFactory> {
    config: RunConfig,
    factory: F,
    project_filter: Option<String>,
}

impl<F: DriverFactory> fmt::Debug for ScenarioRunner<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("config", &self.config)
            .field("project_filter", &self.project_filter)
            .finish_non_exhaustive()
    }
}

impl<F: DriverFactory> ScenarioRunner<F> {
    /// Create a runner
    #[must_use]
    pub const fn new(config: RunConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            project_filter: None,
        }
    }

    /// Only run the named project
    #[must_use]
    pub fn only_project(mut self, name: impl Into<String>) -> Self {
        self.project_filter = Some(name.into());
        self
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    fn projects(&self) -> impl Iterator<Item = &Project> {
        self.config
            .projects
            .iter()
            .filter(|p| self.project_filter.as_deref().is_none_or(|only| p.name == only))
    }

    /// Run every scenario on every selected project
    pub async fn run(&self, scenarios: &[Scenario]) -> SuiteReport {
        let started_at = Utc::now();
        let mut results = Vec::new();
        for scenario in scenarios {
            for project in self.projects() {
                results.push(self.run_on(scenario, project).await);
            }
        }
        let report = SuiteReport {
            id: Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            results,
        };
        info!(summary = %report, "suite finished");
        report
    }

    /// Run one scenario on one project, retrying failures
    pub async fn run_on(&self, scenario: &Scenario, project: &Project) -> ScenarioReport {
        let mut attempts = Vec::new();
        for attempt in 0..=self.config.retries {
            let report = self.run_attempt(scenario, project, attempt).await;
            let passed = report.passed;
            attempts.push(report);
            if passed {
                break;
            }
            if attempt < self.config.retries {
                warn!(scenario = scenario.name(), project = %project.name, attempt, "retrying");
            }
        }
        ScenarioReport::from_attempts(scenario.name(), &project.name, attempts)
    }

    async fn run_attempt(&self, scenario: &Scenario, project: &Project, attempt: u32) -> AttemptReport {
        let dir = self.config.artifact_dir(scenario.name(), &project.name);
        let video_mode = self.config.use_options.video;
        let record_video = video_mode
            .should_record(attempt)
            .then(|| dir.join(format!("attempt-{attempt}-video")));
        let request = LaunchRequest {
            project: project.clone(),
            browser: self.config.browser_config(project),
            storage_state: self.config.use_options.storage_state.clone(),
            record_video: record_video.clone(),
            attempt,
        };
        info!(scenario = scenario.name(), project = %project.name, attempt, "starting attempt");

        let start = Instant::now();
        let driver = match self.factory.open(&request).await {
            Ok(driver) => driver,
            Err(e) => {
                warn!(scenario = scenario.name(), project = %project.name, error = %e, "driver launch failed");
                return AttemptReport {
                    attempt,
                    passed: false,
                    error: Some(e.to_string()),
                    duration_ms: millis(start.elapsed()),
                    screenshot: None,
                    trace: None,
                    video: None,
                };
            }
        };

        let trace = TraceLog::new(scenario.name(), &project.name, attempt);
        let session = Session::from_config(driver, &self.config, trace);
        let body = Arc::clone(&scenario.body);
        let outcome = session.scope(move |s| body(s)).await;
        let passed = outcome.passed();

        let mut report = AttemptReport {
            attempt,
            passed,
            error: outcome.result.as_ref().err().map(ToString::to_string),
            duration_ms: millis(outcome.elapsed),
            screenshot: None,
            trace: None,
            video: None,
        };
        self.save_artifacts(&dir, &outcome, &mut report).await;

        if let Some(video_dir) = record_video {
            let recorded = fs::try_exists(&video_dir).await.unwrap_or(false);
            if video_mode.should_retain(passed, attempt) {
                report.video = recorded.then_some(video_dir);
            } else if recorded {
                if let Err(e) = fs::remove_dir_all(&video_dir).await {
                    warn!(path = %video_dir.display(), error = %e, "could not discard video");
                }
            }
        }

        if passed {
            info!(scenario = scenario.name(), project = %project.name, attempt, "passed");
        } else {
            warn!(
                scenario = scenario.name(),
                project = %project.name,
                attempt,
                error = report.error.as_deref().unwrap_or_default(),
                "failed"
            );
        }
        report
    }

    async fn save_artifacts(
        &self,
        dir: &Path,
        outcome: &ScopeOutcome,
        report: &mut AttemptReport,
    ) {
        let attempt = report.attempt;
        if let Some(shot) = &outcome.screenshot {
            let path = dir.join(format!("attempt-{attempt}.png"));
            let written = match fs::create_dir_all(dir).await {
                Ok(()) => fs::write(&path, &shot.data).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => report.screenshot = Some(path),
                Err(e) => warn!(path = %path.display(), error = %e, "could not save screenshot"),
            }
        }
        if self.config.use_options.trace.should_retain(report.passed, attempt) {
            let path = dir.join(format!("attempt-{attempt}-trace.json"));
            match outcome.trace.save_json(&path).await {
                Ok(()) => report.trace = Some(path),
                Err(e) => warn!(path = %path.display(), error = %e, "could not save trace"),
            }
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
