//! Probe command handler
//!
//! Planning is pure and runs everywhere; driving a real browser needs the
//! `browser` feature. [`run_probe`] takes any [`PageDriver`] so the page side
//! can be exercised with the in-memory driver.

use crate::error::{CliError, CliResult};
use crate::ProbeArgs;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;
use tenaz::{
    BrowserConfig, IndicatorHit, IndicatorSet, Locator, PageDriver, Project, Resolution,
    ResolveOptions, RunConfig, Session, TraceLog,
};
use tracing::{debug, info};

/// What the probe resolves
#[derive(Debug, Clone)]
pub enum ProbeKind {
    /// One locator chain
    Single(Locator),
    /// Any-of indicator set
    Any(IndicatorSet),
}

impl ProbeKind {
    /// Diagnostic label
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Single(locator) => locator.label(),
            Self::Any(set) => set.label(),
        }
    }
}

/// Everything needed to run one probe
#[derive(Debug, Clone)]
pub struct ProbePlan {
    /// Absolute or base-relative URL to open
    pub url: String,
    /// What to resolve
    pub kind: ProbeKind,
    /// Resolver budgets and required state
    pub options: ResolveOptions,
    /// Project to launch
    pub project: Project,
    /// Launch options derived from the project
    pub browser: BrowserConfig,
}

/// Build a probe plan from the run configuration and command line
pub fn build_probe_plan(run: &RunConfig, args: &ProbeArgs) -> CliResult<ProbePlan> {
    let project = match &args.project {
        Some(name) => run
            .project(name)
            .cloned()
            .ok_or_else(|| CliError::invalid_argument(format!("unknown project `{name}`")))?,
        None => run.projects.first().cloned().unwrap_or_default(),
    };

    let kind = match (&args.what.target, args.any) {
        (Some(name), false) => ProbeKind::Single(run.target(name)?),
        (Some(name), true) => ProbeKind::Any(run.indicator(name)?),
        (None, false) => ProbeKind::Single(Locator::parse_chain(&args.what.candidates)?),
        (None, true) => ProbeKind::Any(IndicatorSet::parse(
            args.what.candidates.iter().map(|c| [c.as_str()]),
        )?),
    };

    let mut options = run.resolve_options();
    if let Some(state) = &args.state {
        options = options.with_state(state.parse()?);
    }
    if let Some(ms) = args.timeout {
        if ms == 0 {
            return Err(CliError::invalid_argument("--timeout must be greater than 0"));
        }
        options = match kind {
            ProbeKind::Single(_) => options.with_timeout_ms(ms),
            ProbeKind::Any(_) => options.with_probe_timeout(Duration::from_millis(ms)),
        };
    }

    let browser = run.browser_config(&project);
    Ok(ProbePlan {
        url: run.use_options.url_for(&args.url),
        kind,
        options,
        project,
        browser,
    })
}

/// Result of one probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    /// Page probed
    pub url: String,
    /// Target label
    pub target: String,
    /// Whether an element was found
    pub found: bool,
    /// Single-locator outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Winning group of an any-of probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit: Option<IndicatorHit>,
}

impl ProbeOutcome {
    /// Human-readable rendering
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        match (&self.resolution, &self.hit) {
            (Some(Resolution::Found(m)), _) => {
                let _ = writeln!(
                    out,
                    "found `{}` via [{}] {} after {}ms ({} polls)",
                    self.target,
                    m.candidate_index,
                    m.selector,
                    m.elapsed.as_millis(),
                    m.polls
                );
                let _ = writeln!(out, "  {}", m.element);
            }
            (Some(Resolution::NotFound(report)), _) => {
                let _ = writeln!(out, "{report}");
            }
            (None, Some(hit)) => {
                let _ = writeln!(
                    out,
                    "found `{}` via group [{}] {} after {}ms",
                    self.target,
                    hit.group,
                    hit.locator,
                    hit.matched.elapsed.as_millis()
                );
                let _ = writeln!(out, "  {}", hit.matched.element);
            }
            (None, None) => {
                let _ = writeln!(out, "none of `{}` present on {}", self.target, self.url);
            }
        }
        out
    }

    /// Pretty JSON rendering
    pub fn render_json(&self) -> CliResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Spinner text while a probe runs
#[must_use]
pub fn probe_message(plan: &ProbePlan) -> String {
    format!("probing {} on {}", plan.kind.label(), plan.url)
}

/// Navigate and resolve with an already-open driver; always closes it
pub async fn run_probe<D: PageDriver>(driver: D, plan: &ProbePlan) -> CliResult<ProbeOutcome> {
    let mut session = Session::new(driver, TraceLog::new("probe", plan.project.name.clone(), 0))
        .with_options(plan.options);
    let result = probe_page(&mut session, plan).await;
    let trace = session.close().await;
    debug!(steps = trace.events.len(), "probe session closed");
    result
}

async fn probe_page<D: PageDriver>(
    session: &mut Session<D>,
    plan: &ProbePlan,
) -> CliResult<ProbeOutcome> {
    session.goto(&plan.url).await?;
    let target = plan.kind.label();
    let outcome = match &plan.kind {
        ProbeKind::Single(locator) => {
            let resolution = session.resolve(locator).await?;
            ProbeOutcome {
                url: plan.url.clone(),
                target,
                found: resolution.is_found(),
                resolution: Some(resolution),
                hit: None,
            }
        }
        ProbeKind::Any(set) => {
            let hit = session.resolve_first(set).await?;
            ProbeOutcome {
                url: plan.url.clone(),
                target,
                found: hit.is_some(),
                resolution: None,
                hit,
            }
        }
    };
    info!(target = %outcome.target, found = outcome.found, "probe finished");
    Ok(outcome)
}

/// Execute the probe command against Chromium
#[cfg(feature = "browser")]
pub fn execute_probe(
    config: &crate::config::CliConfig,
    args: &ProbeArgs,
    reporter: &mut crate::output::ProgressReporter,
) -> CliResult<ProbeOutcome> {
    use tenaz::{ChromiumFactory, DriverFactory, LaunchRequest};

    let run = crate::handlers::config::load_run_config(config)?;
    let plan = build_probe_plan(&run, args)?;
    let request = LaunchRequest {
        project: plan.project.clone(),
        browser: plan.browser.clone(),
        storage_state: run.use_options.storage_state.clone(),
        record_video: None,
        attempt: 0,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    reporter.start_spinner(&format!("launching {}", plan.project.name));
    let result = runtime.block_on(async {
        let driver = ChromiumFactory::new().open(&request).await?;
        reporter.set_message(&probe_message(&plan));
        run_probe(driver, &plan).await
    });
    reporter.finish();
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::commands::{ProbeFormat, ProbeTarget};
    use tenaz::{ElementSnapshot, MockDriver, RequiredState};

    fn starter() -> RunConfig {
        RunConfig::from_yaml_str(tenaz::STARTER_CONFIG).unwrap()
    }

    fn args(target: Option<&str>, candidates: &[&str], any: bool) -> ProbeArgs {
        ProbeArgs {
            url: "/login".into(),
            what: ProbeTarget {
                target: target.map(String::from),
                candidates: candidates.iter().map(|c| (*c).to_string()).collect(),
            },
            any,
            state: None,
            timeout: None,
            project: None,
            format: ProbeFormat::Text,
        }
    }

    mod plan_tests {
        use super::*;

        #[test]
        fn test_named_target() {
            let plan = build_probe_plan(&starter(), &args(Some("email"), &[], false)).unwrap();
            assert_eq!(plan.url, "http://localhost:3000/login");
            assert_eq!(plan.project.name, "chromium");
            let ProbeKind::Single(locator) = plan.kind else {
                panic!("expected single");
            };
            assert_eq!(locator.candidates().len(), 2);
            assert_eq!(plan.options.timeout, Duration::from_millis(5_000));
        }

        #[test]
        fn test_inline_candidates_as_groups() {
            let mut a = args(None, &["text=Admin Panel", "role=navigation"], true);
            a.timeout = Some(250);
            let plan = build_probe_plan(&starter(), &a).unwrap();
            let ProbeKind::Any(set) = plan.kind else {
                panic!("expected any");
            };
            assert_eq!(set.groups().len(), 2);
            assert_eq!(plan.options.probe_timeout, Duration::from_millis(250));
        }

        #[test]
        fn test_state_override() {
            let mut a = args(Some("submit"), &[], false);
            a.state = Some("visible,enabled".into());
            let plan = build_probe_plan(&starter(), &a).unwrap();
            assert_eq!(plan.options.state, RequiredState::actionable());
        }

        #[test]
        fn test_spinner_text_names_target_and_url() {
            let plan = build_probe_plan(&starter(), &args(Some("email"), &[], false)).unwrap();
            assert_eq!(
                probe_message(&plan),
                format!("probing {} on http://localhost:3000/login", plan.kind.label())
            );
        }

        #[test]
        fn test_rejects_bad_inputs() {
            let run = starter();
            assert!(build_probe_plan(&run, &args(Some("missing"), &[], false)).is_err());
            assert!(build_probe_plan(&run, &args(Some("email"), &[], true)).is_err());

            let mut a = args(Some("email"), &[], false);
            a.project = Some("webkit".into());
            assert!(build_probe_plan(&run, &a).is_err());

            let mut a = args(Some("email"), &[], false);
            a.state = Some("shiny".into());
            assert!(build_probe_plan(&run, &a).is_err());

            let mut a = args(Some("email"), &[], false);
            a.timeout = Some(0);
            assert!(build_probe_plan(&run, &a).is_err());
        }
    }

    mod run_tests {
        use super::*;

        fn login_page() -> MockDriver {
            MockDriver::new().with_element(
                ElementSnapshot::new("input")
                    .with_role("textbox")
                    .with_name("Email")
                    .with_attribute("id", "email"),
            )
        }

        #[tokio::test(start_paused = true)]
        async fn test_found_single() {
            let plan = build_probe_plan(&starter(), &args(Some("email"), &[], false)).unwrap();
            let outcome = run_probe(login_page(), &plan).await.unwrap();
            assert!(outcome.found);
            let text = outcome.render_text();
            assert!(text.contains("found `email` via [0]"));
            let json = outcome.render_json().unwrap();
            assert!(json.contains("\"outcome\": \"found\""));
        }

        #[tokio::test(start_paused = true)]
        async fn test_not_found_reports_candidates() {
            let mut a = args(Some("submit"), &[], false);
            a.timeout = Some(200);
            let plan = build_probe_plan(&starter(), &a).unwrap();
            let outcome = run_probe(login_page(), &plan).await.unwrap();
            assert!(!outcome.found);
            assert!(outcome.render_text().contains("not visible within 200ms"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_any_absent() {
            let plan = build_probe_plan(&starter(), &args(Some("logged_in"), &[], true)).unwrap();
            let outcome = run_probe(login_page(), &plan).await.unwrap();
            assert!(!outcome.found);
            assert!(outcome.render_text().contains("none of `logged_in` present"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_closed_page_is_environment_error() {
            let plan = build_probe_plan(&starter(), &args(Some("email"), &[], false)).unwrap();
            let page = login_page().close_page_after(Duration::ZERO);
            let err = run_probe(page, &plan).await.unwrap_err();
            assert!(err.is_environment());
        }
    }
}
