//! Per-attempt page session.
//!
//! A [`Session`] owns the driver for one scenario attempt and records every
//! step into its [`TraceLog`]. [`Session::scope`] runs a scenario body and
//! closes the driver on every exit path:
//!
//! ```no_run
//! # async fn demo() -> tenaz::TenazResult<()> {
//! use tenaz::{Locator, MockDriver, Selector, Session, TraceLog};
//!
//! let session = Session::new(MockDriver::new(), TraceLog::new("login", "chromium", 0))
//!     .with_base_url("http://localhost:3000");
//! let outcome = session
//!     .scope(|s| {
//!         Box::pin(async move {
//!             s.goto("/login").await?;
//!             s.expect(Locator::new(Selector::label("Email"))).to_be_editable().await?;
//!             Ok(())
//!         })
//!     })
//!     .await;
//! outcome.result?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::assertion::{expect_any, Expect};
use crate::config::{RunConfig, ScreenshotMode, UseOptions};
use crate::driver::{PageDriver, Screenshot};
use crate::locator::{IndicatorSet, Locator};
use crate::resolver::{resolve, resolve_first, IndicatorHit, Resolution};
use crate::result::{TenazError, TenazResult};
use crate::selector::TextMatch;
use crate::trace::{StepKind, StepStatus, TraceArchive, TraceEvent, TraceLog};
use crate::wait::{poll_until, RequiredState, ResolveOptions};

/// What [`Session::scope`] hands back
#[derive(Debug)]
pub struct ScopeOutcome {
    /// Scenario body result (timeouts included)
    pub result: TenazResult<()>,
    /// Screenshot taken per the screenshot policy
    pub screenshot: Option<Screenshot>,
    /// Steps recorded during the attempt
    pub trace: TraceArchive,
    /// Wall time of the body
    pub elapsed: Duration,
}

impl ScopeOutcome {
    /// Whether the body succeeded
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// One driver, one attempt
#[derive(Debug)]
pub struct Session<D: PageDriver> {
    driver: D,
    trace: TraceLog,
    options: ResolveOptions,
    use_options: UseOptions,
    timeout: Option<Duration>,
}

impl<D: PageDriver> Session<D> {
    /// Session with default budgets and no base URL
    #[must_use]
    pub fn new(driver: D, trace: TraceLog) -> Self {
        Self {
            driver,
            trace,
            options: ResolveOptions::default(),
            use_options: UseOptions::default(),
            timeout: None,
        }
    }

    /// Session configured from a run config (budgets, base URL, policy, timeout)
    #[must_use]
    pub fn from_config(driver: D, config: &RunConfig, trace: TraceLog) -> Self {
        Self {
            driver,
            trace,
            options: config.resolve_options(),
            use_options: config.use_options.clone(),
            timeout: Some(config.scenario_timeout()),
        }
    }

    /// Set resolver options
    #[must_use]
    pub const fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Set base URL for relative navigation
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.use_options.base_url = Some(base_url.into());
        self
    }

    /// Set screenshot policy used by [`Session::scope`]
    #[must_use]
    pub const fn with_screenshot_mode(mut self, mode: ScreenshotMode) -> Self {
        self.use_options.screenshot = mode;
        self
    }

    /// Set the whole-scope timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Underlying driver
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Resolver options
    #[must_use]
    pub const fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Step log
    #[must_use]
    pub const fn trace(&self) -> &TraceLog {
        &self.trace
    }

    // =========================================================================
    // NAVIGATION
    // =========================================================================

    /// Navigate; relative paths are joined to the base URL
    pub async fn goto(&mut self, path: &str) -> TenazResult<()> {
        let url = self.use_options.url_for(path);
        let start = Instant::now();
        let result = self.driver.navigate(&url).await;
        let event = match &result {
            Ok(()) => TraceEvent::new(StepKind::Navigate, &url, StepStatus::Ok),
            Err(e) => TraceEvent::new(StepKind::Navigate, &url, StepStatus::Failed)
                .with_message(e.to_string()),
        };
        self.trace.record(event.with_duration(start.elapsed()));
        debug!(%url, ok = result.is_ok(), "navigate");
        result
    }

    /// Current page URL
    pub async fn current_url(&self) -> TenazResult<String> {
        self.driver.current_url().await
    }

    /// Wait until the page URL matches `expected`
    ///
    /// # Errors
    ///
    /// `AssertionFailed` naming the last URL seen, plus driver errors.
    pub async fn expect_url(&self, expected: &TextMatch) -> TenazResult<String> {
        let start = Instant::now();
        let driver = &self.driver;
        let found = poll_until(&self.options, move || async move {
            let url = driver.current_url().await?;
            Ok(expected.matches(&url).then_some(url))
        })
        .await;
        let result = match found {
            Ok(Some(url)) => Ok(url),
            Ok(None) => {
                let last = self.driver.current_url().await.unwrap_or_default();
                Err(TenazError::assertion(format!(
                    "expected URL {expected} within {}ms, last was `{last}`",
                    self.options.timeout.as_millis()
                )))
            }
            Err(e) => Err(e),
        };
        let target = format!("url {expected}");
        let event = match &result {
            Ok(url) => TraceEvent::new(StepKind::Expect, target, StepStatus::Ok).with_candidate(url),
            Err(e) => TraceEvent::new(StepKind::Expect, target, StepStatus::Failed)
                .with_message(e.to_string()),
        };
        self.trace.record(event.with_duration(start.elapsed()));
        result
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Resolve with the session's options
    pub async fn resolve(&self, locator: &Locator) -> TenazResult<Resolution> {
        self.resolve_with(locator, &self.options).await
    }

    /// Resolve requiring `state` instead of the session default
    pub async fn resolve_in(
        &self,
        locator: &Locator,
        state: RequiredState,
    ) -> TenazResult<Resolution> {
        self.resolve_with(locator, &self.options.with_state(state))
            .await
    }

    /// Resolve with explicit options
    pub async fn resolve_with(
        &self,
        locator: &Locator,
        options: &ResolveOptions,
    ) -> TenazResult<Resolution> {
        let start = Instant::now();
        let result = resolve(&self.driver, locator, options).await;
        let target = locator.label();
        let event = match &result {
            Ok(Resolution::Found(m)) => TraceEvent::new(StepKind::Resolve, target, StepStatus::Ok)
                .with_candidate(m.selector.to_string()),
            Ok(Resolution::NotFound(report)) => {
                TraceEvent::new(StepKind::Resolve, target, StepStatus::NotFound)
                    .with_message(report.to_string())
            }
            Err(e) => TraceEvent::new(StepKind::Resolve, target, StepStatus::Failed)
                .with_message(e.to_string()),
        };
        self.trace.record(event.with_duration(start.elapsed()));
        result
    }

    /// Whether any indicator group is present
    pub async fn resolve_any(&self, set: &IndicatorSet) -> TenazResult<bool> {
        Ok(self.resolve_first(set).await?.is_some())
    }

    /// First present indicator group
    pub async fn resolve_first(&self, set: &IndicatorSet) -> TenazResult<Option<IndicatorHit>> {
        let start = Instant::now();
        let result = resolve_first(&self.driver, set, &self.options).await;
        self.record_any(set, &result.as_ref().map(Option::as_ref), start);
        result
    }

    // =========================================================================
    // EXPECTATIONS
    // =========================================================================

    /// Traced expectation on `locator`
    pub fn expect(&self, locator: impl Into<Locator>) -> Expect<'_, D> {
        Expect::new(&self.driver, locator.into())
            .with_options(self.options)
            .traced(&self.trace)
    }

    /// Require at least one indicator group
    pub async fn expect_any(&self, set: &IndicatorSet) -> TenazResult<IndicatorHit> {
        let start = Instant::now();
        let result = expect_any(&self.driver, set, &self.options).await;
        self.record_any(set, &result.as_ref().map(Some), start);
        result
    }

    /// Capture and trace a screenshot
    pub async fn screenshot(&self) -> TenazResult<Screenshot> {
        let start = Instant::now();
        let result = self.driver.screenshot().await;
        let event = match &result {
            Ok(shot) => TraceEvent::new(StepKind::Screenshot, "page", StepStatus::Ok)
                .with_message(format!("{}x{} ({} bytes)", shot.width, shot.height, shot.size_bytes())),
            Err(e) => TraceEvent::new(StepKind::Screenshot, "page", StepStatus::Failed)
                .with_message(e.to_string()),
        };
        self.trace.record(event.with_duration(start.elapsed()));
        result
    }

    fn record_any(
        &self,
        set: &IndicatorSet,
        result: &Result<Option<&IndicatorHit>, &TenazError>,
        start: Instant,
    ) {
        let target = set.label();
        let event = match result {
            Ok(Some(hit)) => TraceEvent::new(StepKind::ResolveAny, target, StepStatus::Ok)
                .with_candidate(format!("[{}] {}", hit.group, hit.matched.selector)),
            Ok(None) => TraceEvent::new(StepKind::ResolveAny, target, StepStatus::NotFound),
            Err(e) => TraceEvent::new(StepKind::ResolveAny, target, StepStatus::Failed)
                .with_message(e.to_string()),
        };
        self.trace.record(event.with_duration(start.elapsed()));
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Run `body` and close the driver afterwards, whatever happened.
    ///
    /// With a timeout set, resolvers inside the body see it as their outer
    /// deadline and the body is cancelled once it passes.
    pub async fn scope<F>(mut self, body: F) -> ScopeOutcome
    where
        F: for<'s> FnOnce(&'s mut Self) -> BoxFuture<'s, TenazResult<()>>,
    {
        let start = Instant::now();
        if let Some(timeout) = self.timeout {
            self.options = self.options.with_deadline(start + timeout);
        }

        let result = match self.timeout {
            Some(timeout) => {
                let fut = body(&mut self);
                tokio::time::timeout(timeout, fut)
                    .await
                    .unwrap_or_else(|_| {
                        Err(TenazError::Timeout {
                            ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        })
                    })
            }
            None => body(&mut self).await,
        };
        let elapsed = start.elapsed();
        let passed = result.is_ok();

        let screenshot = if self.use_options.screenshot.should_capture(passed) {
            self.screenshot()
                .await
                .inspect_err(|e| warn!(error = %e, "screenshot after scenario failed"))
                .ok()
        } else {
            None
        };

        self.close_driver().await;
        if let Err(e) = &result {
            info!(
                scenario = %self.trace.metadata().scenario,
                elapsed_ms = elapsed.as_millis(),
                error = %e,
                "scenario failed"
            );
        }

        ScopeOutcome {
            result,
            screenshot,
            trace: self.trace.to_archive(),
            elapsed,
        }
    }

    /// Close the driver and return the trace
    pub async fn close(mut self) -> TraceArchive {
        self.close_driver().await;
        self.trace.to_archive()
    }

    async fn close_driver(&mut self) {
        let start = Instant::now();
        let event = match self.driver.close().await {
            Ok(()) => TraceEvent::new(StepKind::Close, "page", StepStatus::Ok),
            Err(e) => {
                warn!(error = %e, "closing driver failed");
                TraceEvent::new(StepKind::Close, "page", StepStatus::Failed)
                    .with_message(e.to_string())
            }
        };
        self.trace.record(event.with_duration(start.elapsed()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::{ElementSnapshot, MockDriver, MockElement};
    use crate::selector::Selector;

    fn login_page() -> MockDriver {
        MockDriver::new()
            .with_element(
                ElementSnapshot::new("input")
                    .with_role("textbox")
                    .with_name("Email Address")
                    .with_attribute("id", "email"),
            )
            .with_element(
                MockElement::new(ElementSnapshot::new("nav").with_role("navigation"))
                    .appear_after(Duration::from_millis(300)),
            )
    }

    fn email() -> Locator {
        Locator::parse_chain(["role=textbox[name=/username|email/i]", "attr=id=email"])
            .unwrap()
            .named("email")
    }

    fn session(driver: MockDriver) -> Session<MockDriver> {
        Session::new(driver, TraceLog::new("login", "chromium", 0))
            .with_base_url("http://localhost:3000")
    }

    mod step_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_goto_joins_base_url_and_traces() {
            let mut s = session(MockDriver::new());
            s.goto("/login").await.unwrap();
            assert_eq!(s.current_url().await.unwrap(), "http://localhost:3000/login");
            let events = s.trace().events();
            assert_eq!(events[0].kind, StepKind::Navigate);
            assert_eq!(events[0].target, "http://localhost:3000/login");
        }

        #[tokio::test(start_paused = true)]
        async fn test_resolve_records_candidate() {
            let s = session(login_page());
            let m = s.resolve(&email()).await.unwrap().into_match().unwrap();
            assert_eq!(m.candidate_index, 0);
            let event = &s.trace().events()[0];
            assert_eq!(event.status, StepStatus::Ok);
            assert_eq!(event.candidate.as_deref(), Some("role=textbox[name=/username|email/i]"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_resolve_not_found_records_report() {
            let s = session(MockDriver::new())
                .with_options(ResolveOptions::new().with_timeout_ms(200));
            let res = s.resolve(&email()).await.unwrap();
            assert!(!res.is_found());
            let event = &s.trace().events()[0];
            assert_eq!(event.status, StepStatus::NotFound);
            assert!(event.message.as_deref().unwrap().contains("`email` not visible within 200ms"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_resolve_any_waits_for_late_group() {
            let s = session(login_page());
            let set = IndicatorSet::parse([vec!["text=Admin Panel"], vec!["role=navigation"]])
                .unwrap()
                .named("nav");
            assert!(s.resolve_any(&set).await.unwrap());
            let event = s.trace().events().pop().unwrap();
            assert_eq!(event.kind, StepKind::ResolveAny);
            assert_eq!(event.candidate.as_deref(), Some("[1] role=navigation"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_expect_is_traced() {
            let s = session(login_page());
            s.expect(email()).to_be_visible().await.unwrap();
            assert_eq!(s.trace().events()[0].kind, StepKind::Expect);
        }

        #[tokio::test(start_paused = true)]
        async fn test_expect_url() {
            let mut s = session(MockDriver::new())
                .with_options(ResolveOptions::new().with_timeout_ms(300));
            s.goto("/dashboard").await.unwrap();
            let url = s.expect_url(&TextMatch::contains("/dashboard")).await.unwrap();
            assert!(url.ends_with("/dashboard"));

            let err = s.expect_url(&TextMatch::contains("/admin")).await.unwrap_err();
            assert!(err.to_string().contains("last was `http://localhost:3000/dashboard`"));
        }
    }

    mod scope_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_scope_closes_on_success() {
            let driver = login_page();
            let history = driver.history();
            let outcome = session(driver)
                .scope(|s| {
                    Box::pin(async move {
                        s.goto("/login").await?;
                        s.expect(email()).to_be_visible().await?;
                        Ok(())
                    })
                })
                .await;
            assert!(outcome.passed());
            assert!(outcome.screenshot.is_none());
            assert_eq!(history.count("close"), 1);
            assert_eq!(outcome.trace.events.last().unwrap().kind, StepKind::Close);
        }

        #[tokio::test(start_paused = true)]
        async fn test_scope_screenshots_and_closes_on_failure() {
            let driver = MockDriver::new();
            let history = driver.history();
            let outcome = session(driver)
                .with_options(ResolveOptions::new().with_timeout_ms(100))
                .scope(|s| {
                    Box::pin(async move {
                        s.expect(Locator::new(Selector::text("Welcome")))
                            .to_be_visible()
                            .await?;
                        Ok(())
                    })
                })
                .await;
            assert!(matches!(outcome.result, Err(TenazError::AssertionFailed { .. })));
            assert!(outcome.screenshot.is_some());
            assert!(history.calls().ends_with(&["screenshot".to_string(), "close".to_string()]));
        }

        #[tokio::test(start_paused = true)]
        async fn test_scope_timeout_becomes_outer_deadline() {
            let driver = MockDriver::new();
            let history = driver.history();
            let outcome = session(driver)
                .with_timeout(Duration::from_millis(1_000))
                .with_screenshot_mode(ScreenshotMode::Off)
                .with_options(ResolveOptions::new().with_timeout_ms(5_000))
                .scope(|s| {
                    Box::pin(async move {
                        s.resolve(&Locator::new(Selector::text("never"))).await?;
                        Ok(())
                    })
                })
                .await;
            assert!(matches!(outcome.result, Err(TenazError::Timeout { .. })));
            assert!(outcome.elapsed <= Duration::from_millis(1_050));
            assert!(outcome.screenshot.is_none());
            assert_eq!(history.count("close"), 1);
        }
    }
}
