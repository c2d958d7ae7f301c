//! Auto-waiting expectations.
//!
//! An [`Expect`] polls a [`Locator`] until the expectation holds or its
//! timeout runs out, then fails with `TenazError::AssertionFailed` carrying
//! the resolver's full report.
//!
//! ```no_run
//! # async fn demo(driver: &tenaz::MockDriver) -> tenaz::TenazResult<()> {
//! use tenaz::{expect, Locator, Selector};
//!
//! let error_banner = Locator::new(Selector::attribute("role", Some("alert")))
//!     .or(Selector::css(".error, .alert-danger"));
//! expect(driver, error_banner).to_contain_text("invalid").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::driver::{ElementSnapshot, PageDriver};
use crate::locator::{IndicatorSet, Locator};
use crate::resolver::{resolve_first, resolve_matching, IndicatorHit, Match, Resolution};
use crate::result::{TenazError, TenazResult};
use crate::selector::TextMatch;
use crate::trace::{StepKind, StepStatus, TraceEvent, TraceLog};
use crate::wait::{Deadline, RequiredState, ResolveOptions, Tick};

/// Expectation builder bound to one driver and locator
#[derive(Debug)]
pub struct Expect<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    locator: Locator,
    options: ResolveOptions,
    trace: Option<&'a TraceLog>,
}

/// Start an expectation with default options
pub fn expect<D: PageDriver + ?Sized>(driver: &D, locator: impl Into<Locator>) -> Expect<'_, D> {
    Expect::new(driver, locator.into())
}

impl<'a, D: PageDriver + ?Sized> Expect<'a, D> {
    /// Create an expectation
    #[must_use]
    pub fn new(driver: &'a D, locator: Locator) -> Self {
        Self {
            driver,
            locator,
            options: ResolveOptions::default(),
            trace: None,
        }
    }

    /// Replace options (the required state is set per assertion)
    #[must_use]
    pub const fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Per-assertion timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Record the outcome into a trace
    #[must_use]
    pub const fn traced(mut self, trace: &'a TraceLog) -> Self {
        self.trace = Some(trace);
        self
    }

    /// The locator under test
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Visible
    pub async fn to_be_visible(&self) -> TenazResult<Match> {
        self.require("visible", RequiredState::visible(), &|_| true)
            .await
    }

    /// Visible and enabled
    pub async fn to_be_enabled(&self) -> TenazResult<Match> {
        self.require("enabled", RequiredState::actionable(), &|_| true)
            .await
    }

    /// Visible, enabled and editable
    pub async fn to_be_editable(&self) -> TenazResult<Match> {
        self.require("editable", RequiredState::editable(), &|_| true)
            .await
    }

    /// Visible and checked
    pub async fn to_be_checked(&self) -> TenazResult<Match> {
        self.require("checked", RequiredState::visible().and_checked(true), &|_| true)
            .await
    }

    /// Has `name` attribute equal to `value`
    pub async fn to_have_attribute(&self, name: &str, value: &str) -> TenazResult<Match> {
        let what = format!("to have attribute {name}=\"{value}\"");
        self.require(&what, RequiredState::attached(), &|el: &ElementSnapshot| {
            el.attribute(name) == Some(value)
        })
        .await
    }

    /// Text matches `expected`
    pub async fn to_have_text(&self, expected: TextMatch) -> TenazResult<Match> {
        let what = format!("to have text {expected}");
        self.require(&what, RequiredState::attached(), &|el: &ElementSnapshot| {
            expected.matches(&el.text)
        })
        .await
    }

    /// Text contains `text` (case-insensitive)
    pub async fn to_contain_text(&self, text: impl Into<String>) -> TenazResult<Match> {
        let expected = TextMatch::Contains(text.into());
        let what = format!("to contain text \"{expected}\"");
        self.require(&what, RequiredState::attached(), &|el: &ElementSnapshot| {
            expected.matches(&el.text)
        })
        .await
    }

    /// No candidate yields a visible element (detached counts as hidden).
    ///
    /// A candidate the driver cannot evaluate matches nothing, so it counts as
    /// hidden too. The in-memory page reports XPath and CSS outside its subset
    /// that way; each such empty poll is logged at `debug`.
    pub async fn to_be_hidden(&self) -> TenazResult<()> {
        self.locator.validate()?;
        let start = Instant::now();
        let outcome = self.wait_hidden().await;
        self.record(&outcome.as_ref().map(|()| None), start);
        outcome
    }

    async fn wait_hidden(&self) -> TenazResult<()> {
        let deadline = Deadline::start(&self.options);
        loop {
            let mut visible = Vec::new();
            for selector in self.locator.candidates() {
                let elements = self.driver.query_all(selector).await?;
                if elements.is_empty() {
                    debug!(%selector, "candidate matched nothing; counted as hidden");
                }
                for element in elements {
                    if element.state.visible {
                        visible.push(format!("{selector}: {element}"));
                    }
                }
            }
            if visible.is_empty() {
                return Ok(());
            }
            match deadline.tick(self.options.poll_interval) {
                Tick::Sleep(wait) => tokio::time::sleep(wait).await,
                Tick::Exhausted => {
                    return Err(TenazError::assertion(format!(
                        "`{}` still visible after {}ms:\n  {}",
                        self.locator.label(),
                        self.options.timeout.as_millis(),
                        visible.join("\n  ")
                    )))
                }
                Tick::OuterDeadline => return Err(deadline.timeout_error()),
            }
        }
    }

    async fn require(
        &self,
        what: &str,
        state: RequiredState,
        condition: &(dyn Fn(&ElementSnapshot) -> bool + Sync),
    ) -> TenazResult<Match> {
        let start = Instant::now();
        let options = self.options.with_state(state);
        let outcome = match resolve_matching(self.driver, &self.locator, &options, condition).await
        {
            Ok(Resolution::Found(m)) => Ok(m),
            Ok(Resolution::NotFound(report)) => Err(TenazError::assertion(format!(
                "expected `{}` {what}\n{report}",
                self.locator.label()
            ))),
            Err(e) => Err(e),
        };
        self.record(
            &outcome.as_ref().map(|m| Some(m.selector.to_string())),
            start,
        );
        outcome
    }

    fn record(&self, outcome: &Result<Option<String>, &TenazError>, start: Instant) {
        let Some(trace) = self.trace else {
            return;
        };
        let target = self.locator.label();
        let event = match outcome {
            Ok(candidate) => {
                let event = TraceEvent::new(StepKind::Expect, target, StepStatus::Ok);
                match candidate {
                    Some(c) => event.with_candidate(c.clone()),
                    None => event,
                }
            }
            Err(e) => TraceEvent::new(StepKind::Expect, target, StepStatus::Failed)
                .with_message(e.to_string()),
        };
        trace.record(event.with_duration(start.elapsed()));
    }
}

/// Require that at least one indicator group is present
///
/// # Errors
///
/// `AssertionFailed` when every group is absent, plus everything
/// [`resolve_first`] returns.
pub async fn expect_any<D: PageDriver + ?Sized>(
    driver: &D,
    set: &IndicatorSet,
    options: &ResolveOptions,
) -> TenazResult<IndicatorHit> {
    resolve_first(driver, set, options).await?.ok_or_else(|| {
        let groups = set
            .groups()
            .iter()
            .enumerate()
            .map(|(i, g)| format!("  [{i}] {}", g.chain_string()))
            .collect::<Vec<_>>()
            .join("\n");
        TenazError::assertion(format!(
            "none of `{}` present within {}ms each:\n{groups}",
            set.label(),
            options.probe_timeout.as_millis()
        ))
    })
}
