//! Resilient locator resolution.
//!
//! [`resolve`] polls a [`Locator`]'s candidates in priority order until one
//! yields an element in the required state or the budget runs out. Running out
//! of budget is an ordinary outcome ([`Resolution::NotFound`]); only driver,
//! page and navigation failures come back as `Err`.
//!
//! [`resolve_any`] / [`resolve_first`] answer "is at least one of these
//! indicators present", giving each group the short probe budget.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::driver::{ElementSnapshot, PageDriver};
use crate::locator::{IndicatorSet, Locator};
use crate::result::{TenazError, TenazResult};
use crate::selector::Selector;
use crate::wait::{Deadline, RequiredState, ResolveOptions, Tick};

/// Requirement name reported when an extra element condition fails
pub const CONDITION_UNMET: &str = "condition";

/// A resolved element and how it was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// The element as observed when it satisfied the requirements
    pub element: ElementSnapshot,
    /// Index of the winning candidate in the locator
    pub candidate_index: usize,
    /// The winning candidate
    pub selector: Selector,
    /// Position of the element among that candidate's matches
    pub element_index: usize,
    /// Time from the start of the call to the match
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// Polling rounds run, including the successful one
    pub polls: u32,
}

/// What one candidate saw on the last polling round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAttempt {
    /// Candidate position
    pub index: usize,
    /// Candidate selector
    pub selector: Selector,
    /// Elements it matched
    pub matched: usize,
    /// The matched element closest to satisfying the requirements
    pub closest: Option<ElementSnapshot>,
    /// Requirements `closest` failed
    pub unmet: Vec<String>,
}

impl CandidateAttempt {
    fn new(index: usize, selector: Selector, matched: usize) -> Self {
        Self {
            index,
            selector,
            matched,
            closest: None,
            unmet: Vec::new(),
        }
    }

    fn observe(&mut self, element: ElementSnapshot, unmet: Vec<&'static str>) {
        if self.closest.is_none() || unmet.len() < self.unmet.len() {
            self.closest = Some(element);
            self.unmet = unmet.into_iter().map(str::to_string).collect();
        }
    }
}

impl fmt::Display for CandidateAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.matched == 1 { "" } else { "es" };
        write!(f, "[{}] {}: {} match{plural}", self.index, self.selector, self.matched)?;
        if let Some(closest) = &self.closest {
            write!(f, ", last seen {closest}")?;
            if !self.unmet.is_empty() {
                write!(f, " (unmet: {})", self.unmet.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Diagnostics for a resolution that ran out of budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFoundReport {
    /// Locator name or rendered chain
    pub locator: String,
    /// Requirements that had to hold
    pub state: RequiredState,
    /// Budget
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Time actually spent
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// Polling rounds run
    pub polls: u32,
    /// Every candidate, as seen on the last round
    pub attempts: Vec<CandidateAttempt>,
}

impl fmt::Display for NotFoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` not {} within {}ms ({} polls, {}ms elapsed)",
            self.locator,
            self.state,
            self.timeout.as_millis(),
            self.polls,
            self.elapsed.as_millis()
        )?;
        for attempt in &self.attempts {
            write!(f, "\n  {attempt}")?;
        }
        Ok(())
    }
}

/// Outcome of [`resolve`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// A candidate produced an element in the required state
    Found(Match),
    /// No candidate did within the budget
    NotFound(NotFoundReport),
}

impl Resolution {
    /// Whether an element was found
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The match, if any
    #[must_use]
    pub const fn found(&self) -> Option<&Match> {
        match self {
            Self::Found(m) => Some(m),
            Self::NotFound(_) => None,
        }
    }

    /// Consume into the match, if any
    #[must_use]
    pub fn into_match(self) -> Option<Match> {
        match self {
            Self::Found(m) => Some(m),
            Self::NotFound(_) => None,
        }
    }

    /// Treat `NotFound` as a failed requirement
    ///
    /// # Errors
    ///
    /// Returns `AssertionFailed` carrying the full report.
    pub fn require(self) -> TenazResult<Match> {
        match self {
            Self::Found(m) => Ok(m),
            Self::NotFound(report) => Err(TenazError::assertion(report.to_string())),
        }
    }
}

/// The group that satisfied an indicator set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorHit {
    /// Group position in the set
    pub group: usize,
    /// Group label
    pub locator: String,
    /// The match inside that group
    pub matched: Match,
}

/// Resolve `locator` to an element in `options.state`.
///
/// # Errors
///
/// `InvalidCandidateSet` for an empty locator (before any query), driver and
/// page failures as soon as they occur, and `Timeout` when the outer deadline
/// in `options` expires first.
pub async fn resolve<D>(
    driver: &D,
    locator: &Locator,
    options: &ResolveOptions,
) -> TenazResult<Resolution>
where
    D: PageDriver + ?Sized,
{
    resolve_matching(driver, locator, options, &|_: &ElementSnapshot| true).await
}

/// [`resolve`] with an extra element condition, checked after the state
/// requirements (e.g. text or attribute expectations).
///
/// # Errors
///
/// Same as [`resolve`].
pub async fn resolve_matching<D>(
    driver: &D,
    locator: &Locator,
    options: &ResolveOptions,
    condition: &(dyn Fn(&ElementSnapshot) -> bool + Sync),
) -> TenazResult<Resolution>
where
    D: PageDriver + ?Sized,
{
    locator.validate()?;

    let label = locator.label();
    let deadline = Deadline::start(options);
    let mut polls = 0u32;

    loop {
        polls += 1;
        let mut attempts = Vec::with_capacity(locator.candidates().len());

        for (index, selector) in locator.candidates().iter().enumerate() {
            let elements = driver.query_all(selector).await.inspect_err(|e| {
                warn!(locator = %label, candidate = index, %selector, error = %e, "query failed");
            })?;

            let mut attempt = CandidateAttempt::new(index, selector.clone(), elements.len());
            for (element_index, element) in elements.into_iter().enumerate() {
                let mut unmet = options.state.unmet(&element.state);
                if unmet.is_empty() && !condition(&element) {
                    unmet.push(CONDITION_UNMET);
                }
                if unmet.is_empty() {
                    let elapsed = deadline.elapsed();
                    info!(
                        locator = %label,
                        candidate = index,
                        %selector,
                        elapsed_ms = elapsed.as_millis(),
                        polls,
                        "resolved"
                    );
                    return Ok(Resolution::Found(Match {
                        element,
                        candidate_index: index,
                        selector: selector.clone(),
                        element_index,
                        elapsed,
                        polls,
                    }));
                }
                attempt.observe(element, unmet);
            }

            debug!(
                locator = %label,
                candidate = index,
                %selector,
                matched = attempt.matched,
                "candidate not satisfied"
            );
            attempts.push(attempt);
        }

        match deadline.tick(options.poll_interval) {
            Tick::Sleep(wait) => tokio::time::sleep(wait).await,
            Tick::Exhausted => {
                let report = NotFoundReport {
                    locator: label,
                    state: options.state,
                    timeout: options.timeout,
                    elapsed: deadline.elapsed(),
                    polls,
                    attempts,
                };
                debug!(locator = %report.locator, polls, "not found within budget");
                return Ok(Resolution::NotFound(report));
            }
            Tick::OuterDeadline => {
                warn!(locator = %label, polls, "outer deadline expired during resolution");
                return Err(deadline.timeout_error());
            }
        }
    }
}

/// Whether at least one group of `set` resolves within the probe budget.
///
/// # Errors
///
/// See [`resolve_first`].
pub async fn resolve_any<D>(
    driver: &D,
    set: &IndicatorSet,
    options: &ResolveOptions,
) -> TenazResult<bool>
where
    D: PageDriver + ?Sized,
{
    Ok(resolve_first(driver, set, options).await?.is_some())
}

/// Evaluate the groups of `set` in order, each with `options.probe_timeout`,
/// and report the first one found.
///
/// Per-group `NotFound` is swallowed. A per-group environment error is logged
/// and swallowed as long as some other group reached a genuine `NotFound`,
/// unless it ends the session (page closed, connection lost).
///
/// # Errors
///
/// `InvalidCandidateSet` for an empty set or group, `Timeout` for the outer
/// deadline, `PageClosed`/`ConnectionFailed` as soon as any group sees them,
/// and the first group error when every group failed.
pub async fn resolve_first<D>(
    driver: &D,
    set: &IndicatorSet,
    options: &ResolveOptions,
) -> TenazResult<Option<IndicatorHit>>
where
    D: PageDriver + ?Sized,
{
    set.validate()?;

    let probe = options.for_probe();
    let mut first_error: Option<TenazError> = None;
    let mut any_not_found = false;

    for (group, locator) in set.groups().iter().enumerate() {
        match resolve(driver, locator, &probe).await {
            Ok(Resolution::Found(matched)) => {
                info!(set = %set.label(), group, locator = %locator.label(), "indicator present");
                return Ok(Some(IndicatorHit {
                    group,
                    locator: locator.label(),
                    matched,
                }));
            }
            Ok(Resolution::NotFound(report)) => {
                debug!(set = %set.label(), group, locator = %report.locator, "indicator absent");
                any_not_found = true;
            }
            Err(e) if e.is_usage() || e.ends_session() || matches!(e, TenazError::Timeout { .. }) => {
                return Err(e)
            }
            Err(e) => {
                warn!(set = %set.label(), group, error = %e, "indicator group failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if !any_not_found => Err(e),
        _ => Ok(None),
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::{ElementState, MockDriver, MockElement};
    use crate::selector::TextMatch;
    use proptest::prelude::*;
    use tokio::time::Instant;

    fn email_textbox() -> ElementSnapshot {
        ElementSnapshot::new("input")
            .with_role("textbox")
            .with_name("Email Address")
            .with_attribute("id", "email")
            .with_attribute("type", "email")
            .with_state(ElementState::default().with_editable(true))
    }

    fn email_locator() -> Locator {
        Locator::parse_chain(["role=textbox[name=/username|email/i]", "attr=id=email"])
            .unwrap()
            .named("email field")
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    mod resolve_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_first_candidate_wins() {
            let driver = MockDriver::new().with_element(email_textbox());
            let res = resolve(&driver, &email_locator(), &ResolveOptions::default())
                .await
                .unwrap();
            let m = res.found().unwrap();
            assert_eq!(m.candidate_index, 0);
            assert_eq!(m.polls, 1);
            assert_eq!(m.elapsed, Duration::ZERO);
            assert_eq!(driver.history().count("query_all"), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_falls_back_to_later_candidate() {
            let driver = MockDriver::new()
                .with_element(ElementSnapshot::new("input").with_attribute("id", "email"));
            let m = resolve(&driver, &email_locator(), &ResolveOptions::default())
                .await
                .unwrap()
                .require()
                .unwrap();
            assert_eq!(m.candidate_index, 1);
            assert_eq!(m.selector, Selector::attribute("id", Some("email")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_hidden_match_does_not_count() {
            let hidden = email_textbox().with_state(ElementState::hidden());
            let visible_fallback = ElementSnapshot::new("input")
                .with_attribute("id", "email")
                .with_attribute("data-state", "fallback");
            let driver = MockDriver::new()
                .with_element(hidden)
                .with_element(visible_fallback);
            let locator = Locator::new(Selector::role("textbox")).or(Selector::css("[data-state]"));
            let m = resolve(&driver, &locator, &ResolveOptions::default())
                .await
                .unwrap()
                .into_match()
                .unwrap();
            assert_eq!(m.candidate_index, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_not_found_after_budget_with_report() {
            let driver = MockDriver::new()
                .with_element(email_textbox().with_state(ElementState::hidden()));
            let start = Instant::now();
            let opts = ResolveOptions::new().with_timeout_ms(300);
            let res = resolve(&driver, &email_locator(), &opts).await.unwrap();
            assert_eq!(start.elapsed(), ms(300));

            let Resolution::NotFound(report) = res else {
                panic!("expected NotFound");
            };
            assert_eq!(report.locator, "email field");
            assert_eq!(report.polls, 7);
            assert_eq!(report.attempts.len(), 2);
            assert_eq!(report.attempts[0].matched, 1);
            assert_eq!(report.attempts[0].unmet, vec!["visible"]);
            assert_eq!(report.attempts[1].matched, 1);

            let text = report.to_string();
            assert!(text.contains("`email field` not visible within 300ms"));
            assert!(text.contains("[0] role=textbox[name=/username|email/i]: 1 match"));
            assert!(text.contains("unmet: visible"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_late_element_returned_when_observed() {
            let driver = MockDriver::new().with_element(
                MockElement::new(email_textbox()).visible_after(ms(4_000)),
            );
            let start = Instant::now();
            let res = resolve(&driver, &email_locator(), &ResolveOptions::default())
                .await
                .unwrap();
            assert!(res.is_found());
            assert_eq!(start.elapsed(), ms(4_000));
        }

        #[tokio::test(start_paused = true)]
        async fn test_zero_budget_polls_once() {
            let driver = MockDriver::new();
            let opts = ResolveOptions::new().with_timeout(Duration::ZERO);
            let res = resolve(&driver, &email_locator(), &opts).await.unwrap();
            let Resolution::NotFound(report) = res else {
                panic!("expected NotFound");
            };
            assert_eq!(report.polls, 1);
            assert_eq!(report.attempts[0].matched, 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_environment_error_is_not_downgraded() {
            let driver = MockDriver::new().close_page_after(ms(100));
            let start = Instant::now();
            let err = resolve(&driver, &email_locator(), &ResolveOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, TenazError::PageClosed { .. }));
            assert_eq!(start.elapsed(), ms(100));
        }

        #[tokio::test(start_paused = true)]
        async fn test_empty_locator_fails_without_polling() {
            let driver = MockDriver::new();
            let err = resolve(&driver, &Locator::from_candidates(Vec::new()), &ResolveOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, TenazError::InvalidCandidateSet { .. }));
            assert!(!driver.was_called("query_all"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_outer_deadline_is_timeout() {
            let driver = MockDriver::new();
            let opts = ResolveOptions::new()
                .with_timeout_ms(5_000)
                .with_deadline(Instant::now() + ms(120));
            let err = resolve(&driver, &email_locator(), &opts).await.unwrap_err();
            assert!(matches!(err, TenazError::Timeout { ms: 120 }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_condition_filters_elements() {
            let driver = MockDriver::new()
                .with_element(ElementSnapshot::new("div").with_attribute("role", "alert").with_text("Saved"))
                .with_element(
                    ElementSnapshot::new("div")
                        .with_attribute("role", "alert")
                        .with_text("Invalid credentials"),
                );
            let locator = Locator::new(Selector::attribute("role", Some("alert")));
            let wanted = TextMatch::pattern_ci("invalid|incorrect").unwrap();
            let m = resolve_matching(&driver, &locator, &ResolveOptions::default(), &|el| {
                wanted.matches(&el.text)
            })
            .await
            .unwrap()
            .require()
            .unwrap();
            assert_eq!(m.element_index, 1);

            let opts = ResolveOptions::new().with_timeout_ms(100);
            let res = resolve_matching(&driver, &locator, &opts, &|_| false).await.unwrap();
            let Resolution::NotFound(report) = res else {
                panic!("expected NotFound");
            };
            assert_eq!(report.attempts[0].unmet, vec![CONDITION_UNMET]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_idempotent_on_static_page() {
            let driver = MockDriver::new().with_element(email_textbox());
            let a = resolve(&driver, &email_locator(), &ResolveOptions::default()).await.unwrap();
            let b = resolve(&driver, &email_locator(), &ResolveOptions::default()).await.unwrap();
            assert_eq!(a, b);
        }

        #[test]
        fn test_resolution_serializes_with_outcome_tag() {
            let res = Resolution::NotFound(NotFoundReport {
                locator: "x".into(),
                state: RequiredState::visible(),
                timeout: ms(500),
                elapsed: ms(500),
                polls: 11,
                attempts: Vec::new(),
            });
            let json = serde_json::to_value(&res).unwrap();
            assert_eq!(json["outcome"], "not_found");
            assert_eq!(json["timeout"], 500);
        }
    }

    mod any_tests {
        use super::*;

        fn admin_indicators() -> IndicatorSet {
            IndicatorSet::parse([
                vec!["text=Admin Panel"],
                vec!["text=Manage"],
                vec!["role=navigation"],
            ])
            .unwrap()
        }

        #[tokio::test(start_paused = true)]
        async fn test_all_absent_is_false_after_each_probe() {
            let driver = MockDriver::new();
            let start = Instant::now();
            let any = resolve_any(&driver, &admin_indicators(), &ResolveOptions::default())
                .await
                .unwrap();
            assert!(!any);
            assert_eq!(start.elapsed(), ms(1_500));
        }

        #[tokio::test(start_paused = true)]
        async fn test_short_circuits_on_first_present_group() {
            let driver = MockDriver::new()
                .with_element(ElementSnapshot::new("a").with_text("Manage users"))
                .with_element(ElementSnapshot::new("nav").with_role("navigation"));
            let start = Instant::now();
            let hit = resolve_first(&driver, &admin_indicators(), &ResolveOptions::default())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(hit.group, 1);
            assert_eq!(hit.locator, "text=Manage");
            assert_eq!(start.elapsed(), ms(500));
            assert!(!driver.was_called("query_all:role=navigation"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_error_swallowed_when_another_group_not_found() {
            let driver = MockDriver::new()
                .fail_query(&Selector::text("Admin Panel"), "execution context destroyed");
            let any = resolve_any(&driver, &admin_indicators(), &ResolveOptions::default())
                .await
                .unwrap();
            assert!(!any);
        }

        #[tokio::test(start_paused = true)]
        async fn test_error_then_found_is_true() {
            let driver = MockDriver::new()
                .fail_query(&Selector::text("Admin Panel"), "boom")
                .with_element(ElementSnapshot::new("nav").with_role("navigation"));
            assert!(resolve_any(&driver, &admin_indicators(), &ResolveOptions::default())
                .await
                .unwrap());
        }

        #[tokio::test(start_paused = true)]
        async fn test_all_groups_error_propagates_first() {
            let driver = MockDriver::new().close_page_after(Duration::ZERO);
            let err = resolve_any(&driver, &admin_indicators(), &ResolveOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, TenazError::PageClosed { .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_page_closed_after_absent_group_is_not_a_false_negative() {
            let driver = MockDriver::new().close_page_after(ms(600));
            let start = Instant::now();
            let err = resolve_first(&driver, &admin_indicators(), &ResolveOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, TenazError::PageClosed { .. }));
            assert!(start.elapsed() < ms(1_100));
            assert!(!driver.was_called("query_all:role=navigation"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_empty_set_is_usage_error() {
            let driver = MockDriver::new();
            let err = resolve_any(&driver, &IndicatorSet::new(Vec::new()), &ResolveOptions::default())
                .await
                .unwrap_err();
            assert!(err.is_usage());
        }

        #[tokio::test(start_paused = true)]
        async fn test_outer_deadline_propagates() {
            let driver = MockDriver::new();
            let opts = ResolveOptions::new().with_deadline(Instant::now() + ms(700));
            let err = resolve_any(&driver, &admin_indicators(), &opts).await.unwrap_err();
            assert!(matches!(err, TenazError::Timeout { .. }));
        }
    }

    mod property_tests {
        use super::*;

        fn run<F: std::future::Future>(fut: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap()
                .block_on(fut)
        }

        proptest! {
            #[test]
            fn prop_first_satisfying_candidate_wins(present in proptest::collection::vec(any::<bool>(), 1..8)) {
                let locator = Locator::from_candidates(
                    (0..present.len()).map(|i| Selector::test_id(format!("c{i}"))),
                );
                let mut driver = MockDriver::new();
                for (i, here) in present.iter().enumerate() {
                    if *here {
                        driver.add_element(ElementSnapshot::new("div").with_attribute("data-testid", format!("c{i}")));
                    }
                }
                let opts = ResolveOptions::new().with_timeout(Duration::ZERO);
                let res = run(resolve(&driver, &locator, &opts)).unwrap();
                let expected = present.iter().position(|p| *p);
                prop_assert_eq!(res.found().map(|m| m.candidate_index), expected);
            }

            #[test]
            fn prop_any_iff_some_group_found(present in proptest::collection::vec(any::<bool>(), 1..6)) {
                let set: IndicatorSet = (0..present.len())
                    .map(|i| Locator::new(Selector::test_id(format!("g{i}"))))
                    .collect();
                let mut driver = MockDriver::new();
                for (i, here) in present.iter().enumerate() {
                    if *here {
                        driver.add_element(ElementSnapshot::new("div").with_attribute("data-testid", format!("g{i}")));
                    }
                }
                let opts = ResolveOptions::new().with_probe_timeout(Duration::ZERO);
                let any = run(resolve_any(&driver, &set, &opts)).unwrap();
                prop_assert_eq!(any, present.iter().any(|p| *p));
            }
        }
    }
}
