//! Wait budgets and required element state.
//!
//! Polling never busy-loops: every round ends with a `tokio::time::sleep` of
//! at most the poll interval, clipped to whatever budget is left. Time comes
//! from `tokio::time::Instant`, so paused-clock tests are deterministic.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::driver::ElementState;
use crate::result::{TenazError, TenazResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default budget for a required resolution (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default per-group budget inside an any-of check (500ms)
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 500;

// =============================================================================
// REQUIRED STATE
// =============================================================================

/// State an element must be in for a candidate to count as resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredState {
    /// Must be visible
    pub visible: bool,
    /// Must be enabled
    pub enabled: bool,
    /// Must accept text input
    pub editable: bool,
    /// Must have this checked state
    pub checked: Option<bool>,
}

impl Default for RequiredState {
    fn default() -> Self {
        Self::visible()
    }
}

impl RequiredState {
    /// Present in the DOM, any state
    #[must_use]
    pub const fn attached() -> Self {
        Self {
            visible: false,
            enabled: false,
            editable: false,
            checked: None,
        }
    }

    /// Visible
    #[must_use]
    pub const fn visible() -> Self {
        Self {
            visible: true,
            ..Self::attached()
        }
    }

    /// Visible and enabled
    #[must_use]
    pub const fn actionable() -> Self {
        Self {
            visible: true,
            enabled: true,
            ..Self::attached()
        }
    }

    /// Visible, enabled and editable
    #[must_use]
    pub const fn editable() -> Self {
        Self {
            visible: true,
            enabled: true,
            editable: true,
            checked: None,
        }
    }

    /// Add an enabled requirement
    #[must_use]
    pub const fn and_enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Add a checked-state requirement
    #[must_use]
    pub const fn and_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    /// Whether `state` satisfies every requirement
    #[must_use]
    pub fn is_satisfied_by(&self, state: &ElementState) -> bool {
        self.unmet(state).is_empty()
    }

    /// Names of the requirements `state` fails
    #[must_use]
    pub fn unmet(&self, state: &ElementState) -> Vec<&'static str> {
        let mut unmet = Vec::new();
        if self.visible && !state.visible {
            unmet.push("visible");
        }
        if self.enabled && !state.enabled {
            unmet.push("enabled");
        }
        if self.editable && !state.editable {
            unmet.push("editable");
        }
        match (self.checked, state.checked) {
            (Some(true), Some(true)) | (Some(false), Some(false) | None) | (None, _) => {}
            (Some(true), _) => unmet.push("checked"),
            (Some(false), Some(true)) => unmet.push("unchecked"),
        }
        unmet
    }
}

impl fmt::Display for RequiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.visible {
            parts.push("visible");
        }
        if self.enabled {
            parts.push("enabled");
        }
        if self.editable {
            parts.push("editable");
        }
        match self.checked {
            Some(true) => parts.push("checked"),
            Some(false) => parts.push("unchecked"),
            None => {}
        }
        if parts.is_empty() {
            write!(f, "attached")
        } else {
            write!(f, "{}", parts.join(","))
        }
    }
}

impl FromStr for RequiredState {
    type Err = TenazError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut state = Self::attached();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "attached" => {}
                "visible" => state.visible = true,
                "enabled" => state.enabled = true,
                "editable" => state.editable = true,
                "checked" => state.checked = Some(true),
                "unchecked" => state.checked = Some(false),
                other => {
                    return Err(TenazError::config(format!(
                        "unknown element state `{other}` (expected attached, visible, enabled, editable, checked, unchecked)"
                    )))
                }
            }
        }
        Ok(state)
    }
}

// =============================================================================
// RESOLVE OPTIONS
// =============================================================================

/// Options for resolver calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Required element state
    pub state: RequiredState,
    /// Budget for one `resolve` call
    pub timeout: Duration,
    /// Sleep between polling rounds
    pub poll_interval: Duration,
    /// Per-group budget inside `resolve_any`/`resolve_first`
    pub probe_timeout: Duration,
    /// Outer deadline (the scenario's own timeout)
    pub deadline: Option<Instant>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            state: RequiredState::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            deadline: None,
        }
    }
}

impl ResolveOptions {
    /// Create new options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set required state
    #[must_use]
    pub const fn with_state(mut self, state: RequiredState) -> Self {
        self.state = state;
        self
    }

    /// Set budget
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set budget in milliseconds
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    /// Set polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set per-group probe budget
    #[must_use]
    pub const fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Set the outer deadline
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The options one indicator group is resolved with
    #[must_use]
    pub const fn for_probe(&self) -> Self {
        let mut probe = *self;
        probe.timeout = self.probe_timeout;
        probe
    }
}

// =============================================================================
// DEADLINE
// =============================================================================

/// What a polling loop should do after a round that found nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Sleep this long, then poll again
    Sleep(Duration),
    /// Own budget spent
    Exhausted,
    /// Outer deadline passed before the own budget
    OuterDeadline,
}

/// Budget tracker for one polling loop
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    expires: Instant,
    outer: Option<Instant>,
}

impl Deadline {
    /// Start the clock for `options.timeout`
    #[must_use]
    pub fn start(options: &ResolveOptions) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires: started + options.timeout,
            outer: options.deadline,
        }
    }

    /// Time since start
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Decide the next step after an unsuccessful round
    #[must_use]
    pub fn tick(&self, poll_interval: Duration) -> Tick {
        let now = Instant::now();
        if let Some(outer) = self.outer {
            if outer < self.expires && now >= outer {
                return Tick::OuterDeadline;
            }
        }
        if now >= self.expires {
            return Tick::Exhausted;
        }
        let stop = self.outer.map_or(self.expires, |o| o.min(self.expires));
        Tick::Sleep(poll_interval.min(stop.saturating_duration_since(now)))
    }

    /// `Timeout` error for an expired outer deadline
    #[must_use]
    pub fn timeout_error(&self) -> TenazError {
        TenazError::Timeout {
            ms: u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Poll `probe` until it yields `Some`, the budget runs out (`Ok(None)`), or
/// it fails. The outer deadline surfaces as `TenazError::Timeout`.
///
/// # Errors
///
/// Propagates the first probe error, or `Timeout` for the outer deadline.
pub async fn poll_until<T, F, Fut>(options: &ResolveOptions, mut probe: F) -> TenazResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TenazResult<Option<T>>>,
{
    let deadline = Deadline::start(options);
    loop {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }
        match deadline.tick(options.poll_interval) {
            Tick::Sleep(wait) => tokio::time::sleep(wait).await,
            Tick::Exhausted => return Ok(None),
            Tick::OuterDeadline => return Err(deadline.timeout_error()),
        }
    }
}
