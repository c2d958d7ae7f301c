//! Tenaz: resilient element location for browser end-to-end tests
//!
//! Real pages drift: ids get renamed, buttons get reworded, menus load late.
//! Tenaz describes each logical UI target as an ordered chain of selector
//! candidates and resolves it by polling the page until some candidate yields
//! an element in the required state, or the budget runs out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       TENAZ Architecture                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌─────────┐  │
//! │  │ Scenario   │   │ Session /  │   │ Resolver   │   │ Page    │  │
//! │  │ Runner     │──►│ Expect     │──►│ (polling)  │──►│ Driver  │  │
//! │  └────────────┘   └────────────┘   └────────────┘   └─────────┘  │
//! │        │                                  │              │       │
//! │   RunConfig                        Locator chains   Chromium/CDP │
//! │   (yaml/json)                      IndicatorSets    MockDriver   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() -> tenaz::TenazResult<()> {
//! use tenaz::{resolve, ElementSnapshot, Locator, MockDriver, ResolveOptions};
//!
//! let page = MockDriver::new().with_element(
//!     ElementSnapshot::new("input")
//!         .with_role("textbox")
//!         .with_name("Email Address")
//!         .with_attribute("id", "email"),
//! );
//! let email = Locator::parse_chain(["role=textbox[name=/username|email/i]", "attr=id=email"])?;
//!
//! let found = resolve(&page, &email, &ResolveOptions::default()).await?.require()?;
//! assert_eq!(found.candidate_index, 0);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod assertion;
#[cfg(feature = "browser")]
mod browser;
mod config;
mod css;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod driver;
mod locator;
mod resolver;
mod result;
mod runner;
mod selector;
mod session;
mod trace;
mod wait;

pub use assertion::{expect, expect_any, Expect};
#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, ChromiumFactory, CHROMIUM_PATH_ENV};
pub use config::{
    sanitize_path_segment, BrowserKind, Device, Project, RecordMode, RunConfig, ScreenshotMode,
    TraceMode, UseOptions, VideoMode, DEFAULT_CONFIG_FILE, DEFAULT_SCENARIO_TIMEOUT_MS,
    STARTER_CONFIG,
};
pub use driver::{
    BoxedDriver, BrowserConfig, CallHistory, DeviceDescriptor, ElementSnapshot, ElementState,
    MockDriver, MockElement, PageDriver, Screenshot,
};
pub use locator::{IndicatorSet, Locator};
pub use resolver::{
    resolve, resolve_any, resolve_first, resolve_matching, CandidateAttempt, IndicatorHit, Match,
    NotFoundReport, Resolution, CONDITION_UNMET,
};
pub use result::{TenazError, TenazResult};
pub use runner::{
    AttemptReport, DriverFactory, LaunchRequest, Scenario, ScenarioFn, ScenarioReport,
    ScenarioRunner, ScenarioStatus, SuiteReport,
};
pub use selector::{normalize_whitespace, Pattern, Selector, TextMatch};
pub use session::{ScopeOutcome, Session};
pub use trace::{StepKind, StepStatus, TraceArchive, TraceEvent, TraceLog, TraceMetadata};
pub use wait::{
    poll_until, Deadline, RequiredState, ResolveOptions, Tick, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_TIMEOUT_MS,
};

/// Everything a scenario file usually needs
pub mod prelude {
    pub use super::assertion::{expect, expect_any};
    pub use super::locator::{IndicatorSet, Locator};
    pub use super::resolver::{resolve, resolve_any, resolve_first, Resolution};
    pub use super::result::{TenazError, TenazResult};
    pub use super::runner::{Scenario, ScenarioRunner};
    pub use super::selector::{Selector, TextMatch};
    pub use super::session::Session;
    pub use super::wait::{RequiredState, ResolveOptions};
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod error_tests {
        use super::*;

        #[test]
        fn test_error_display() {
            let err = TenazError::BrowserNotFound;
            assert!(err.to_string().contains("CHROMIUM_PATH"));
            let err = TenazError::Timeout { ms: 5000 };
            assert!(err.to_string().contains("5000"));
        }

        #[test]
        fn test_error_classes() {
            assert!(TenazError::invalid_candidates("empty").is_usage());
            assert!(TenazError::page_closed("gone").is_environment());
            assert!(!TenazError::Timeout { ms: 1 }.is_environment());
        }
    }

    mod reexport_tests {
        use super::*;

        #[test]
        fn test_prelude_builds_a_chain() {
            use crate::prelude::*;
            let loc = Locator::new(Selector::test_id("submit")).or(Selector::css("button[type=submit]"));
            assert_eq!(loc.chain_string(), "testid=submit | css=button[type=submit]");
            assert_eq!(ResolveOptions::default().state, RequiredState::visible());
        }
    }
}
