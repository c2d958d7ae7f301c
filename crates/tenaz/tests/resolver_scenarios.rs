//! End-to-end resolver scenarios against the in-memory page.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tenaz::{
    expect, resolve, resolve_any, resolve_first, ElementSnapshot, ElementState, IndicatorSet,
    Locator, MockDriver, MockElement, RequiredState, Resolution, ResolveOptions, Selector,
    TenazError,
};
use tokio::time::Instant;

fn email_chain() -> Locator {
    Locator::parse_chain(["role=textbox[name=/username|email/i]", "attr=id=email"])
        .unwrap()
        .named("email")
}

fn email_field() -> ElementSnapshot {
    ElementSnapshot::new("input")
        .with_role("textbox")
        .with_name("Email Address")
        .with_attribute("type", "email")
        .with_attribute("id", "email")
        .with_state(ElementState::default().with_editable(true))
}

fn admin_indicators() -> IndicatorSet {
    IndicatorSet::parse([
        vec!["text=Admin Panel"],
        vec!["text=Manage"],
        vec!["role=navigation"],
    ])
    .unwrap()
    .named("admin")
}

mod found {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn email_textbox_found_via_first_candidate() {
        let page = MockDriver::new().with_element(email_field());
        let res = resolve(&page, &email_chain(), &ResolveOptions::default())
            .await
            .unwrap();
        let m = res.into_match().unwrap();
        assert_eq!(m.candidate_index, 0);
        assert_eq!(m.element.name, "Email Address");
        assert_eq!(m.polls, 1);
        assert_eq!(m.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_used_when_primary_never_matches() {
        let field = ElementSnapshot::new("input").with_attribute("id", "email");
        let page = MockDriver::new().with_element(field);
        let m = resolve(&page, &email_chain(), &ResolveOptions::default())
            .await
            .unwrap()
            .require()
            .unwrap();
        assert_eq!(m.candidate_index, 1);
        assert_eq!(m.selector, Selector::attribute("id", Some("email")));
    }

    #[tokio::test(start_paused = true)]
    async fn element_visible_late_is_found_when_it_appears() {
        let page = MockDriver::new().with_element(
            MockElement::new(email_field()).visible_after(Duration::from_millis(4_000)),
        );
        let start = Instant::now();
        let m = resolve(
            &page,
            &email_chain(),
            &ResolveOptions::new().with_timeout_ms(5_000),
        )
        .await
        .unwrap()
        .require()
        .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(4_000));
        assert!(elapsed <= Duration::from_millis(4_050));
        assert_eq!(m.candidate_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_resolution_is_stable() {
        let page = MockDriver::new()
            .with_element(email_field())
            .with_element(ElementSnapshot::new("input").with_attribute("id", "email"));
        let opts = ResolveOptions::default();
        let first = resolve(&page, &email_chain(), &opts).await.unwrap();
        let second = resolve(&page, &email_chain(), &opts).await.unwrap();
        assert_eq!(first, second);
    }
}

mod not_found {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn not_found_only_after_budget() {
        let page = MockDriver::new();
        let start = Instant::now();
        let res = resolve(
            &page,
            &email_chain(),
            &ResolveOptions::new().with_timeout_ms(1_000),
        )
        .await
        .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000));
        assert!(elapsed <= Duration::from_millis(1_050));

        let Resolution::NotFound(report) = res else {
            panic!("expected NotFound");
        };
        assert_eq!(report.attempts.len(), 2);
        assert!(report.attempts.iter().all(|a| a.matched == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn report_names_unmet_state() {
        let page = MockDriver::new().with_element(email_field().with_state(ElementState::hidden()));
        let res = resolve(
            &page,
            &email_chain(),
            &ResolveOptions::new().with_timeout_ms(200),
        )
        .await
        .unwrap();
        let Resolution::NotFound(report) = res else {
            panic!("expected NotFound");
        };
        let text = report.to_string();
        assert!(text.contains("`email` not visible within 200ms"));
        assert!(text.contains("[0] role=textbox[name=/username|email/i]: 1 match"));
        assert!(text.contains("(unmet: visible)"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_expectation_carries_report() {
        let page = MockDriver::new().with_element(
            ElementSnapshot::new("button")
                .with_attribute("data-testid", "login-button")
                .with_state(ElementState::default().with_enabled(false)),
        );
        let err = expect(&page, Locator::new(Selector::test_id("login-button")))
            .with_timeout(Duration::from_millis(300))
            .to_be_enabled()
            .await
            .unwrap_err();
        assert!(matches!(err, TenazError::AssertionFailed { .. }));
        let text = err.to_string();
        assert!(text.contains("testid=login-button: 1 match"));
        assert!(text.contains("unmet: enabled"));
    }
}

mod any_of {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn absent_indicators_take_one_probe_each() {
        let page = MockDriver::new();
        let start = Instant::now();
        let present = resolve_any(&page, &admin_indicators(), &ResolveOptions::default())
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert!(!present);
        assert!(elapsed >= Duration::from_millis(1_500));
        assert!(elapsed <= Duration::from_millis(1_650));
    }

    #[tokio::test(start_paused = true)]
    async fn any_present_group_answers_true() {
        let page = MockDriver::new().with_element(ElementSnapshot::new("nav").with_role("navigation"));
        let hit = resolve_first(&page, &admin_indicators(), &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.group, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn group_error_is_swallowed_when_others_are_absent() {
        let page = MockDriver::new().fail_query(&Selector::text("Manage"), "stale frame");
        let present = resolve_any(&page, &admin_indicators(), &ResolveOptions::default())
            .await
            .unwrap();
        assert!(!present);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_page_fails_the_check() {
        let page = MockDriver::new().close_page_after(Duration::ZERO);
        let err = resolve_any(&page, &admin_indicators(), &ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TenazError::PageClosed { .. }));
    }
}

mod errors {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn empty_chain_is_rejected_before_querying() {
        let page = MockDriver::new();
        let err = resolve(&page, &Locator::from_candidates(Vec::new()), &ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TenazError::InvalidCandidateSet { .. }));
        assert!(!page.was_called("query_all"));
    }

    #[tokio::test(start_paused = true)]
    async fn page_closing_mid_wait_propagates() {
        let page = MockDriver::new().close_page_after(Duration::from_millis(700));
        let err = resolve(
            &page,
            &email_chain(),
            &ResolveOptions::new().with_timeout_ms(5_000),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TenazError::PageClosed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn outer_deadline_is_a_timeout() {
        let page = MockDriver::new();
        let opts = ResolveOptions::new()
            .with_timeout_ms(5_000)
            .with_deadline(Instant::now() + Duration::from_millis(800));
        let err = resolve(&page, &email_chain(), &opts).await.unwrap_err();
        assert!(matches!(err, TenazError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn required_state_is_honored() {
        let page = MockDriver::new().with_element(email_field().with_state(ElementState::default()));
        let opts = ResolveOptions::new()
            .with_timeout_ms(100)
            .with_state(RequiredState::editable());
        let res = resolve(&page, &email_chain(), &opts).await.unwrap();
        assert!(!res.is_found());
    }
}
