//! Property-based tests for qutest
//!
//! These tests use proptest to verify invariants of the harness page and report formatting across many randomly
//! generated inputs.

use std::time::Duration;

use proptest::prelude::*;
use qutest::browser::CoverageSummary;
use qutest::cli::test_runner::format_elapsed;
use qutest::server::page::{encode_path, render};

// =============================================================================
// Harness page properties
// =============================================================================

proptest! {
    /// Property: encoded paths only contain URL-safe characters
    #[test]
    fn encoded_path_is_url_safe(path in "\\PC{0,40}") {
        let encoded = encode_path(&path);
        prop_assert!(encoded.bytes().all(|b| b.is_ascii_alphanumeric() || b"-._~/%".contains(&b)));
    }

    /// Property: plain path segments are left as they are
    #[test]
    fn plain_paths_are_unchanged(path in "[a-z0-9_]{1,8}(/[a-z0-9_.-]{1,8}){0,4}") {
        prop_assert_eq!(encode_path(&path), path);
    }

    /// Property: a test path can never inject markup into the harness page
    #[test]
    fn rendered_page_escapes_path(path in "[a-z/]{0,10}<[a-z\"' ]{0,10}>") {
        let html = render(&path, Some("__qutest_run_end_1"));
        let title = html
            .split_once("<title>")
            .and_then(|(_, rest)| rest.split_once("</title>"))
            .map(|(title, _)| title)
            .unwrap_or_default();
        prop_assert!(!title.contains(['<', '>', '"']));
        prop_assert_eq!(html.matches("<script").count(), 3);
    }
}

// =============================================================================
// Report formatting properties
// =============================================================================

proptest! {
    /// Property: sub-second durations print as whole milliseconds
    #[test]
    fn sub_second_elapsed_is_milliseconds(ms in 1u64..1000, extra_micros in 0u64..1000) {
        let formatted = format_elapsed(Duration::from_millis(ms) + Duration::from_micros(extra_micros));
        prop_assert_eq!(formatted, format!("{ms}ms"));
    }

    /// Property: longer durations never print trailing zeros in the fraction
    #[test]
    fn elapsed_has_no_trailing_fraction_zeros(ms in 1000u64..10_000_000) {
        let formatted = format_elapsed(Duration::from_millis(ms));
        prop_assert!(formatted.ends_with('s'));
        if let Some((_, fraction)) = formatted.trim_end_matches('s').split_once('.') {
            prop_assert!(!fraction.ends_with('0'));
        }
    }

    /// Property: coverage never reports more covered functions than exist
    #[test]
    fn coverage_is_bounded(counts in prop::collection::vec(0i64..5, 0..50)) {
        let summary = CoverageSummary::from_call_counts(counts.clone());
        prop_assert_eq!(summary.total, counts.len());
        prop_assert!(summary.covered <= summary.total);
        prop_assert!((0.0..=100.0).contains(&summary.percent()));
    }
}
