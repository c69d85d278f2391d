//! Layering guardrails to keep `qutest_core` free of runtime stacks.
//!
//! `qutest_core` holds the payload model and pure helpers shared by the orchestrator and its tests. It must stay
//! usable without a browser, an HTTP server or an async runtime. This test scans its `Cargo.toml` and fails if any
//! of those stacks appears in `[dependencies]`.

const FORBIDDEN: &[&str] = &["chromiumoxide", "axum", "tokio", "futures", "tower"];

#[test]
fn core_does_not_depend_on_runtime_stacks() {
    let manifest = include_str!("../crates/qutest_core/Cargo.toml");
    let mut in_dependencies = false;

    for raw_line in manifest.lines() {
        let line = raw_line.trim();
        // Track when we enter/exit the `[dependencies]` table.
        if line.starts_with('[') {
            in_dependencies = line == "[dependencies]";
            continue;
        }

        if !in_dependencies || line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Strip inline comments for robustness.
        let line_no_comment = line.split('#').next().unwrap_or("").trim();
        let name = line_no_comment.split(['=', ' ', '.']).next().unwrap_or("");
        assert!(
            !FORBIDDEN.contains(&name),
            "`{name}` must not appear in qutest_core's [dependencies]; keep runtime code in the qutest crate"
        );
    }
}

#[test]
fn core_is_a_workspace_member() {
    let manifest = include_str!("../Cargo.toml");
    assert!(manifest.contains("\"crates/qutest_core\""));
}
