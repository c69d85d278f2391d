//! End-to-end tests running the built binary against `tests/fixtures`.
//!
//! These need Chrome and esbuild on the machine, so they are ignored by default:
//!
//! ```text
//! cargo test --test e2e_tests -- --ignored
//! ```

use std::path::Path;
use std::process::Command;

/// Run qutest in the fixtures directory and return combined output and exit code.
fn run(args: &[&str]) -> (String, i32) {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures");
    let output = Command::new(env!("CARGO_BIN_EXE_qutest"))
        .args(["--root", &fixtures.to_string_lossy()])
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run qutest");
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    (text, output.status.code().unwrap_or(-1))
}

#[test]
#[ignore = "needs Chrome and esbuild"]
fn simple_success() {
    let (out, exit) = run(&["should_pass.js"]);
    assert_eq!(exit, 0, "{out}");
    assert!(out.contains("1 pass"), "{out}");
    assert!(!out.contains("fail"), "{out}");
}

#[test]
#[ignore = "needs Chrome and esbuild"]
fn simple_failure() {
    let (out, exit) = run(&["should_fail.js"]);
    assert_eq!(exit, 1, "{out}");
    assert!(out.contains("1 fail"), "{out}");
    assert!(out.contains("fails on purpose"), "{out}");
}

#[test]
#[ignore = "needs Chrome and esbuild"]
fn typescript_success() {
    let (out, exit) = run(&["a_typescript_file.ts"]);
    assert_eq!(exit, 0, "{out}");
    assert!(out.contains("1 pass"), "{out}");
}

#[test]
#[ignore = "needs Chrome and esbuild"]
fn build_failure_is_isolated() {
    let (out, exit) = run(&["does_not_build.js", "should_pass.js"]);
    assert_eq!(exit, 1, "{out}");
    assert!(out.contains("✓ 1 pass"), "{out}");
    assert!(out.contains("✗ error does_not_build.js"), "{out}");
}

#[test]
#[ignore = "needs Chrome and esbuild"]
fn files_do_not_share_globals() {
    let (out, exit) = run(&["isolation/*.js", "--parallel", "2"]);
    assert_eq!(exit, 0, "{out}");
    assert_eq!(out.matches("1 pass").count(), 2, "{out}");
}

#[test]
#[ignore = "needs Chrome and esbuild"]
fn exclude_removes_files() {
    let (out, exit) = run(&["should_pass.js", "should_fail.js", "--exclude", "should_fail.js"]);
    assert_eq!(exit, 0, "{out}");
    assert!(!out.contains("should_fail"), "{out}");
}

#[test]
#[ignore = "needs Chrome and esbuild"]
fn no_tests_collected_exits_zero() {
    let (out, exit) = run(&["nothing/matches/*.js"]);
    assert_eq!(exit, 0, "{out}");
    assert!(out.contains("No tests collected"), "{out}");
}
