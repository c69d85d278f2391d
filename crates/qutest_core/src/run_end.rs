//! Define the `runEnd` summary sent by the harness page through the capture binding.
//!
//! The harness page serializes QUnit's `runEnd` event object with `JSON.stringify` and hands the text to the host
//! binding exactly once. The host decodes it with [`RunEnd::from_payload`].
//!
//! ## Notes
//! - The page side of this contract is generated by the orchestrator itself, so a payload that does not decode is a
//!   contract violation rather than a user error. Callers are expected to treat [`PayloadError`] as fatal.
//! - Only `status` and `testCounts` are required; per-test detail is optional and defaults to empty.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The status string QUnit reports for a fully passing run or test.
pub const STATUS_PASSED: &str = "passed";

/// Error returned when a capture payload does not match the `runEnd` shape.
#[derive(Debug, Error)]
#[error("malformed runEnd payload: {source}")]
pub struct PayloadError {
    #[from]
    source: serde_json::Error,
}

/// Aggregate assertion-case counts for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub todo: u64,
    pub total: u64,
}

/// One assertion recorded against a test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssertionReport {
    pub passed: bool,
    pub actual: Value,
    pub expected: Value,
    pub stack: Option<String>,
    pub todo: bool,
}

/// Per-test-case detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestReport {
    pub name: String,
    pub full_name: Vec<String>,
    pub runtime: f64,
    pub status: String,
    pub errors: Vec<AssertionReport>,
}

impl TestReport {
    /// Whether QUnit reported this case as passed.
    pub fn passed(&self) -> bool {
        self.status == STATUS_PASSED
    }

    /// The case name including its module path, joined the way QUnit's HTML reporter shows it.
    pub fn display_name(&self) -> String {
        if self.full_name.is_empty() {
            self.name.clone()
        } else {
            self.full_name.join(" > ")
        }
    }
}

/// The structured outcome of one harness page run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEnd {
    #[serde(default)]
    pub full_name: Vec<String>,
    /// Runtime reported by the page, in milliseconds. Informational only.
    #[serde(default)]
    pub runtime: f64,
    pub status: String,
    pub test_counts: TestCounts,
    #[serde(default)]
    pub tests: Vec<TestReport>,
}

impl RunEnd {
    /// Decode a capture payload.
    ///
    /// ## Parameters
    /// - `payload`: the string argument the page passed to the binding.
    ///
    /// ## Returns
    /// - (`RunEnd`): the decoded summary, or a [`PayloadError`] naming the serde failure.
    pub fn from_payload(payload: &str) -> Result<Self, PayloadError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Whether the overall run passed.
    pub fn passed(&self) -> bool {
        self.status == STATUS_PASSED
    }

    /// Test cases that did not pass, in page order.
    pub fn failed_tests(&self) -> impl Iterator<Item = &TestReport> {
        self.tests.iter().filter(|t| !t.passed() && t.status != "skipped" && t.status != "todo")
    }
}
