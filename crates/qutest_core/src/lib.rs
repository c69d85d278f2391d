//! Provide the capture payload model and pure helpers shared by the qutest orchestrator and its tests.
//!
//! This crate is intentionally small and dependency-light. It contains the pieces of the harness/host contract that
//! must stay identical on both sides of the browser boundary:
//! - the shape of the `runEnd` summary the harness page sends back ([`run_end`]),
//! - the rules for naming the per-job host binding ([`binding`]),
//! - path helpers used for discovery and display ([`paths`]).
//!
//! ## Notes
//!
//! - This is a “semantic core” crate: **no IO**, no async runtime, no browser or HTTP types.
//! - The layering test in the root crate fails if a browser/HTTP dependency is added here.

pub mod binding;
pub mod paths;
pub mod run_end;

pub use binding::{BINDING_PREFIX, binding_name, is_valid_binding_name};
pub use paths::{display_prefix, longest_common_prefix, merge, strip_display_prefix};
pub use run_end::{AssertionReport, PayloadError, RunEnd, TestCounts, TestReport};
