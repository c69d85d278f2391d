#![forbid(unsafe_code)]
//! qutest: run QUnit test files in isolated headless Chrome sessions
//!
//! Each discovered test file is bundled with esbuild, served inside a minimal harness page by an embedded HTTP
//! server, and loaded in its own browser context. The page reports QUnit's `runEnd` summary back through a
//! job-scoped binding; results are printed in completion order, followed by one summary line.
//!
//! ## Modules
//!
//! - `discover` - glob-based test discovery
//! - `bundle` - esbuild invocation and build-error parsing
//! - `server` - harness page, bundle and QUnit asset routes
//! - `browser` - shared browser root, capture binding, per-job sessions, coverage
//! - `cli` - argument parsing, dispatcher, reporter
//! - `watch` - change polling for `--watch`
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.

pub mod browser;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod discover;
pub mod server;
pub mod shutdown;
pub mod version;
pub mod watch;

pub use cli::test_runner::{BatchOutcome, RunResult, TestJob};
pub use config::{Palette, RunConfig};
