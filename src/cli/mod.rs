//! CLI module for qutest
//!
//! This module provides the command-line interface: `qutest [INCLUDE]... [OPTIONS]`.
//!
//! ## Modules
//!
//! - `commands` - The test command: discovery, server, browser, batch and watch loop
//! - `test_interfaces` - Trait seams and error taxonomy
//! - `test_runner` - Dispatcher, aggregate statistics and reporting
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;
pub mod test_interfaces;
pub mod test_runner;

use std::fmt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;

use crate::config::{Palette, RunConfig, parse_duration};
use crate::version::QUTEST_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Run QUnit test files in isolated headless Chrome sessions
#[derive(Parser, Debug)]
#[command(name = "qutest")]
#[command(version = QUTEST_VERSION)]
#[command(about = "Run QUnit test files in isolated headless Chrome sessions", long_about = None)]
pub struct Cli {
    /// Globs selecting test files [default: **/*.js **/*.ts **/*.jsx **/*.tsx]
    #[arg(value_name = "INCLUDE")]
    pub include: Vec<String>,

    /// Root directory tests are discovered in and served from
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Globs to exclude (repeatable) [default: **/node_modules]
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Extra esbuild arguments, as a single string
    #[arg(long = "esbuild", value_name = "ARGS", default_value = "", allow_hyphen_values = true)]
    pub esbuild_args: String,

    /// esbuild executable [default: node_modules/.bin/esbuild, then esbuild on PATH]
    #[arg(long, value_name = "PATH")]
    pub esbuild_bin: Option<PathBuf>,

    /// Report function coverage of each test bundle
    #[arg(long)]
    pub coverage: bool,

    /// Timeout for each test file (e.g. 500ms, 30s, 2m)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration, default_value = "60s")]
    pub timeout: Duration,

    /// Maximum test files running at once; 0 means unbounded [default: number of CPUs]
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Re-run tests when files under the root change
    #[arg(long)]
    pub watch: bool,

    /// Show the browser window
    #[arg(long)]
    pub visible: bool,

    /// Keep the browser and test pages open after the run
    #[arg(long)]
    pub keep_running: bool,

    /// Fixed port for the harness server [default: ephemeral]
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,
}

impl Cli {
    /// Build the run configuration; `palette` is decided once by the caller.
    pub fn into_config(self, palette: Palette) -> RunConfig {
        let mut config = RunConfig::new()
            .with_root(self.root)
            .with_include(self.include)
            .with_exclude(self.exclude)
            .with_timeout(self.timeout)
            .with_palette(palette);
        if let Some(parallel) = self.parallel {
            config = config.with_parallel(parallel);
        }
        config.bundler_args = self.esbuild_args;
        config.esbuild_bin = self.esbuild_bin;
        config.coverage = self.coverage;
        config.watch = self.watch;
        config.visible = self.visible;
        config.keep_running = self.keep_running;
        config.port = self.port;
        config
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();
    let config = cli.into_config(Palette::from_env());

    match execute(config) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Build the async runtime and run the test command on it.
fn execute(config: RunConfig) -> CliResult<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failure(format!("Error: failed to start async runtime: {e}")))?;
    runtime.block_on(commands::run_tests(config))
}

// ============================================================================
// Tests
// ============================================================================
