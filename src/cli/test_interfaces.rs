//! Test runner I/O boundary interfaces
//!
//! This module defines the trait seams between the dispatcher and the outside world:
//! - Bundling (source file → browser-loadable module)
//! - Job execution (one test file → one isolated browser session → one result)
//!
//! and the error taxonomy each layer reports. Default implementations live next to the code they drive
//! (`bundle::EsbuildBundler`, `browser::BrowserRunner`); tests substitute their own.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::error::CdpError;
use qutest_core::PayloadError;
use thiserror::Error;

use crate::bundle::BuildMessage;
use crate::cli::test_runner::{RunResult, TestJob};

// ============================================================================
// Errors
// ============================================================================

/// Errors that occur while discovering test files. All of them are fatal.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid {kind} pattern '{pattern}': {source}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("cannot read test root '{}': {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk test root: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("discovery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors reported by a [`Bundler`].
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("invalid bundler arguments: {0}")]
    InvalidArguments(String),

    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build failed with {} error(s)", .0.len())]
    Build(Vec<BuildMessage>),
}

impl BundleError {
    /// The error as a list of build messages, for the JSON error body.
    pub fn messages(&self) -> Vec<BuildMessage> {
        match self {
            BundleError::Build(messages) => messages.clone(),
            other => vec![BuildMessage::text(other.to_string())],
        }
    }
}

/// Errors starting the shared browser. Fatal: no job can run without it.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid browser configuration: {0}")]
    Config(String),

    #[error("failed to launch browser: {0}")]
    Launch(#[source] CdpError),
}

/// Where a job was in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Navigating,
    AwaitingResult,
    Completed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "creating session",
            SessionState::Navigating => "navigating",
            SessionState::AwaitingResult => "awaiting result",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Job-level failures. These fail one job and never its siblings.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create browser session: {0}")]
    Allocate(#[source] CdpError),

    #[error("invalid session parameters: {0}")]
    Params(String),

    #[error("failed to subscribe to page events: {0}")]
    Subscribe(#[source] CdpError),

    #[error("failed to register capture binding: {0}")]
    Binding(#[source] CdpError),

    #[error("navigation failed: {0}")]
    Navigation(#[source] CdpError),

    #[error("bundle request {url} failed with HTTP {status}")]
    Build { url: String, status: i64 },

    #[error("failed to load {url}: {reason}")]
    Load { url: String, reason: String },

    #[error("no result within {0:?}")]
    Timeout(Duration),

    #[error("page closed before reporting a result")]
    Disconnected,

    #[error("cancelled")]
    Cancelled,

    #[error("coverage collection failed: {0}")]
    Coverage(#[source] CdpError),
}

/// The failure of one job, as seen by the dispatcher.
#[derive(Debug, Error)]
pub enum JobError {
    /// A session, navigation or build problem; logged and counted.
    #[error("{path}: {source} (while {state})")]
    Session {
        path: String,
        state: SessionState,
        #[source]
        source: SessionError,
    },

    /// The page reported something that is not a `runEnd` summary; aborts the batch.
    #[error("{path}: {source}")]
    Protocol {
        path: String,
        #[source]
        source: PayloadError,
    },
}

impl JobError {
    /// Whether this error must stop the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::Protocol { .. })
    }

    /// Whether the job stopped because the batch was cancelled. Such jobs produce no outcome at all.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            JobError::Session {
                source: SessionError::Cancelled,
                ..
            }
        )
    }

    /// The test path the job was running.
    pub fn path(&self) -> &str {
        match self {
            JobError::Session { path, .. } | JobError::Protocol { path, .. } => path,
        }
    }
}

// ============================================================================
// Bundler Interface
// ============================================================================

/// Turn a test source file into a single ES module the harness page can load.
///
/// Bundling is blocking work; the harness server calls it on the blocking pool.
pub trait Bundler: Send + Sync + 'static {
    /// Bundle `entry` (a path relative to the test root).
    fn bundle(&self, entry: &Path) -> Result<Vec<u8>, BundleError>;
}

// ============================================================================
// Job Runner Interface
// ============================================================================

/// Run one test job to completion.
///
/// The dispatcher owns concurrency, cancellation and reporting; a runner only has to turn one job into one result
/// or one error.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, job: TestJob) -> impl Future<Output = Result<RunResult, JobError>> + Send;
}
