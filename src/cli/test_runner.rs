//! Test dispatcher and aggregator
//!
//! ## TestReporter Trait
//!
//! The dispatcher uses a `TestReporter` trait to separate reporting from execution. Results are handed to the
//! reporter in completion order, from a single task, so implementations need no locking of their own.
//!
//! ## I/O Boundaries
//!
//! Running a job is abstracted via [`JobRunner`] in `test_interfaces.rs`, so the dispatcher can be driven by fake
//! runners in tests. The default runner is `browser::BrowserRunner`.
//!
//! ## Batch lifecycle
//!
//! 1. One task per job is spawned on a `JoinSet`; a semaphore caps how many run at once.
//! 2. Finished jobs and job-level errors go over one results channel to a dedicated reporter task.
//! 3. Once the `JoinSet` is empty the last sender is dropped, the reporter task drains the channel and is awaited,
//!    and only then is the summary printed.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use qutest_core::{RunEnd, TestReport, display_prefix, strip_display_prefix};
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};

use super::test_interfaces::{JobError, JobRunner};
use crate::browser::CoverageSummary;
use crate::config::Palette;
use crate::shutdown::Shutdown;

/// How long an in-flight job may keep running after shutdown fires, to tear its session down.
const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Results buffered between the jobs and the reporter task.
const RESULT_BUFFER: usize = 32;

// ============================================================================
// Jobs and results
// ============================================================================

/// One discovered test file to run in isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestJob {
    /// Unique within the batch; scopes the capture binding name.
    pub id: u64,
    /// Root-relative path with `/` separators.
    pub path: String,
}

/// The outcome of one successful job.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub path: String,
    /// Host-measured time from navigation to captured payload.
    pub elapsed: Duration,
    pub run_end: RunEnd,
    pub coverage: Option<CoverageSummary>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.run_end.passed()
    }
}

/// Errors that abort a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("protocol violation: {0}")]
    Protocol(#[source] JobError),

    #[error("test job panicked: {0}")]
    Panicked(#[source] JoinError),
}

// ============================================================================
// Aggregate statistics
// ============================================================================

/// Running totals, updated concurrently by completing jobs.
#[derive(Debug, Default)]
pub struct AggregateStats {
    passed: AtomicU64,
    failed: AtomicU64,
    completed: AtomicU64,
    errors: AtomicU64,
}

/// A point-in-time copy of [`AggregateStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Passed test cases across all completed jobs
    pub passed: u64,
    /// Failed test cases across all completed jobs
    pub failed: u64,
    /// Jobs that produced a result
    pub completed: u64,
    /// Jobs that failed with a job-level error
    pub errors: u64,
}

impl AggregateStats {
    pub fn record(&self, run_end: &RunEnd) {
        self.passed.fetch_add(run_end.test_counts.passed, Ordering::Relaxed);
        self.failed.fetch_add(run_end.test_counts.failed, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passed: self.passed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Summary of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub stats: StatsSnapshot,
    /// Wall time of the whole batch
    pub elapsed: Duration,
    /// Shutdown fired before every job finished
    pub interrupted: bool,
    /// Jobs that never started or were cancelled mid-run
    pub skipped: u64,
}

impl BatchOutcome {
    /// True iff no test case failed, no job errored and the batch ran to completion.
    pub fn success(&self) -> bool {
        self.stats.failed == 0 && self.stats.errors == 0 && !self.interrupted
    }
}

// ============================================================================
// Test Reporter Trait
// ============================================================================

/// Trait for reporting batch progress.
///
/// Implement this trait to customize output (JSON, TAP, etc.)
pub trait TestReporter: Send + 'static {
    /// Called once with every discovered path, before any job starts
    fn on_collection_complete(&mut self, paths: &[String]);

    /// Called when a job produced a result
    fn on_result(&mut self, result: &RunResult);

    /// Called when a job failed without producing a result
    fn on_job_error(&mut self, error: &JobError);

    /// Called after every result has been reported
    fn on_run_complete(&mut self, outcome: &BatchOutcome);
}

/// Default console reporter
pub struct ConsoleReporter<W: Write = io::Stdout> {
    out: W,
    palette: Palette,
    prefix: String,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout(palette: Palette) -> Self {
        Self::new(io::stdout(), palette)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, palette: Palette) -> Self {
        Self {
            out,
            palette,
            prefix: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_failures(&mut self, run_end: &RunEnd) -> io::Result<()> {
        let failed: Vec<&TestReport> = run_end.failed_tests().collect();
        for test in failed {
            writeln!(self.out, "    {}", test.display_name())?;
            for assertion in test.errors.iter().filter(|a| !a.passed) {
                writeln!(self.out, "      actual:   {}", assertion.actual)?;
                writeln!(self.out, "      expected: {}", assertion.expected)?;
                if let Some(stack) = assertion.stack.as_deref().filter(|s| !s.is_empty()) {
                    for line in stack.lines() {
                        writeln!(self.out, "      {}{}{}", self.palette.dim, line.trim(), self.palette.reset)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_result(&mut self, result: &RunResult) -> io::Result<()> {
        let Palette { green, red, reset, .. } = self.palette;
        let path = strip_display_prefix(&result.path, &self.prefix);
        let elapsed = format_elapsed(result.elapsed);
        let coverage = result
            .coverage
            .map(|c| format!(" coverage {c}"))
            .unwrap_or_default();
        let counts = result.run_end.test_counts;
        if result.passed() {
            writeln!(self.out, "{green}✓ {} pass {elapsed} {path}{coverage}{reset}", counts.passed)
        } else {
            writeln!(self.out, "{red}✗ {} fail {elapsed} {path}{coverage}{reset}", counts.failed)?;
            self.write_failures(&result.run_end)
        }
    }

    fn write_summary(&mut self, outcome: &BatchOutcome) -> io::Result<()> {
        let Palette {
            dim,
            bold,
            green,
            red,
            reset,
        } = self.palette;
        let stats = outcome.stats;
        let elapsed = format_elapsed(outcome.elapsed);
        writeln!(self.out, "{dim}--{reset}")?;
        if outcome.success() {
            return writeln!(self.out, "{bold}{green}✓ {} pass {elapsed}{reset}", stats.passed);
        }
        let mut extra = String::new();
        if stats.errors > 0 {
            extra.push_str(&format!(", {} error{}", stats.errors, plural(stats.errors)));
        }
        if outcome.skipped > 0 {
            extra.push_str(&format!(", {} skipped", outcome.skipped));
        }
        if outcome.interrupted {
            extra.push_str(", interrupted");
        }
        writeln!(self.out, "{bold}{red}✗ {} fail {elapsed}{extra}{reset}", stats.failed)
    }
}

impl<W: Write + Send + 'static> TestReporter for ConsoleReporter<W> {
    fn on_collection_complete(&mut self, paths: &[String]) {
        if paths.is_empty() {
            let _ = writeln!(self.out, "No tests collected");
        }
        self.prefix = display_prefix(paths);
    }

    fn on_result(&mut self, result: &RunResult) {
        let _ = self.write_result(result);
    }

    fn on_job_error(&mut self, error: &JobError) {
        let Palette { red, reset, .. } = self.palette;
        let path = strip_display_prefix(error.path(), &self.prefix).to_string();
        let message = match error {
            JobError::Session { source, state, .. } => format!("{source} (while {state})"),
            JobError::Protocol { source, .. } => source.to_string(),
        };
        let _ = writeln!(self.out, "{red}✗ error {path}: {message}{reset}");
    }

    fn on_run_complete(&mut self, outcome: &BatchOutcome) {
        let _ = self.write_summary(outcome);
        let _ = self.out.flush();
    }
}

fn plural(n: u64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Format a duration truncated to whole milliseconds: `0s`, `850ms`, `1.234s`, `2m3.5s`, `1h0m0s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }

    let secs = total_ms / 1000;
    let frac = total_ms % 1000;
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h{minutes}m"));
    } else if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if frac == 0 {
        out.push_str(&format!("{seconds}s"));
    } else {
        let frac = format!("{frac:03}");
        out.push_str(&format!("{seconds}.{}s", frac.trim_end_matches('0')));
    }
    out
}

// ============================================================================
// Dispatcher
// ============================================================================

enum JobOutcome {
    Finished(RunResult),
    Failed(JobError),
}

/// How a job task ended, as seen by the dispatcher.
enum TaskEnd {
    Reported,
    Dropped,
    Fatal(JobError),
}

/// Run every path as one job and report results as they complete.
///
/// ## Parameters
/// - `runner`: executes a single job.
/// - `paths`: discovered test paths; each becomes exactly one job.
/// - `parallel`: maximum jobs in flight, `None` for unbounded.
/// - `reporter`: receives collection, per-job and summary callbacks.
/// - `shutdown`: stops unstarted jobs from starting and cancels running ones.
///
/// ## Returns
/// - (`BatchOutcome`): totals for the summary and the exit code.
///
/// ## Notes
/// - Job-level errors are reported and counted but never stop sibling jobs.
/// - A protocol error or a panicking job triggers `shutdown` and fails the batch once every task has finished.
pub async fn run_batch<R, P>(
    runner: Arc<R>,
    paths: Vec<String>,
    parallel: Option<usize>,
    mut reporter: P,
    shutdown: &Shutdown,
) -> Result<BatchOutcome, BatchError>
where
    R: JobRunner,
    P: TestReporter,
{
    let started = Instant::now();
    let stats = Arc::new(AggregateStats::default());
    let limit = parallel.map(|n| Arc::new(Semaphore::new(n.max(1))));

    reporter.on_collection_complete(&paths);
    tracing::debug!(jobs = paths.len(), ?parallel, "dispatching batch");

    let (tx, mut rx) = mpsc::channel::<JobOutcome>(RESULT_BUFFER);
    let reporting = tokio::spawn(async move {
        while let Some(outcome) = rx.recv().await {
            match outcome {
                JobOutcome::Finished(result) => reporter.on_result(&result),
                JobOutcome::Failed(error) => reporter.on_job_error(&error),
            }
        }
        reporter
    });

    let mut jobs = JoinSet::new();
    for (id, path) in (0u64..).zip(paths) {
        let job = TestJob { id, path };
        jobs.spawn(run_job(
            Arc::clone(&runner),
            job,
            limit.clone(),
            Arc::clone(&stats),
            tx.clone(),
            shutdown.clone(),
        ));
    }

    let mut skipped = 0;
    let mut failure: Option<BatchError> = None;
    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok(TaskEnd::Reported) => {}
            Ok(TaskEnd::Dropped) => skipped += 1,
            Ok(TaskEnd::Fatal(error)) => {
                tracing::error!("{error}");
                failure.get_or_insert(BatchError::Protocol(error));
            }
            Err(join) => {
                shutdown.trigger();
                failure.get_or_insert(BatchError::Panicked(join));
            }
        }
    }

    // Every job is done: closing the channel lets the reporter task finish draining.
    drop(tx);
    let mut reporter = reporting.await.map_err(BatchError::Panicked)?;
    if let Some(failure) = failure {
        return Err(failure);
    }

    let outcome = BatchOutcome {
        stats: stats.snapshot(),
        elapsed: started.elapsed(),
        interrupted: shutdown.is_triggered(),
        skipped,
    };
    reporter.on_run_complete(&outcome);
    Ok(outcome)
}

async fn run_job<R: JobRunner>(
    runner: Arc<R>,
    job: TestJob,
    limit: Option<Arc<Semaphore>>,
    stats: Arc<AggregateStats>,
    results: mpsc::Sender<JobOutcome>,
    shutdown: Shutdown,
) -> TaskEnd {
    let _permit = match limit {
        Some(limit) => {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return TaskEnd::Dropped,
                permit = limit.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return TaskEnd::Dropped,
                },
            }
        }
        None => None,
    };
    if shutdown.is_triggered() {
        return TaskEnd::Dropped;
    }

    let path = job.path.clone();
    let outcome = tokio::select! {
        outcome = runner.run(job) => outcome,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(CANCEL_GRACE).await;
        } => {
            tracing::warn!(path = %path, "job ignored cancellation, abandoning it");
            return TaskEnd::Dropped;
        }
    };

    let message = match outcome {
        Ok(result) => {
            stats.record(&result.run_end);
            JobOutcome::Finished(result)
        }
        Err(error) if error.is_fatal() => {
            shutdown.trigger();
            return TaskEnd::Fatal(error);
        }
        Err(error) if error.is_cancelled() => {
            tracing::debug!(path = %path, "job cancelled");
            return TaskEnd::Dropped;
        }
        Err(error) => {
            tracing::warn!("{error}");
            stats.record_error();
            JobOutcome::Failed(error)
        }
    };
    // The reporter task outlives every job, so this only fails if it panicked.
    let _ = results.send(message).await;
    TaskEnd::Reported
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::test_interfaces::{SessionError, SessionState};
    use qutest_core::{AssertionReport, TestCounts};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn run_end(passed: u64, failed: u64) -> RunEnd {
        RunEnd {
            full_name: Vec::new(),
            runtime: 1.0,
            status: if failed == 0 { "passed" } else { "failed" }.to_string(),
            test_counts: TestCounts {
                passed,
                failed,
                skipped: 0,
                todo: 0,
                total: passed + failed,
            },
            tests: Vec::new(),
        }
    }

    fn result(path: &str, passed: u64, failed: u64) -> RunResult {
        RunResult {
            path: path.to_string(),
            elapsed: Duration::from_millis(120),
            run_end: run_end(passed, failed),
            coverage: None,
        }
    }

    fn session_error(path: &str, source: SessionError) -> JobError {
        JobError::Session {
            path: path.to_string(),
            state: SessionState::AwaitingResult,
            source,
        }
    }

    fn paths(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    // ========================================
    // Fakes
    // ========================================

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Collected(usize),
        Result(String),
        Error(String),
        Complete(BatchOutcome),
    }

    /// Records every reporter callback.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Event>>>);

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.0.lock().unwrap().clone()
        }

        fn reported_paths(&self) -> Vec<String> {
            let mut paths: Vec<String> = self
                .events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Result(p) | Event::Error(p) => Some(p),
                    _ => None,
                })
                .collect();
            paths.sort();
            paths
        }
    }

    impl TestReporter for Recorder {
        fn on_collection_complete(&mut self, paths: &[String]) {
            self.0.lock().unwrap().push(Event::Collected(paths.len()));
        }

        fn on_result(&mut self, result: &RunResult) {
            self.0.lock().unwrap().push(Event::Result(result.path.clone()));
        }

        fn on_job_error(&mut self, error: &JobError) {
            self.0.lock().unwrap().push(Event::Error(error.path().to_string()));
        }

        fn on_run_complete(&mut self, outcome: &BatchOutcome) {
            self.0.lock().unwrap().push(Event::Complete(*outcome));
        }
    }

    /// Scripted behavior per path.
    #[derive(Clone)]
    enum Script {
        Pass(u64),
        Fail(u64),
        Broken,
        Malformed,
        TimesOut,
        Hang,
        Panic,
    }

    struct FakeRunner {
        scripts: HashMap<String, Script>,
        delay: Duration,
        shutdown: Shutdown,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        started: AtomicUsize,
    }

    impl FakeRunner {
        fn new(scripts: &[(&str, Script)], shutdown: &Shutdown) -> Self {
            Self {
                scripts: scripts.iter().map(|(p, s)| (p.to_string(), s.clone())).collect(),
                delay: Duration::from_millis(5),
                shutdown: shutdown.clone(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl JobRunner for FakeRunner {
        async fn run(&self, job: TestJob) -> Result<RunResult, JobError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let script = self.scripts.get(&job.path).cloned().unwrap_or(Script::Pass(1));
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => Err(session_error(&job.path, SessionError::Cancelled)),
                outcome = async {
                    tokio::time::sleep(self.delay).await;
                    match script {
                        Script::Pass(n) => Ok(result(&job.path, n, 0)),
                        Script::Fail(n) => Ok(result(&job.path, 0, n)),
                        Script::Broken => Err(session_error(
                            &job.path,
                            SessionError::Build { url: format!("/bundle/{}", job.path), status: 500 },
                        )),
                        Script::Malformed => Err(JobError::Protocol {
                            path: job.path.clone(),
                            source: RunEnd::from_payload("{").unwrap_err(),
                        }),
                        Script::TimesOut => Err(session_error(
                            &job.path,
                            SessionError::Timeout(Duration::from_millis(50)),
                        )),
                        Script::Hang => std::future::pending().await,
                        Script::Panic => panic!("runner bug"),
                    }
                } => outcome,
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    // ========================================
    // Dispatcher tests
    // ========================================

    #[tokio::test]
    async fn test_every_job_reported_exactly_once() {
        let shutdown = Shutdown::new();
        let all: Vec<String> = (0..25).map(|i| format!("tests/t{i:02}.js")).collect();
        let scripts: Vec<(&str, Script)> = all
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_str(), if i % 5 == 0 { Script::Broken } else { Script::Pass(2) }))
            .collect();
        let runner = Arc::new(FakeRunner::new(&scripts, &shutdown));
        let recorder = Recorder::default();

        let outcome = run_batch(runner, all.clone(), Some(4), recorder.clone(), &shutdown)
            .await
            .unwrap();

        assert_eq!(recorder.reported_paths(), all);
        assert_eq!(outcome.stats.completed, 20);
        assert_eq!(outcome.stats.errors, 5);
        assert_eq!(outcome.stats.passed, 40);
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_summary_comes_after_all_results() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[], &shutdown));
        let recorder = Recorder::default();

        run_batch(runner, paths(&["a.js", "b.js", "c.js"]), None, recorder.clone(), &shutdown)
            .await
            .unwrap();

        let events = recorder.events();
        assert_eq!(events.first(), Some(&Event::Collected(3)));
        assert!(matches!(events.last(), Some(Event::Complete(_))));
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_failing_assertions_fail_the_batch() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[("b.js", Script::Fail(1))], &shutdown));

        let outcome = run_batch(runner, paths(&["a.js", "b.js"]), None, Recorder::default(), &shutdown)
            .await
            .unwrap();

        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(outcome.stats.passed, 1);
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_build_failure_does_not_affect_sibling() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[("does_not_build.js", Script::Broken)], &shutdown));
        let recorder = Recorder::default();

        let outcome = run_batch(
            runner,
            paths(&["does_not_build.js", "should_pass.js"]),
            None,
            recorder.clone(),
            &shutdown,
        )
        .await
        .unwrap();

        assert!(recorder.events().contains(&Event::Result("should_pass.js".to_string())));
        assert!(recorder.events().contains(&Event::Error("does_not_build.js".to_string())));
        assert_eq!(outcome.stats.errors, 1);
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_all_passing_batch_succeeds() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[], &shutdown));
        let outcome = run_batch(runner, paths(&["a.js"]), Some(1), Recorder::default(), &shutdown)
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test]
    async fn test_parallelism_is_enforced() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[], &shutdown).with_delay(Duration::from_millis(20)));
        let all: Vec<String> = (0..12).map(|i| format!("{i}.js")).collect();

        run_batch(Arc::clone(&runner), all, Some(3), Recorder::default(), &shutdown)
            .await
            .unwrap();

        let max = runner.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {max}");
        assert_eq!(runner.started.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[], &shutdown));
        let recorder = Recorder::default();
        let outcome = run_batch(runner, Vec::new(), None, recorder.clone(), &shutdown)
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(recorder.events().first(), Some(&Event::Collected(0)));
    }

    #[tokio::test]
    async fn test_protocol_error_aborts_batch() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[("bad.js", Script::Malformed)], &shutdown));
        let recorder = Recorder::default();

        let err = run_batch(runner, paths(&["bad.js", "good.js"]), Some(1), recorder.clone(), &shutdown)
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::Protocol(_)));
        assert!(err.to_string().contains("bad.js"));
        assert!(shutdown.is_triggered());
        assert!(!recorder.events().iter().any(|e| matches!(e, Event::Complete(_))));
    }

    #[tokio::test]
    async fn test_panicking_job_aborts_batch() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[("boom.js", Script::Panic)], &shutdown));
        let err = run_batch(runner, paths(&["boom.js"]), None, Recorder::default(), &shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Panicked(_)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_pending_and_in_flight_jobs() {
        let shutdown = Shutdown::new();
        let all: Vec<String> = (0..6).map(|i| format!("{i}.js")).collect();
        let scripts: Vec<(&str, Script)> = all.iter().map(|p| (p.as_str(), Script::Hang)).collect();
        let runner = Arc::new(FakeRunner::new(&scripts, &shutdown));
        let recorder = Recorder::default();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run_batch(Arc::clone(&runner), all, Some(2), recorder.clone(), &shutdown),
        )
        .await
        .expect("batch must not hang after cancellation")
        .unwrap();

        assert!(outcome.interrupted);
        assert!(!outcome.success());
        assert_eq!(outcome.skipped, 6);
        assert_eq!(runner.started.load(Ordering::SeqCst), 2);
        assert!(recorder.reported_paths().is_empty());
    }

    // ========================================
    // Stats tests
    // ========================================

    #[tokio::test]
    async fn test_stats_have_no_lost_updates() {
        let stats = Arc::new(AggregateStats::default());
        let mut tasks = JoinSet::new();
        for _ in 0..64 {
            let stats = Arc::clone(&stats);
            tasks.spawn(async move {
                for _ in 0..100 {
                    stats.record(&run_end(2, 1));
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.completed, 6400);
        assert_eq!(snapshot.passed, 12800);
        assert_eq!(snapshot.failed, 6400);
    }

    // ========================================
    // Reporter tests
    // ========================================

    fn console() -> ConsoleReporter<Vec<u8>> {
        ConsoleReporter::new(Vec::new(), Palette::plain())
    }

    fn output(reporter: ConsoleReporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "0s");
        assert_eq!(format_elapsed(Duration::from_micros(850_900)), "850ms");
        assert_eq!(format_elapsed(Duration::from_millis(1234)), "1.234s");
        assert_eq!(format_elapsed(Duration::from_millis(1200)), "1.2s");
        assert_eq!(format_elapsed(Duration::from_secs(2)), "2s");
        assert_eq!(format_elapsed(Duration::from_millis(123_500)), "2m3.5s");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "1h0m0s");
    }

    #[test]
    fn test_result_lines_strip_common_prefix() {
        let mut reporter = console();
        reporter.on_collection_complete(&paths(&["tests/unit/a.js", "tests/unit/b.ts"]));
        reporter.on_result(&result("tests/unit/a.js", 3, 0));
        reporter.on_job_error(&session_error(
            "tests/unit/b.ts",
            SessionError::Build {
                url: "http://127.0.0.1:1/bundle/tests/unit/b.ts".to_string(),
                status: 500,
            },
        ));
        insta::assert_snapshot!(output(reporter), @r"
        ✓ 3 pass 120ms a.js
        ✗ error b.ts: bundle request http://127.0.0.1:1/bundle/tests/unit/b.ts failed with HTTP 500 (while awaiting result)
        ");
    }

    #[test]
    fn test_failure_detail() {
        let mut failing = result("should_fail.js", 0, 1);
        failing.run_end.tests = vec![TestReport {
            name: "adds".to_string(),
            full_name: vec!["math".to_string(), "adds".to_string()],
            runtime: 2.0,
            status: "failed".to_string(),
            errors: vec![AssertionReport {
                passed: false,
                actual: serde_json::json!(1),
                expected: serde_json::json!(2),
                stack: Some("    at tests/should_fail.js:4:10".to_string()),
                todo: false,
            }],
        }];

        let mut reporter = console();
        reporter.on_collection_complete(&paths(&["should_fail.js"]));
        reporter.on_result(&failing);
        insta::assert_snapshot!(output(reporter), @r"
        ✗ 1 fail 120ms should_fail.js
            math > adds
              actual:   1
              expected: 2
              at tests/should_fail.js:4:10
        ");
    }

    #[test]
    fn test_coverage_on_result_line() {
        let mut covered = result("a.js", 1, 0);
        covered.coverage = Some(CoverageSummary { covered: 3, total: 4 });
        let mut reporter = console();
        reporter.on_collection_complete(&paths(&["a.js"]));
        reporter.on_result(&covered);
        assert_eq!(output(reporter), "✓ 1 pass 120ms a.js coverage 75.0% functions (3/4)\n");
    }

    #[tokio::test]
    async fn test_timeout_fails_only_that_job() {
        let shutdown = Shutdown::new();
        let runner = Arc::new(FakeRunner::new(&[("slow.js", Script::TimesOut)], &shutdown));
        let recorder = Recorder::default();

        let outcome = run_batch(
            runner,
            paths(&["fast.js", "slow.js", "other.js"]),
            Some(2),
            recorder.clone(),
            &shutdown,
        )
        .await
        .unwrap();

        let events = recorder.events();
        assert!(events.contains(&Event::Error("slow.js".to_string())));
        assert!(events.contains(&Event::Result("fast.js".to_string())));
        assert!(events.contains(&Event::Result("other.js".to_string())));
        assert_eq!(outcome.stats.completed, 2);
        assert_eq!(outcome.stats.errors, 1);
        assert!(!outcome.interrupted);
        assert!(!shutdown.is_triggered());
    }

    #[test]
    fn test_summary_lines() {
        let passing = BatchOutcome {
            stats: StatsSnapshot {
                passed: 4,
                failed: 0,
                completed: 2,
                errors: 0,
            },
            elapsed: Duration::from_millis(1500),
            interrupted: false,
            skipped: 0,
        };
        let mut reporter = console();
        reporter.on_run_complete(&passing);
        assert_eq!(output(reporter), "--\n✓ 4 pass 1.5s\n");

        let failing = BatchOutcome {
            stats: StatsSnapshot {
                failed: 2,
                errors: 1,
                ..passing.stats
            },
            interrupted: true,
            skipped: 3,
            ..passing
        };
        let mut reporter = console();
        reporter.on_run_complete(&failing);
        assert_eq!(output(reporter), "--\n✗ 2 fail 1.5s, 1 error, 3 skipped, interrupted\n");
    }

    #[test]
    fn test_colored_output() {
        let mut reporter = ConsoleReporter::new(Vec::new(), Palette::colored());
        reporter.on_collection_complete(&paths(&["a.js"]));
        reporter.on_result(&result("a.js", 1, 0));
        assert_eq!(
            String::from_utf8(reporter.into_inner()).unwrap(),
            "\x1b[32m✓ 1 pass 120ms a.js\x1b[0m\n"
        );
    }

    #[test]
    fn test_no_tests_collected() {
        let mut reporter = console();
        reporter.on_collection_complete(&[]);
        assert_eq!(output(reporter), "No tests collected\n");
    }
}
