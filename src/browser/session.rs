//! Per-job browser session
//!
//! ## State machine
//!
//! `Created → Navigating → AwaitingResult → {Completed | Failed}`
//!
//! - **Created**: allocate a fresh browser context and a blank page inside it, subscribe to network responses,
//!   register the job-scoped capture binding, and start coverage when requested.
//! - **Navigating**: load the harness page for the job's test path.
//! - **AwaitingResult**: wait for the binding payload, or for the bundle or QUnit request to fail.
//! - **Completed**: payload decoded into a [`RunEnd`].
//!
//! Every await is bounded by one per-job deadline and raced against the shutdown signal. Page and context are
//! disposed on both the success and the failure path, unless sessions are kept alive for inspection.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::EnableParams as EnableNetworkParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::profiler;
use futures::{Stream, StreamExt};
use qutest_core::{RunEnd, binding_name};
use tokio::time::Instant;

use super::BrowserRoot;
use super::capture::CaptureBinding;
use super::coverage::CoverageSummary;
use super::network::{self, PageSignal};
use crate::cli::test_interfaces::{JobError, JobRunner, SessionError, SessionState};
use crate::cli::test_runner::{RunResult, TestJob};
use crate::server::HarnessUrls;
use crate::server::assets::AssetKind;
use crate::shutdown::Shutdown;

/// Upper bound on closing one page and its context.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `step` unless the deadline passes or shutdown fires first.
///
/// Expiry is reported as the configured per-job `timeout`, not the time left for this step.
async fn bounded<T, F>(shutdown: &Shutdown, deadline: Instant, timeout: Duration, step: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(SessionError::Cancelled),
        out = tokio::time::timeout_at(deadline, step) => {
            out.unwrap_or_else(|_| Err(SessionError::Timeout(timeout)))
        }
    }
}

/// Requests whose failure means the page can never report.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WatchedUrls {
    bundle: String,
    framework: String,
}

impl WatchedUrls {
    fn for_test(urls: &HarnessUrls, test_path: &str) -> Self {
        Self {
            bundle: urls.bundle(test_path),
            framework: urls.asset(AssetKind::Script),
        }
    }

    fn check(&self, signal: &PageSignal) -> Option<SessionError> {
        match signal {
            PageSignal::Response { url, status } if *status >= 400 => {
                if *url == self.bundle {
                    Some(SessionError::Build {
                        url: url.clone(),
                        status: *status,
                    })
                } else if *url == self.framework {
                    Some(SessionError::Load {
                        url: url.clone(),
                        reason: format!("HTTP {status}"),
                    })
                } else {
                    None
                }
            }
            PageSignal::Failed { url, reason } if *url == self.bundle || *url == self.framework => {
                Some(SessionError::Load {
                    url: url.clone(),
                    reason: reason.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Wait for the page's payload while watching its requests.
///
/// A failed watched request resolves the job at once; the binding would otherwise never be called.
async fn await_result<S, P>(signals: S, payload: P, watched: &WatchedUrls) -> Result<String, SessionError>
where
    S: Stream<Item = PageSignal>,
    P: Future<Output = Option<String>>,
{
    let mut signals = pin!(signals.fuse());
    let mut payload = pin!(payload);
    loop {
        tokio::select! {
            biased;
            Some(signal) = signals.next() => {
                if let Some(error) = watched.check(&signal) {
                    return Err(error);
                }
            }
            received = &mut payload => return received.ok_or(SessionError::Disconnected),
        }
    }
}

/// Runs jobs in isolated sessions of a shared browser, against one harness server.
pub struct BrowserRunner {
    root: Arc<BrowserRoot>,
    urls: HarnessUrls,
    timeout: Duration,
    coverage: bool,
    keep_alive: bool,
    shutdown: Shutdown,
}

impl BrowserRunner {
    pub fn new(root: Arc<BrowserRoot>, urls: HarnessUrls, timeout: Duration, shutdown: Shutdown) -> Self {
        Self {
            root,
            urls,
            timeout,
            coverage: false,
            keep_alive: false,
            shutdown,
        }
    }

    pub fn with_coverage(mut self, coverage: bool) -> Self {
        self.coverage = coverage;
        self
    }

    /// Leave pages and contexts open after each job.
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    async fn bounded<T, F>(&self, deadline: Instant, step: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        bounded(&self.shutdown, deadline, self.timeout, step).await
    }
}

impl JobRunner for BrowserRunner {
    async fn run(&self, job: TestJob) -> Result<RunResult, JobError> {
        let deadline = Instant::now() + self.timeout;
        let mut session = Session::new(self, &job.path);
        let driven = session.drive(&binding_name(job.id), deadline).await;
        session.teardown().await;

        let (payload, elapsed, coverage) = driven.map_err(|(state, source)| JobError::Session {
            path: job.path.clone(),
            state,
            source,
        })?;
        let run_end = RunEnd::from_payload(&payload).map_err(|source| JobError::Protocol {
            path: job.path.clone(),
            source,
        })?;
        tracing::debug!(path = %job.path, status = %run_end.status, "job completed");
        Ok(RunResult {
            path: job.path,
            elapsed,
            run_end,
            coverage,
        })
    }
}

type Captured = (String, Duration, Option<CoverageSummary>);

struct Session<'a> {
    runner: &'a BrowserRunner,
    path: &'a str,
    state: SessionState,
    context: Option<BrowserContextId>,
    page: Option<Page>,
}

impl<'a> Session<'a> {
    fn new(runner: &'a BrowserRunner, path: &'a str) -> Self {
        Self {
            runner,
            path,
            state: SessionState::Created,
            context: None,
            page: None,
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(path = self.path, from = %self.state, to = %next, "session state");
        self.state = next;
    }

    /// Run the session to completion. Errors carry the state the session failed in.
    async fn drive(&mut self, binding: &str, deadline: Instant) -> Result<Captured, (SessionState, SessionError)> {
        match self.capture(binding, deadline).await {
            Ok(captured) => {
                self.transition(SessionState::Completed);
                Ok(captured)
            }
            Err(e) => {
                let failed_in = self.state;
                self.transition(SessionState::Failed);
                Err((failed_in, e))
            }
        }
    }

    async fn capture(&mut self, binding: &str, deadline: Instant) -> Result<Captured, SessionError> {
        let runner = self.runner;
        let browser = runner.root.browser();

        let created = runner
            .bounded(deadline, async {
                browser
                    .execute(CreateBrowserContextParams::default())
                    .await
                    .map_err(SessionError::Allocate)
            })
            .await?;
        let context = created.result.browser_context_id.clone();
        self.context = Some(context.clone());

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context)
            .build()
            .map_err(SessionError::Params)?;
        let page = runner
            .bounded(deadline, async { browser.new_page(target).await.map_err(SessionError::Allocate) })
            .await?;
        self.page = Some(page.clone());

        let (signals, mut capture) = runner
            .bounded(deadline, async {
                let signals = network::listen(&page).await.map_err(SessionError::Subscribe)?;
                page.execute(EnableNetworkParams::default())
                    .await
                    .map_err(SessionError::Subscribe)?;
                let capture = CaptureBinding::register(&page, binding)
                    .await
                    .map_err(SessionError::Binding)?;
                Ok::<_, SessionError>((signals, capture))
            })
            .await?;

        if runner.coverage {
            runner
                .bounded(deadline, async {
                    page.execute(profiler::EnableParams::default())
                        .await
                        .map_err(SessionError::Coverage)?;
                    let start = profiler::StartPreciseCoverageParams::builder()
                        .call_count(true)
                        .detailed(false)
                        .build();
                    page.execute(start).await.map_err(SessionError::Coverage)?;
                    Ok::<_, SessionError>(())
                })
                .await?;
        }

        self.transition(SessionState::Navigating);
        let url = runner.urls.test_page(self.path, binding);
        let started = Instant::now();
        runner
            .bounded(deadline, async {
                page.goto(url).await.map(|_| ()).map_err(SessionError::Navigation)
            })
            .await?;

        self.transition(SessionState::AwaitingResult);
        let watched = WatchedUrls::for_test(&runner.urls, self.path);
        let payload = runner
            .bounded(deadline, await_result(signals, capture.recv(), &watched))
            .await?;
        let elapsed = started.elapsed();

        let coverage = if runner.coverage {
            let taken = runner
                .bounded(deadline, async {
                    page.execute(profiler::TakePreciseCoverageParams::default())
                        .await
                        .map_err(SessionError::Coverage)
                })
                .await?;
            Some(CoverageSummary::from_scripts(&taken.result.result))
        } else {
            None
        };

        Ok((payload, elapsed, coverage))
    }

    async fn teardown(self) {
        if self.runner.keep_alive {
            tracing::debug!(path = self.path, "keeping session open");
            return;
        }
        let browser = self.runner.root.browser();
        let path = self.path;
        let closed = tokio::time::timeout(TEARDOWN_TIMEOUT, async move {
            if let Some(page) = self.page {
                if let Err(e) = page.close().await {
                    tracing::debug!(path, "closing page: {e}");
                }
            }
            if let Some(context) = self.context {
                if let Err(e) = browser.execute(DisposeBrowserContextParams::new(context)).await {
                    tracing::debug!(path, "disposing browser context: {e}");
                }
            }
        })
        .await;
        if closed.is_err() {
            tracing::warn!(path, "session teardown timed out");
        }
    }
}
