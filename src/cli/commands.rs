//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::path::Path;
use std::sync::Arc;

use crate::browser::{BrowserRoot, BrowserRunner};
use crate::bundle::EsbuildBundler;
use crate::config::RunConfig;
use crate::discover::discover;
use crate::server::assets::FrameworkAssets;
use crate::server::{HarnessServer, HarnessState};
use crate::shutdown::Shutdown;
use crate::watch::ChangeWatcher;

use super::test_runner::{ConsoleReporter, TestReporter, run_batch};
use super::{CliError, CliResult, ExitCode};

/// Run the test command: serve, discover, run every test file, report.
///
/// With `watch`, the batch re-runs after every change under the root until interrupted; the exit code reflects the
/// last batch. With `keep_running`, the browser stays open after the final summary until interrupted.
pub async fn run_tests(config: RunConfig) -> CliResult<ExitCode> {
    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    let root = config
        .root
        .canonicalize()
        .map_err(|e| CliError::failure(format!("Error: cannot read test root '{}': {e}", config.root.display())))?;

    let bundler = EsbuildBundler::new(&root, config.esbuild_bin.clone(), &config.bundler_args)
        .map_err(|e| CliError::failure(format!("Error: {e}")))?;
    tracing::debug!(esbuild = %bundler.program().display(), "using bundler");
    let assets = FrameworkAssets::load(&root).await;
    let state = HarnessState::new(Arc::new(bundler), assets);
    let server = HarnessServer::start(state, config.port, shutdown.clone())
        .await
        .map_err(|e| CliError::failure(format!("Error: failed to start harness server: {e}")))?;

    // Browser start-up and the first discovery are independent; overlap them.
    let (browser, discovered) = tokio::join!(
        BrowserRoot::launch(config.visible),
        discover(&root, &config.include, &config.exclude)
    );
    let browser = Arc::new(browser.map_err(|e| CliError::failure(format!("Error: {e}")))?);

    let result = match discovered {
        Ok(paths) => run_with_browser(&config, &root, &browser, &server, paths, &shutdown).await,
        Err(e) => Err(CliError::failure(format!("Error: {e}"))),
    };

    shutdown.trigger();
    match Arc::try_unwrap(browser) {
        Ok(browser) => browser.close().await,
        Err(_) => tracing::debug!("browser still referenced, leaving it to exit with the process"),
    }
    result
}

async fn run_with_browser(
    config: &RunConfig,
    root: &Path,
    browser: &Arc<BrowserRoot>,
    server: &HarnessServer,
    mut paths: Vec<String>,
    shutdown: &Shutdown,
) -> CliResult<ExitCode> {
    let runner = Arc::new(
        BrowserRunner::new(Arc::clone(browser), server.urls(), config.timeout, shutdown.clone())
            .with_coverage(config.coverage)
            .with_keep_alive(config.keep_running),
    );
    let mut watcher = if config.watch {
        let watcher = ChangeWatcher::new(root, &config.exclude)
            .await
            .map_err(|e| CliError::failure(format!("Error: {e}")))?;
        Some(watcher)
    } else {
        None
    };

    let success = loop {
        let mut reporter = ConsoleReporter::stdout(config.palette);
        let success = if paths.is_empty() {
            reporter.on_collection_complete(&paths);
            true
        } else {
            let outcome = run_batch(Arc::clone(&runner), paths, config.parallel, reporter, shutdown)
                .await
                .map_err(|e| CliError::failure(format!("Error: {e}")))?;
            outcome.success()
        };

        let Some(watcher) = watcher.as_mut() else {
            break success;
        };
        if shutdown.is_triggered() {
            break success;
        }
        tracing::info!("watching for changes, press Ctrl-C to quit");
        let changes = watcher
            .changed(shutdown)
            .await
            .map_err(|e| CliError::failure(format!("Error: {e}")))?;
        if changes.is_empty() {
            break success;
        }
        tracing::info!(count = changes.len(), "files changed, re-running");
        paths = discover(root, &config.include, &config.exclude)
            .await
            .map_err(|e| CliError::failure(format!("Error: {e}")))?;
    };

    if config.keep_running && !shutdown.is_triggered() {
        println!("Keeping browser running as requested, press Ctrl-C to quit.");
        shutdown.cancelled().await;
    }

    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
