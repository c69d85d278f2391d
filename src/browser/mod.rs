//! Shared browser root and per-job sessions
//!
//! One Chrome process is launched per invocation ([`BrowserRoot`]). Every job then gets its own browser context and
//! page on top of it (see [`session`]), so tests never share globals, storage or cookies.

pub mod capture;
pub mod coverage;
pub mod network;
pub mod session;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::cli::test_interfaces::LaunchError;

pub use capture::CaptureBinding;
pub use coverage::CoverageSummary;
pub use session::BrowserRunner;

/// The launched browser and the task pumping its DevTools connection.
pub struct BrowserRoot {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserRoot {
    /// Launch Chrome, headless unless `visible`.
    pub async fn launch(visible: bool) -> Result<Self, LaunchError> {
        let builder = BrowserConfig::builder();
        let builder = if visible { builder.with_head() } else { builder };
        let config = builder.build().map_err(LaunchError::Config)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(LaunchError::Launch)?;
        // The connection only makes progress while its handler stream is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser connection: {e}");
                }
            }
            tracing::debug!("browser connection closed");
        });
        tracing::debug!(visible, "browser launched");
        Ok(Self { browser, handler })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Close the browser and wait for the process to exit.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("closing browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("waiting for browser exit: {e}");
        }
        self.handler.abort();
    }
}
