//! Page-to-host result capture
//!
//! A [`CaptureBinding`] exposes one named function on a page (`Runtime.addBinding`). Every invocation of any binding
//! on that page arrives as a `Runtime.bindingCalled` event; a forwarder task keeps the ones carrying our name and
//! hands the first payload to a single-slot channel. The session awaits that channel after navigation.

use chromiumoxide::Page;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::error::CdpError;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct CaptureBinding {
    rx: mpsc::Receiver<String>,
    forwarder: JoinHandle<()>,
}

impl CaptureBinding {
    /// Subscribe to binding calls on `page`, then expose `name` to it.
    ///
    /// Must run before navigation so the page can never call a binding the host is not yet listening to.
    pub async fn register(page: &Page, name: &str) -> Result<Self, CdpError> {
        let calls = page.event_listener::<EventBindingCalled>().await?;
        page.execute(AddBindingParams::new(name)).await?;
        let calls = calls.map(|event| (event.name.clone(), event.payload.clone()));
        Ok(Self::forward(name, calls))
    }

    /// Start forwarding `(binding name, payload)` calls that match `name`.
    pub fn forward<S>(name: &str, calls: S) -> Self
    where
        S: Stream<Item = (String, String)> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let forwarder = tokio::spawn(forward_calls(name.to_string(), calls, tx));
        Self { rx, forwarder }
    }

    /// Wait for the page's payload. `None` means the page went away without calling the binding.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Drop for CaptureBinding {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

async fn forward_calls<S>(name: String, mut calls: S, tx: mpsc::Sender<String>)
where
    S: Stream<Item = (String, String)> + Unpin,
{
    let mut delivered = false;
    while let Some((called, payload)) = calls.next().await {
        if called != name {
            tracing::trace!(binding = %called, "ignoring call to another binding");
            continue;
        }
        if delivered {
            tracing::warn!(binding = %name, "binding called more than once, dropping payload");
            continue;
        }
        if tx.send(payload).await.is_err() {
            return;
        }
        delivered = true;
    }
}
