//! Page network activity, reduced to what decides a job early
//!
//! CDP reports a request's URL once (`requestWillBeSent`) and refers to it by id afterwards. [`RequestTracker`]
//! joins the two so responses and load failures can be matched against the URLs a session cares about.

use std::collections::HashMap;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::error::CdpError;
use futures::stream::{self, BoxStream, PollNext, Stream, StreamExt};

/// Raw network events, keyed by CDP request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Sent { request_id: String, url: String },
    Received { request_id: String, status: i64 },
    Failed { request_id: String, reason: String },
}

/// The outcome of one request, under the URL the page asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignal {
    Response { url: String, status: i64 },
    Failed { url: String, reason: String },
}

/// Maps request ids to the URL first requested under that id.
#[derive(Debug, Default)]
pub struct RequestTracker {
    urls: HashMap<String, String>,
}

impl RequestTracker {
    /// Feed one event; returns a signal once the request has an outcome.
    ///
    /// Redirects reuse the request id, so the original URL is kept and the final outcome is reported under it.
    pub fn observe(&mut self, event: NetworkEvent) -> Option<PageSignal> {
        match event {
            NetworkEvent::Sent { request_id, url } => {
                self.urls.entry(request_id).or_insert(url);
                None
            }
            NetworkEvent::Received { request_id, status } => self
                .urls
                .get(&request_id)
                .map(|url| PageSignal::Response { url: url.clone(), status }),
            NetworkEvent::Failed { request_id, reason } => self
                .urls
                .remove(&request_id)
                .map(|url| PageSignal::Failed { url, reason }),
        }
    }
}

/// Turn a stream of raw events into request outcomes.
pub fn signals<S>(events: S) -> impl Stream<Item = PageSignal> + Send
where
    S: Stream<Item = NetworkEvent> + Send,
{
    events
        .scan(RequestTracker::default(), |tracker, event| {
            futures::future::ready(Some(tracker.observe(event)))
        })
        .filter_map(futures::future::ready)
}

/// Subscribe to a page's network events. Network reporting must still be enabled on the page.
pub async fn listen(page: &Page) -> Result<BoxStream<'static, PageSignal>, CdpError> {
    let sent = page
        .event_listener::<EventRequestWillBeSent>()
        .await?
        .map(|event| NetworkEvent::Sent {
            request_id: event.request_id.inner().clone(),
            url: event.request.url.clone(),
        });
    let received = page
        .event_listener::<EventResponseReceived>()
        .await?
        .map(|event| NetworkEvent::Received {
            request_id: event.request_id.inner().clone(),
            status: event.response.status,
        });
    let failed = page
        .event_listener::<EventLoadingFailed>()
        .await?
        .map(|event| NetworkEvent::Failed {
            request_id: event.request_id.inner().clone(),
            reason: event.error_text.clone(),
        });

    // Requests are drained first so an outcome never overtakes the request it belongs to.
    let events = stream::select_with_strategy(sent, stream::select(received, failed), |_: &mut ()| {
        PollNext::Left
    });
    Ok(signals(events).boxed())
}
