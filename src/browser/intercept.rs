//! Request interception and out-of-band response capture
//!
//! Every outgoing request is classified by URL into one of three actions:
//! continue with an augmented browser-like header set (the target page
//! itself), abort (a known redirecting sub-resource), or continue
//! unmodified. Classification is a pure function; a spawned dispatcher
//! applies the decisions to paused CDP Fetch requests.
//!
//! The first response whose URL matches the target is captured verbatim
//! into a write-once slot. The rendered DOM can diverge from the meaningful
//! initial response once page scripts run, so the raw capture doubles as a
//! fallback content source.

use crate::error::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, HeaderEntry,
    RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Header set emulating a genuine top-level browser navigation. Automation
/// defaults omit several of these and get rejected by request
/// fingerprinting on the target.
pub fn navigation_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Cache-Control", "no-cache"),
        ("Connection", "keep-alive"),
        ("Pragma", "no-cache"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
}

/// Per-request policy. The actions are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDecision {
    /// Continue with the augmented header set merged over the original headers
    ContinueWithHeaders(Vec<(String, String)>),
    /// Abort the request
    Abort,
    /// Continue unmodified
    Continue,
}

/// Pure URL classification for outgoing requests
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    target_url: String,
    blocked_fragment: String,
}

impl RequestClassifier {
    /// Create a classifier for the given target page
    pub fn new<S: Into<String>, B: Into<String>>(target_url: S, blocked_fragment: B) -> Self {
        Self {
            target_url: target_url.into(),
            blocked_fragment: blocked_fragment.into(),
        }
    }

    /// Classify one request URL
    pub fn classify(&self, url: &str) -> RequestDecision {
        if url == self.target_url {
            return RequestDecision::ContinueWithHeaders(
                navigation_headers()
                    .into_iter()
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .collect(),
            );
        }
        if !self.blocked_fragment.is_empty() && url.contains(&self.blocked_fragment) {
            return RequestDecision::Abort;
        }
        RequestDecision::Continue
    }

    /// The URL whose response gets captured out-of-band
    pub fn target_url(&self) -> &str {
        &self.target_url
    }
}

/// Write-once slot holding the raw body of the first target response
#[derive(Clone, Default)]
pub struct ResponseCapture {
    slot: Arc<OnceLock<String>>,
}

impl ResponseCapture {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a body. Returns false if the slot was already filled.
    pub fn fill(&self, body: String) -> bool {
        self.slot.set(body).is_ok()
    }

    /// Read the captured body, if any
    pub fn get(&self) -> Option<String> {
        self.slot.get().cloned()
    }

    /// Whether a body has been captured
    pub fn is_filled(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Network lifecycle events fed to the quiescence tracker, keyed by the
/// driver's request id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A request left the browser
    RequestSent(String),
    /// A request finished loading
    LoadingFinished(String),
    /// A request failed
    LoadingFailed(String),
}

/// Best-effort outstanding-request tracker.
///
/// Fed by an explicit event queue with a single consumer that keeps the set
/// of in-flight request ids. Keyed by id because the send event fires once
/// per redirect hop for the same request while the finish event fires once.
/// Advisory only: every wait built on it keeps an absolute timeout as
/// backstop, since the target network surface can stall indefinitely.
#[derive(Clone)]
pub struct QuiescenceTracker {
    pending: Arc<AtomicI64>,
    sender: mpsc::UnboundedSender<NetworkEvent>,
}

impl QuiescenceTracker {
    /// Create a tracker and spawn its consumer task
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicI64::new(0));
        let counter = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut inflight: HashSet<String> = HashSet::new();
            while let Some(event) = receiver.recv().await {
                match event {
                    NetworkEvent::RequestSent(id) => {
                        inflight.insert(id);
                    }
                    NetworkEvent::LoadingFinished(id) | NetworkEvent::LoadingFailed(id) => {
                        inflight.remove(&id);
                    }
                }
                counter.store(inflight.len() as i64, Ordering::SeqCst);
            }
        });
        Self { pending, sender }
    }

    /// Queue a network event
    pub fn record(&self, event: NetworkEvent) {
        let _ = self.sender.send(event);
    }

    /// Outstanding requests right now (never negative)
    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::SeqCst).max(0)
    }

    /// Wait until the network looks idle, or until `max_wait` elapses.
    /// Returns true if idle was observed.
    pub async fn settle(&self, max_wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if self.pending() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                trace!(pending = self.pending(), "quiescence wait hit its bound");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Enable interception on the page and spawn the dispatch tasks
pub(crate) async fn install(
    page: &Page,
    classifier: RequestClassifier,
    capture: ResponseCapture,
    quiescence: QuiescenceTracker,
) -> Result<()> {
    // Listeners first: once Fetch is enabled every request pauses until
    // the dispatcher answers it
    spawn_request_dispatcher(page, classifier.clone()).await?;
    spawn_response_capture(page, classifier, capture).await?;
    spawn_quiescence_feed(page, quiescence).await?;

    page.execute(
        fetch::EnableParams::builder()
            .pattern(RequestPattern::builder().url_pattern("*").build())
            .build(),
    )
    .await?;
    page.execute(network::EnableParams::default()).await?;

    debug!("request interception installed");
    Ok(())
}

/// Apply classifier decisions to paused requests
async fn spawn_request_dispatcher(page: &Page, classifier: RequestClassifier) -> Result<()> {
    let mut paused = page.event_listener::<EventRequestPaused>().await?;
    let page = page.clone();
    tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let url = event.request.url.clone();
            let request_id = event.request_id.clone();
            match classifier.classify(&url) {
                RequestDecision::ContinueWithHeaders(augmented) => {
                    trace!(%url, "continuing with augmented headers");
                    let headers = merge_headers(&event, &augmented);
                    let params = ContinueRequestParams::builder()
                        .request_id(request_id)
                        .headers(headers)
                        .build();
                    match params {
                        Ok(params) => {
                            if let Err(e) = page.execute(params).await {
                                warn!(%url, "failed to continue request: {e}");
                            }
                        }
                        Err(e) => warn!(%url, "failed to build continue params: {e}"),
                    }
                }
                RequestDecision::Abort => {
                    trace!(%url, "aborting blocked request");
                    let params = FailRequestParams::new(request_id, ErrorReason::Aborted);
                    if let Err(e) = page.execute(params).await {
                        warn!(%url, "failed to abort request: {e}");
                    }
                }
                RequestDecision::Continue => {
                    let params = ContinueRequestParams::new(request_id);
                    if let Err(e) = page.execute(params).await {
                        warn!(%url, "failed to continue request: {e}");
                    }
                }
            }
        }
    });
    Ok(())
}

/// Merge the augmented headers over the request's original header map
fn merge_headers(event: &EventRequestPaused, augmented: &[(String, String)]) -> Vec<HeaderEntry> {
    let mut entries: Vec<HeaderEntry> = Vec::new();
    if let Ok(serde_json::Value::Object(original)) = serde_json::to_value(&event.request.headers) {
        for (name, value) in original {
            // Augmented values win over the originals
            if augmented.iter().any(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                continue;
            }
            if let Some(value) = value.as_str() {
                entries.push(HeaderEntry {
                    name,
                    value: value.to_string(),
                });
            }
        }
    }
    for (name, value) in augmented {
        entries.push(HeaderEntry {
            name: name.clone(),
            value: value.clone(),
        });
    }
    entries
}

/// Capture the first matching response body into the write-once slot
async fn spawn_response_capture(
    page: &Page,
    classifier: RequestClassifier,
    capture: ResponseCapture,
) -> Result<()> {
    let mut responses = page.event_listener::<EventResponseReceived>().await?;
    let page = page.clone();
    tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            if event.response.url != classifier.target_url() || capture.is_filled() {
                continue;
            }
            let params = GetResponseBodyParams::new(event.request_id.clone());
            match page.execute(params).await {
                Ok(response) => {
                    let body = if response.base64_encoded {
                        match BASE64.decode(response.body.as_bytes()) {
                            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                            Err(e) => {
                                warn!("failed to decode captured body: {e}");
                                continue;
                            }
                        }
                    } else {
                        response.body.clone()
                    };
                    if capture.fill(body) {
                        debug!(url = %event.response.url, "captured initial response body");
                    }
                }
                Err(e) => {
                    debug!(url = %event.response.url, "could not fetch response body: {e}");
                }
            }
        }
    });
    Ok(())
}

/// Forward network lifecycle events into the quiescence queue
async fn spawn_quiescence_feed(page: &Page, quiescence: QuiescenceTracker) -> Result<()> {
    let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await?;

    let tracker = quiescence.clone();
    tokio::spawn(async move {
        while let Some(event) = sent.next().await {
            tracker.record(NetworkEvent::RequestSent(event.request_id.inner().clone()));
        }
    });
    let tracker = quiescence.clone();
    tokio::spawn(async move {
        while let Some(event) = finished.next().await {
            tracker.record(NetworkEvent::LoadingFinished(event.request_id.inner().clone()));
        }
    });
    tokio::spawn(async move {
        while let Some(event) = failed.next().await {
            quiescence.record(NetworkEvent::LoadingFailed(event.request_id.inner().clone()));
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BLOCKED_PATH_FRAGMENT, DEFAULT_TARGET_URL};

    fn classifier() -> RequestClassifier {
        RequestClassifier::new(DEFAULT_TARGET_URL, DEFAULT_BLOCKED_PATH_FRAGMENT)
    }

    #[test]
    fn test_target_url_gets_augmented_headers() {
        match classifier().classify(DEFAULT_TARGET_URL) {
            RequestDecision::ContinueWithHeaders(headers) => {
                assert!(headers.iter().any(|(n, _)| n == "Accept"));
                assert!(headers.iter().any(|(n, v)| n == "Sec-Fetch-Mode" && v == "navigate"));
                assert!(headers
                    .iter()
                    .any(|(n, v)| n == "Upgrade-Insecure-Requests" && v == "1"));
            }
            other => panic!("expected augmented continue, got {:?}", other),
        }
    }

    #[test]
    fn test_blocked_fragment_aborts() {
        let decision = classifier().classify("https://www.mca.gov.in/home");
        assert_eq!(decision, RequestDecision::Abort);
    }

    #[test]
    fn test_fragment_matches_anywhere_in_url() {
        let decision = classifier().classify("https://cdn.example.com/home/redirect.js");
        assert_eq!(decision, RequestDecision::Abort);
    }

    #[test]
    fn test_other_urls_continue_unmodified() {
        let decision = classifier().classify("https://cdn.example.com/static/app.js");
        assert_eq!(decision, RequestDecision::Continue);
    }

    #[test]
    fn test_near_miss_target_is_not_augmented() {
        let near = format!("{}?tab=1", DEFAULT_TARGET_URL);
        assert_eq!(classifier().classify(&near), RequestDecision::Continue);
    }

    #[test]
    fn test_empty_fragment_never_aborts() {
        let classifier = RequestClassifier::new("https://example.com/search", "");
        assert_eq!(
            classifier.classify("https://example.com/home"),
            RequestDecision::Continue
        );
    }

    #[test]
    fn test_response_capture_is_write_once() {
        let capture = ResponseCapture::new();
        assert!(!capture.is_filled());
        assert!(capture.fill("first".to_string()));
        assert!(!capture.fill("second".to_string()));
        assert_eq!(capture.get().as_deref(), Some("first"));
    }

    fn sent(id: &str) -> NetworkEvent {
        NetworkEvent::RequestSent(id.to_string())
    }

    #[tokio::test]
    async fn test_quiescence_counts_down_to_idle() {
        let tracker = QuiescenceTracker::spawn();
        tracker.record(sent("a"));
        tracker.record(sent("b"));
        tracker.record(NetworkEvent::LoadingFinished("a".to_string()));
        tracker.record(NetworkEvent::LoadingFailed("b".to_string()));
        // Let the consumer drain the queue before observing the counter
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tracker.settle(Duration::from_secs(1)).await);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_quiescence_settle_times_out_when_busy() {
        let tracker = QuiescenceTracker::spawn();
        tracker.record(sent("a"));
        // Let the consumer apply the insert before the settle wait
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!tracker.settle(Duration::from_millis(200)).await);
        assert_eq!(tracker.pending(), 1);
    }

    #[tokio::test]
    async fn test_quiescence_redirect_hops_settle() {
        let tracker = QuiescenceTracker::spawn();
        // A redirected request re-announces itself under the same id but
        // finishes exactly once
        tracker.record(sent("a"));
        tracker.record(sent("a"));
        tracker.record(sent("a"));
        tracker.record(NetworkEvent::LoadingFinished("a".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tracker.settle(Duration::from_millis(200)).await);
        assert_eq!(tracker.pending(), 0);
    }
}
