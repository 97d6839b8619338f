use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use url::Url;

use super::{AttemptId, AuthError, Cookie};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Embedded browser driven by the orchestrator.
///
/// Implementations report what happens in the page by sending attempt-tagged
/// [`BrowserEvent`]s through a [`BrowserEventSender`], tagging each event with
/// the attempt of the most recent [`Browser::navigate`] call.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, attempt: AttemptId, url: &Url) -> Result<(), AuthError>;

    /// Whether outbound resource requests can be intercepted and answered.
    fn supports_interception(&self) -> bool {
        false
    }

    /// Start reporting requests matching `filter` as [`BrowserEvent::ResourceRequested`].
    async fn enable_interception(&self, _filter: &str) -> Result<(), AuthError> {
        Ok(())
    }

    async fn cookies(&self, url: &Url) -> Result<Vec<Cookie>, AuthError>;
}

/// Outbound request seen by an intercepting browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: Url,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

impl InterceptedRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".into(),
            url,
            content_type: None,
            body: None,
        }
    }

    pub fn post_form(url: Url, body: impl Into<String>) -> Self {
        Self {
            method: "POST".into(),
            url,
            content_type: Some(FORM_CONTENT_TYPE.into()),
            body: Some(body.into()),
        }
    }

    pub fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
    }
}

/// Response handed back to the browser instead of letting the request through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl SyntheticResponse {
    pub fn empty_ok() -> Self {
        Self {
            status: 200,
            reason: "OK".into(),
            body: String::new(),
        }
    }
}

/// Intercepted request awaiting a decision.
#[derive(Debug)]
pub struct PendingRequest {
    pub request: InterceptedRequest,
    reply: oneshot::Sender<Option<SyntheticResponse>>,
}

impl PendingRequest {
    /// Answer the browser. `None` lets the request continue to the network.
    pub fn respond(self, response: Option<SyntheticResponse>) {
        let _ = self.reply.send(response);
    }
}

#[derive(Debug)]
pub enum BrowserEvent {
    NavigationCompleted { url: Url, success: bool },
    ResourceRequested(PendingRequest),
}

impl BrowserEvent {
    pub fn navigation(url: Url, success: bool) -> Self {
        BrowserEvent::NavigationCompleted { url, success }
    }

    /// Build an interception event plus the receiver the browser waits on.
    pub fn resource(
        request: InterceptedRequest,
    ) -> (Self, oneshot::Receiver<Option<SyntheticResponse>>) {
        let (reply, rx) = oneshot::channel();
        (
            BrowserEvent::ResourceRequested(PendingRequest { request, reply }),
            rx,
        )
    }

    /// Discard the event, letting any intercepted request continue.
    pub fn release(self) {
        if let BrowserEvent::ResourceRequested(pending) = self {
            pending.respond(None);
        }
    }
}

#[derive(Debug)]
struct TaggedEvent {
    attempt: AttemptId,
    event: BrowserEvent,
}

/// Marks the channel as having no attempt subscribed.
const NO_ATTEMPT: u64 = 0;

/// Create the channel a browser implementation reports events through.
pub fn event_channel() -> (BrowserEventSender, BrowserEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    let active = Arc::new(AtomicU64::new(NO_ATTEMPT));
    (
        BrowserEventSender {
            tx,
            active: Arc::clone(&active),
        },
        BrowserEvents { rx, active },
    )
}

/// Browser-side half of the event channel.
#[derive(Debug, Clone)]
pub struct BrowserEventSender {
    tx: mpsc::UnboundedSender<TaggedEvent>,
    active: Arc<AtomicU64>,
}

impl BrowserEventSender {
    /// Report an event for `attempt`. Returns `false` once the orchestrator is gone.
    ///
    /// Events of an attempt that is not currently listening are released on the
    /// spot, so intercepted requests never wait on a finished attempt.
    pub fn send(&self, attempt: AttemptId, event: BrowserEvent) -> bool {
        if self.tx.is_closed() {
            event.release();
            return false;
        }
        if !self.is_current(attempt) {
            debug!(%attempt, "releasing event outside the listening attempt");
            event.release();
            return true;
        }
        match self.tx.send(TaggedEvent { attempt, event }) {
            Ok(()) => true,
            Err(mpsc::error::SendError(tagged)) => {
                tagged.event.release();
                false
            }
        }
    }

    /// Whether `attempt` is still waiting for browser events.
    pub fn is_current(&self, attempt: AttemptId) -> bool {
        self.active.load(Ordering::SeqCst) == attempt.get()
    }
}

/// Orchestrator-side half of the event channel.
#[derive(Debug)]
pub struct BrowserEvents {
    rx: mpsc::UnboundedReceiver<TaggedEvent>,
    active: Arc<AtomicU64>,
}

impl BrowserEvents {
    /// Subscribe to the events of `attempt`, discarding anything already queued
    /// for earlier attempts.
    pub fn subscribe(&mut self, attempt: AttemptId) -> AttemptEvents<'_> {
        let dropped = drain(&mut self.rx);
        if dropped > 0 {
            debug!(%attempt, dropped, "discarded queued browser events");
        }
        self.active.store(attempt.get(), Ordering::SeqCst);
        AttemptEvents {
            rx: &mut self.rx,
            active: &self.active,
            attempt,
            closed: false,
        }
    }
}

/// Event stream filtered to a single attempt. Closing or dropping it stops
/// the attempt from listening and releases whatever is still queued.
#[derive(Debug)]
pub struct AttemptEvents<'a> {
    rx: &'a mut mpsc::UnboundedReceiver<TaggedEvent>,
    active: &'a AtomicU64,
    attempt: AttemptId,
    closed: bool,
}

impl AttemptEvents<'_> {
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Next event of this attempt; `None` once closed or every sender is gone.
    pub async fn next(&mut self) -> Option<BrowserEvent> {
        if self.closed {
            return None;
        }
        loop {
            let tagged = self.rx.recv().await?;
            if tagged.attempt == self.attempt {
                return Some(tagged.event);
            }
            debug!(
                current = %self.attempt,
                stale = %tagged.attempt,
                "ignoring event from superseded attempt"
            );
            tagged.event.release();
        }
    }

    /// Stop listening. Later events for this attempt are released by the sender.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.active.compare_exchange(
            self.attempt.get(),
            NO_ATTEMPT,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let released = drain(&mut *self.rx);
        if released > 0 {
            debug!(attempt = %self.attempt, released, "released events after attempt ended");
        }
    }
}

impl Drop for AttemptEvents<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TaggedEvent>) -> usize {
    let mut released = 0;
    while let Ok(tagged) = rx.try_recv() {
        tagged.event.release();
        released += 1;
    }
    released
}
