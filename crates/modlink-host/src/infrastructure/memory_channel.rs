//! In-process, bidirectional module channel built on tokio mpsc queues.
//!
//! [`MemoryChannel::pair`] returns two connected endpoints.  Everything that
//! crosses between them is a JSON text frame, exactly what a socket transport
//! would carry:
//!
//! ```json
//! {"kind":"request","event":"init","payload":{...},"ack":1}
//! {"kind":"reply","ack":1,"error":null,"result":{...}}
//! ```
//!
//! Each endpoint runs one reader task that:
//!
//! - hands inbound requests to the listener registered for the event name,
//!   together with a [`CallbackRef`] when the request carried an `ack`
//! - resolves the local caller waiting on an inbound reply's `ack`
//!
//! The listener table and the pending-call map sit behind `std::sync::Mutex`
//! and are never held across an `.await`.
//!
//! Both endpoints share one `connected` flag.  Dropping (or
//! [`close`](MemoryChannel::close)-ing) either endpoint clears it, stops that
//! endpoint's reader and forgets its listeners.  From then on:
//!
//! - nothing more is delivered to the closed endpoint's listeners
//! - sends from either side fail with [`ChannelError::Closed`]
//! - calls still waiting on either side fail with [`ChannelError::Closed`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use modlink_core::{
    AckResult, CallbackRef, Channel, Listener, Responder, WireReply, WireRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::RequestSender;
use crate::domain::ChannelError;

// ── Frames ────────────────────────────────────────────────────────────────────

/// One text frame on the queue between two endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Frame {
    Request(WireRequest),
    Reply(WireReply),
}

// ── Shared endpoint state ─────────────────────────────────────────────────────

type PendingCalls = HashMap<u64, oneshot::Sender<AckResult>>;

/// State shared between an endpoint handle, its reader task and the
/// responders it hands out.
struct Shared {
    endpoint: String,
    /// Shared with the peer; cleared when either end closes.
    connected: Arc<AtomicBool>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    listeners: Mutex<HashMap<String, Listener>>,
    pending: Mutex<PendingCalls>,
    next_ack: AtomicU64,
}

impl Shared {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Fails every call still waiting for a reply.  Returns how many there
    /// were.
    fn abandon_pending(&self) -> usize {
        let mut pending = self.pending();
        let n = pending.len();
        pending.clear();
        n
    }

    fn outbound(&self) -> Option<mpsc::Sender<String>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends a reply without awaiting.
    ///
    /// Responders are synchronous, so a full queue hands the send to a short
    /// task instead of blocking the caller.
    fn send_reply(&self, reply: WireReply) {
        let ack = reply.ack;
        let text = match serde_json::to_string(&Frame::Reply(reply)) {
            Ok(text) => text,
            Err(e) => {
                warn!(endpoint = %self.endpoint, ack, "failed to encode reply: {e}");
                return;
            }
        };

        let Some(outbound) = self.outbound() else {
            debug!(endpoint = %self.endpoint, ack, "channel closed; reply dropped");
            return;
        };

        match outbound.try_send(text) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(text)) => {
                let endpoint = self.endpoint.clone();
                tokio::spawn(async move {
                    if outbound.send(text).await.is_err() {
                        debug!(endpoint = %endpoint, ack, "peer gone; reply dropped");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(endpoint = %self.endpoint, ack, "peer gone; reply dropped");
            }
        }
    }
}

// ── Endpoint handle ───────────────────────────────────────────────────────────

/// One end of an in-memory module channel.
pub struct MemoryChannel {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    call_timeout: Option<Duration>,
}

impl MemoryChannel {
    /// Creates two connected endpoints and starts their reader tasks.
    ///
    /// `queue_depth` bounds the frames buffered in each direction (minimum 1).
    /// Must be called from inside a Tokio runtime.
    pub fn pair(
        name_a: impl Into<String>,
        name_b: impl Into<String>,
        queue_depth: usize,
    ) -> (MemoryChannel, MemoryChannel) {
        let depth = queue_depth.max(1);
        let (a_to_b, b_inbound) = mpsc::channel(depth);
        let (b_to_a, a_inbound) = mpsc::channel(depth);
        let connected = Arc::new(AtomicBool::new(true));

        let a = Self::start(name_a.into(), Arc::clone(&connected), a_to_b, a_inbound);
        let b = Self::start(name_b.into(), connected, b_to_a, b_inbound);
        (a, b)
    }

    fn start(
        endpoint: String,
        connected: Arc<AtomicBool>,
        outbound: mpsc::Sender<String>,
        inbound: mpsc::Receiver<String>,
    ) -> MemoryChannel {
        let shared = Arc::new(Shared {
            endpoint,
            connected,
            outbound: Mutex::new(Some(outbound)),
            listeners: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_ack: AtomicU64::new(1),
        });

        let reader = tokio::spawn(read_frames(Arc::clone(&shared), inbound));

        MemoryChannel {
            shared,
            reader,
            call_timeout: None,
        }
    }

    /// Sets the timeout used when this endpoint acts as a [`RequestSender`].
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Name given to this endpoint in [`pair`](Self::pair).  Used in logs.
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Sends `event` without asking for a reply.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if either side has closed or been
    /// dropped.
    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), ChannelError> {
        self.emit_raw(WireRequest::notify(event, payload)).await
    }

    /// Sends an arbitrary request envelope as-is.
    ///
    /// No correlation is set up, so a reply to an `ack` placed here is
    /// logged and discarded.
    pub async fn emit_raw(&self, request: WireRequest) -> Result<(), ChannelError> {
        self.send_frame(&Frame::Request(request)).await
    }

    /// Sends `event` and waits for the peer's reply.
    ///
    /// `timeout` of `None` waits until the reply arrives or the channel
    /// closes.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Remote`] when the peer's handler failed
    /// - [`ChannelError::Timeout`] when no reply arrived in time
    /// - [`ChannelError::Closed`] when the channel closed first
    pub async fn call(
        &self,
        event: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ChannelError> {
        let ack = self.shared.next_ack.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(ack, tx);

        let request = WireRequest::call(event, payload, ack);
        if let Err(e) = self.send_frame(&Frame::Request(request)).await {
            self.shared.pending().remove(&ack);
            return Err(e);
        }

        let received = match timeout {
            None => rx.await,
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.shared.pending().remove(&ack);
                    warn!(endpoint = %self.endpoint(), event, ack, "call timed out");
                    return Err(ChannelError::Timeout {
                        event: event.to_string(),
                        after,
                    });
                }
            },
        };

        match received {
            Ok(outcome) => outcome.map_err(ChannelError::Remote),
            // The pending entry was dropped: the channel closed underneath us.
            Err(_) => Err(ChannelError::Closed),
        }
    }

    /// Disconnects both sides.
    ///
    /// Stops this endpoint's reader, forgets its listeners and fails every
    /// call still waiting for a reply.  The peer sees its outbound queue close,
    /// so its own pending calls fail too.  Idempotent.
    pub fn close(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        let taken = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.reader.abort();
        self.shared.listeners().clear();
        let abandoned = self.shared.abandon_pending();
        if taken.is_some() {
            debug!(endpoint = %self.endpoint(), abandoned, "channel closed");
        }
    }

    /// `true` once either endpoint has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        !self.shared.is_connected()
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), ChannelError> {
        let text = serde_json::to_string(frame)?;
        if !self.shared.is_connected() {
            return Err(ChannelError::Closed);
        }
        let outbound = self.shared.outbound().ok_or(ChannelError::Closed)?;
        outbound.send(text).await.map_err(|_| ChannelError::Closed)
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("endpoint", &self.shared.endpoint)
            .field("call_timeout", &self.call_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Channel for MemoryChannel {
    fn on(&self, event: &str, listener: Listener) {
        let replaced = self
            .shared
            .listeners()
            .insert(event.to_string(), listener)
            .is_some();
        if replaced {
            debug!(endpoint = %self.endpoint(), event, "listener replaced");
        }
    }
}

#[async_trait]
impl RequestSender for MemoryChannel {
    async fn request(&self, event: &'static str, payload: Value) -> Result<Value, ChannelError> {
        self.call(event, payload, self.call_timeout).await
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

/// Drains one endpoint's inbound queue until either side closes.
async fn read_frames(shared: Arc<Shared>, mut inbound: mpsc::Receiver<String>) {
    while let Some(text) = inbound.recv().await {
        if !shared.is_connected() {
            break;
        }
        match serde_json::from_str::<Frame>(&text) {
            Ok(Frame::Request(request)) => deliver(&shared, request),
            Ok(Frame::Reply(reply)) => resolve(&shared, reply),
            Err(e) => warn!(endpoint = %shared.endpoint, "undecodable frame dropped: {e}"),
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    shared.listeners().clear();
    let abandoned = shared.abandon_pending();
    debug!(endpoint = %shared.endpoint, abandoned, "peer closed; reader stopped");
}

/// Hands a request to its listener.
fn deliver(shared: &Arc<Shared>, request: WireRequest) {
    let listener = shared.listeners().get(&request.event).cloned();
    let Some(listener) = listener else {
        warn!(
            endpoint = %shared.endpoint,
            event = %request.event,
            "no listener for event; message dropped"
        );
        return;
    };

    let callback = request.ack.map(|ack| match ack.as_u64() {
        Some(id) => {
            let shared = Arc::clone(shared);
            CallbackRef::Invocable(Responder::new(move |outcome| {
                shared.send_reply(WireReply::from_result(id, outcome));
            }))
        }
        None => CallbackRef::Invalid(ack),
    });

    // A JSON `null` payload is the same as no payload.
    let payload = request.payload.filter(|p| !p.is_null());
    listener(payload, callback);
}

/// Completes the local call waiting on `reply.ack`.
fn resolve(shared: &Shared, reply: WireReply) {
    let ack = reply.ack;
    let waiter = shared.pending().remove(&ack);
    match waiter {
        Some(waiter) => {
            // The caller may have given up already; nothing to do then.
            let _ = waiter.send(reply.into_result());
        }
        None => debug!(endpoint = %shared.endpoint, ack, "reply for unknown or expired call"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
