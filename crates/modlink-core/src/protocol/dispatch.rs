//! Typed event dispatch: binds an [`EventHandlers`] table onto a [`Channel`].
//!
//! # Operation contracts
//!
//! A contract is a closed enum implementing [`Operation`].  Every variant has a
//! wire name and [`Operation::ALL`] lists them all, which lets
//! [`EventHandlersBuilder::build`] refuse a table that leaves an operation
//! without a handler.
//!
//! # Per-message behaviour
//!
//! For every message delivered under a bound name the dispatcher:
//!
//! 1. Drops it with a warning when the payload is missing or not a JSON
//!    object.  No handler runs and no reply is sent.
//! 2. Drops it with a warning when the callback slot holds something that is
//!    not invocable.
//! 3. Otherwise runs the handler on its own Tokio task.
//! 4. Replies `Ok(result)` through the callback on success.
//! 5. Logs and replies `Err(HandlerFailure)` when the handler fails, cannot
//!    decode its payload, or panics.  Nothing propagates past the task.
//!
//! Replies to different messages may complete in any order.  No timeout is
//! applied here; a caller that needs one enforces it on its side.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::protocol::channel::{CallbackRef, Channel, Listener};
use crate::protocol::messages::{AckResult, HandlerFailure};

// ── Operation contract ────────────────────────────────────────────────────────

/// A closed set of named remote operations.
///
/// ```rust
/// use modlink_core::Operation;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum EchoOp {
///     Echo,
/// }
///
/// impl Operation for EchoOp {
///     const ALL: &'static [Self] = &[EchoOp::Echo];
///
///     fn name(self) -> &'static str {
///         match self {
///             EchoOp::Echo => "echo",
///         }
///     }
/// }
///
/// assert_eq!(EchoOp::Echo.name(), "echo");
/// ```
pub trait Operation: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every operation in the contract.
    const ALL: &'static [Self];

    /// Wire name of the operation.
    fn name(self) -> &'static str;

    /// Looks an operation up by its wire name.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised while assembling a handler table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// An operation declared by the contract has no handler.
    #[error("no handler registered for operation \"{operation}\"")]
    MissingHandler { operation: &'static str },
}

// ── Handler table ─────────────────────────────────────────────────────────────

type BoxedHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, AckResult> + Send + Sync>;

/// A complete mapping from every operation of `Op` to its handler.
///
/// Built with [`EventHandlers::builder`]; bound with [`listen_to_events`].
pub struct EventHandlers<Op: Operation> {
    handlers: HashMap<Op, BoxedHandler>,
}

impl<Op: Operation> EventHandlers<Op> {
    /// Starts an empty table.
    pub fn builder() -> EventHandlersBuilder<Op> {
        EventHandlersBuilder {
            handlers: HashMap::new(),
        }
    }

    /// Number of bound operations (always `Op::ALL.len()`).
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// `true` only for a contract without operations.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler for `op` directly, bypassing the channel.
    ///
    /// Payload validation is the dispatcher's job, so this accepts any value.
    pub async fn invoke(&self, op: Op, payload: Value) -> AckResult {
        match self.handlers.get(&op) {
            Some(handler) => handler(payload).await,
            None => Err(HandlerFailure::new(format!(
                "no handler registered for operation \"{}\"",
                op.name()
            ))),
        }
    }
}

impl<Op: Operation> fmt::Debug for EventHandlers<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&'static str> = self.handlers.keys().map(|op| op.name()).collect();
        names.sort_unstable();
        f.debug_struct("EventHandlers").field("operations", &names).finish()
    }
}

/// Incrementally registers handlers, then checks the table is complete.
pub struct EventHandlersBuilder<Op: Operation> {
    handlers: HashMap<Op, BoxedHandler>,
}

impl<Op: Operation> EventHandlersBuilder<Op> {
    /// Registers `handler` for `op`, replacing any earlier registration.
    ///
    /// The payload is decoded into `Req` before the handler runs; a payload
    /// that does not fit `Req` fails the call like a handler error would.
    /// Handler errors are reported with [`HandlerFailure::from_display`].
    pub fn on<Req, Res, E, F, Fut>(mut self, op: Op, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, E>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Arc::new(move |payload: Value| {
            let handler = Arc::clone(&handler);
            async move {
                let request: Req = serde_json::from_value(payload).map_err(|e| {
                    HandlerFailure::new(format!("invalid payload for \"{}\": {e}", op.name()))
                })?;
                let response = (*handler)(request)
                    .await
                    .map_err(|e| HandlerFailure::from_display(&e))?;
                serde_json::to_value(response).map_err(|e| {
                    HandlerFailure::new(format!("unserializable result for \"{}\": {e}", op.name()))
                })
            }
            .boxed()
        });

        if self.handlers.insert(op, boxed).is_some() {
            debug!(operation = op.name(), "replacing previously registered handler");
        }
        self
    }

    /// Finishes the table.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingHandler`] naming the first operation in
    /// `Op::ALL` order that has no handler.
    pub fn build(self) -> Result<EventHandlers<Op>, DispatchError> {
        if let Some(missing) = Op::ALL.iter().find(|op| !self.handlers.contains_key(*op)) {
            return Err(DispatchError::MissingHandler {
                operation: missing.name(),
            });
        }
        Ok(EventHandlers {
            handlers: self.handlers,
        })
    }
}

// ── Binding ───────────────────────────────────────────────────────────────────

/// Subscribes to every operation in `handlers`, wrapping each handler with
/// validation, failure capture and logging.
///
/// Registers exactly one listener per operation.  Binding a second table on
/// the same channel replaces the first table's listeners.
///
/// Listeners spawn their handler with [`tokio::spawn`], so the channel must
/// deliver messages from inside a Tokio runtime.
pub fn listen_to_events<Op, C>(channel: &C, handlers: &EventHandlers<Op>)
where
    Op: Operation,
    C: Channel + ?Sized,
{
    for op in Op::ALL {
        let Some(handler) = handlers.handlers.get(op) else {
            continue;
        };
        let handler = Arc::clone(handler);
        let event = op.name();
        let listener: Listener = Arc::new(move |payload, callback| {
            dispatch_message(event, &handler, payload, callback);
        });
        channel.on(event, listener);
    }
}

/// Validates one delivery and, if it is well formed, runs the handler.
fn dispatch_message(
    event: &'static str,
    handler: &BoxedHandler,
    payload: Option<Value>,
    callback: Option<CallbackRef>,
) {
    let payload = match payload {
        Some(payload @ Value::Object(_)) => payload,
        _ => {
            warn!(event, "received malformed message object");
            return;
        }
    };

    let responder = match callback {
        None => None,
        Some(CallbackRef::Invocable(responder)) => Some(responder),
        Some(CallbackRef::Invalid(value)) => {
            warn!(event, callback = %value, "received malformed callback");
            return;
        }
    };

    let call = handler(payload);
    tokio::spawn(async move {
        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(HandlerFailure::new(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        if let Err(failure) = &outcome {
            error!(event, error = %failure, "command failed");
        }

        match responder {
            Some(responder) => responder.respond(outcome),
            None => debug!(event, "no callback supplied; result discarded"),
        }
    });
}

/// Extracts the message from a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
