//! The channel contract consumed by the dispatcher.
//!
//! A [`Channel`] is an already-connected, bidirectional message channel.  This
//! crate only needs the receiving half: the ability to register one
//! [`Listener`] per operation name.  Each delivery hands the listener the raw
//! payload and, when the sender asked for a reply, a [`CallbackRef`].
//!
//! Connection establishment, framing and reconnection belong to the
//! implementor (see `modlink_host::infrastructure::memory_channel` for an
//! in-process implementation).

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::protocol::messages::AckResult;

/// Callback invoked by a channel for every message delivered under one
/// operation name.
///
/// Arguments are the payload exactly as received (possibly missing or not an
/// object) and the completion callback, if the sender supplied one.
pub type Listener = Arc<dyn Fn(Option<Value>, Option<CallbackRef>) + Send + Sync>;

/// Completion callback reference as received from the channel.
pub enum CallbackRef {
    /// A usable callback.  Must be completed at most once.
    Invocable(Responder),
    /// The sender put something in the callback slot that cannot be invoked
    /// (for example a string where a correlation id was expected).
    Invalid(Value),
}

impl fmt::Debug for CallbackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invocable(_) => f.write_str("CallbackRef::Invocable(..)"),
            Self::Invalid(v) => f.debug_tuple("CallbackRef::Invalid").field(v).finish(),
        }
    }
}

/// A one-shot completion callback.
///
/// Consuming `self` in [`Responder::respond`] makes "reply at most once" a
/// compile-time property.
pub struct Responder {
    inner: Box<dyn FnOnce(AckResult) + Send>,
}

impl Responder {
    /// Wraps a closure that delivers the reply back to the caller.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(AckResult) + Send + 'static,
    {
        Self { inner: Box::new(f) }
    }

    /// Completes the exchange.
    pub fn respond(self, outcome: AckResult) {
        (self.inner)(outcome);
    }
}

/// Receiving side of a bidirectional control channel.
#[cfg_attr(test, mockall::automock)]
pub trait Channel: Send + Sync {
    /// Registers `listener` for messages named `event`.
    ///
    /// Registering the same name again replaces the previous listener.
    fn on(&self, event: &str, listener: Listener);
}

impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn on(&self, event: &str, listener: Listener) {
        (**self).on(event, listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_responder_delivers_outcome_once() {
        // Arrange
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let responder = Responder::new(move |outcome| sink.lock().unwrap().push(outcome));

        // Act
        responder.respond(Ok(Value::from(5)));

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec![Ok(Value::from(5))]);
    }

    #[test]
    fn test_invalid_callback_debug_shows_value() {
        let cb = CallbackRef::Invalid(Value::from("nope"));
        assert_eq!(format!("{cb:?}"), r#"CallbackRef::Invalid(String("nope"))"#);
    }
}
