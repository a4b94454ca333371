//! Protocol module containing the wire envelopes, the channel contract and
//! the typed event dispatcher.

pub mod channel;
pub mod dispatch;
pub mod messages;

pub use channel::{CallbackRef, Channel, Listener, Responder};
pub use dispatch::{listen_to_events, DispatchError, EventHandlers, EventHandlersBuilder, Operation};
pub use messages::{AckResult, HandlerFailure, WireReply, WireRequest};
