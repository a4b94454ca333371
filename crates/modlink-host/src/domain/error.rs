//! Errors seen by the calling side of a module channel.

use std::time::Duration;

use modlink_core::HandlerFailure;
use thiserror::Error;

/// Failure of an outbound emit or call.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel was closed, locally or by the peer, before the exchange
    /// completed.
    #[error("channel closed")]
    Closed,

    /// No reply arrived within the caller's timeout.
    #[error("no reply to \"{event}\" within {after:?}")]
    Timeout { event: String, after: Duration },

    /// The remote handler ran and failed.
    #[error("remote handler failed: {0}")]
    Remote(HandlerFailure),

    /// A payload or result could not be converted to or from JSON.
    #[error("JSON conversion failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChannelError {
    /// The failure text reported by the remote handler, if that is what this is.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ChannelError::Remote(failure) => Some(failure.message()),
            _ => None,
        }
    }
}
