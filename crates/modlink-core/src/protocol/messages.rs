//! JSON wire envelopes exchanged over a control channel.
//!
//! A request names the operation (`event`), carries an optional payload and an
//! optional `ack` correlation id.  When the `ack` is present the receiver owes
//! exactly one [`WireReply`] carrying the same id.
//!
//! ```json
//! {"event":"getConfigFields","payload":{},"ack":7}
//! {"ack":7,"error":null,"result":[{"id":"host","type":"textinput", ...}]}
//! {"ack":8,"error":"connection refused"}
//! ```
//!
//! Inside the process a reply is a plain [`AckResult`]; the `(error, result)`
//! pair shape only exists on the wire and is produced by
//! [`WireReply::from_result`] / consumed by [`WireReply::into_result`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ── Handler failure ───────────────────────────────────────────────────────────

/// The single structured error representation sent back to a caller when a
/// handler fails.
///
/// Serialized as a bare JSON string so it occupies the `error` slot of a
/// [`WireReply`] directly.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
#[serde(transparent)]
pub struct HandlerFailure {
    message: String,
}

impl HandlerFailure {
    /// Creates a failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Renders any displayable error using its alternate form.
    ///
    /// For `anyhow::Error` the alternate form includes the whole context
    /// chain (`"loading preset: file not found"`), which is what a remote
    /// caller needs to make sense of the failure.
    pub fn from_display<E: fmt::Display + ?Sized>(err: &E) -> Self {
        Self::new(format!("{err:#}"))
    }

    /// Returns the failure text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of one handler invocation: the serialized result or the failure.
pub type AckResult = Result<Value, HandlerFailure>;

// ── Request envelope ──────────────────────────────────────────────────────────

/// One inbound or outbound operation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Operation name, e.g. `"updateConfig"`.
    pub event: String,

    /// Operation argument.  Absent and `null` are both treated as missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Completion correlation slot.
    ///
    /// Kept as a raw JSON value: only a non-negative integer is a usable
    /// correlation id, anything else is a malformed callback reference that
    /// the dispatcher must refuse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<Value>,
}

impl WireRequest {
    /// Creates a fire-and-forget request (no reply expected).
    pub fn notify(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload: Some(payload),
            ack: None,
        }
    }

    /// Creates a request that expects a reply correlated by `ack`.
    pub fn call(event: impl Into<String>, payload: Value, ack: u64) -> Self {
        Self {
            event: event.into(),
            payload: Some(payload),
            ack: Some(Value::from(ack)),
        }
    }
}

// ── Reply envelope ────────────────────────────────────────────────────────────

/// The reply to a [`WireRequest`] that carried an `ack` id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireReply {
    /// Correlation id copied from the request.
    pub ack: u64,

    /// `null` on success, the failure text otherwise.
    #[serde(default)]
    pub error: Option<HandlerFailure>,

    /// The handler result.  Omitted when the handler failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl WireReply {
    /// Converts an in-process [`AckResult`] into its wire shape.
    pub fn from_result(ack: u64, outcome: AckResult) -> Self {
        match outcome {
            Ok(result) => Self {
                ack,
                error: None,
                result: Some(result),
            },
            Err(failure) => Self {
                ack,
                error: Some(failure),
                result: None,
            },
        }
    }

    /// Converts the wire shape back into an [`AckResult`].
    ///
    /// A success reply without a `result` field decodes as `Ok(Value::Null)`.
    pub fn into_result(self) -> AckResult {
        match self.error {
            Some(failure) => Err(failure),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
