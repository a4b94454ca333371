//! # modlink-core
//!
//! Shared library for the host ↔ module control channel.  It contains the
//! typed event dispatcher, the visibility-predicate language used by module
//! configuration fields, and the data model for control surfaces that the
//! host relays to its client UI.
//!
//! The crate has no opinion about how bytes travel: it consumes a
//! [`protocol::Channel`] and leaves framing, reconnection and process
//! supervision to whoever implements that trait.
//!
//! # Module overview
//!
//! - **`protocol`** – The channel contract, the JSON wire envelopes and the
//!   dispatcher that binds an [`EventHandlers`] table onto a channel.
//!
//! - **`domain`** – Configuration field definitions (with the one-way
//!   predicate serializer) and the surface/device model with its incremental
//!   update operations.
//!
//! - **`predicate`** – The textual predicate grammar, its parser and the
//!   sandboxed evaluator used on the receiving side of the channel.
//!
//! - **`patch`** – JSON Pointer addressing plus the add/remove/replace/move/
//!   copy/test operations carried by `SurfacesUpdate::Update`.
//!
//! # Data flow
//!
//! ```text
//! inbound WireRequest ─► Channel listener ─► validate ─► handler ─► WireReply
//! ConfigField[]       ─► serialize_is_visible_fn ─► wire payload
//! SurfacesUpdate[]    ─► (relayed unchanged) ─► SurfaceList::apply_all
//! ```

pub mod domain;
pub mod patch;
pub mod predicate;
pub mod protocol;

mod value;

// Re-export the most-used types at the crate root so callers can write
// `modlink_core::EventHandlers` instead of the full module path.
pub use domain::fields::{
    serialize_is_visible_fn, ConfigField, DropdownChoice, FieldKind, IsVisible,
};
pub use domain::surfaces::{
    diff_devices, ClientDevicesListItem, ClientSurfaceItem, SurfaceError, SurfaceGroupConfig,
    SurfaceList, SurfacePanelConfig, SurfacesUpdate,
};
pub use patch::{apply_patch, PatchError, PatchOperation};
pub use predicate::{Expr, Predicate, PredicateError};
pub use protocol::channel::{CallbackRef, Channel, Listener, Responder};
pub use protocol::dispatch::{
    listen_to_events, DispatchError, EventHandlers, EventHandlersBuilder, Operation,
};
pub use protocol::messages::{AckResult, HandlerFailure, WireReply, WireRequest};
