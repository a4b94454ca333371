//! Domain layer for modlink-core.
//!
//! Pure data types that travel across the host ↔ module channel, with no
//! dependency on tokio, channels or any transport.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration field definitions and the one-way predicate serializer
//! - The control-surface / device model and its incremental update operations
//! - Error types describing invalid updates
//!
//! # What does NOT belong here?
//!
//! - Listener registration, handler tables or wire envelopes (see `protocol`)
//! - Anything that performs I/O

/// Configuration field definitions and `serialize_is_visible_fn`.
pub mod fields;

/// Surface, device and `SurfacesUpdate` types, plus the consumer-side list.
pub mod surfaces;

pub use fields::{ConfigField, FieldKind, IsVisible};
pub use surfaces::{ClientDevicesListItem, ClientSurfaceItem, SurfaceList, SurfacesUpdate};
