//! Infrastructure layer for modlink-host.
//!
//! The infrastructure layer owns the concrete transport and the runnable
//! session built on top of it.
//!
//! # Responsibilities
//!
//! - Carrying JSON request/reply frames between two in-process endpoints
//! - Correlating replies to outstanding calls and enforcing call timeouts
//! - Spawning the per-endpoint reader tasks
//! - Wiring a module, a host client and a surface feed into one session
//!
//! # What does NOT belong here?
//!
//! - The operation contract and payload types (that is the application layer)
//! - Configuration schema and error types (that is the domain layer)
//! - Command-line parsing and tracing setup (that is done in `main.rs`)

pub mod loopback;
pub mod memory_channel;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use loopback::{run_loopback, LoopbackReport};
pub use memory_channel::MemoryChannel;
