//! modlink-host library crate.
//!
//! The host side of a modlink connection: configuration, the operation
//! contract a host uses to drive a module, and an in-memory channel that
//! connects the two inside one process.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Host (ModuleClient)                      Module (ModuleApi)
//!         ↕                                        ↕
//! [modlink-host]                           modlink-core dispatcher
//!   ├── domain/           HostConfig, ChannelError
//!   ├── application/      ModuleOp contract, DemoModule, SurfaceFeed
//!   └── infrastructure/
//!         ├── memory_channel/  JSON frames over tokio mpsc
//!         └── loopback/        Host + demo module in one session
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O beyond reading and writing its own config files.
//! - `application` depends on `domain` and `modlink-core` only; it reaches a
//!   transport through the [`application::RequestSender`] trait.
//! - `infrastructure` depends on all other layers plus `tokio`.

/// Domain layer: configuration and error types.
pub mod domain;

/// Application layer: module operation contract and surface relay.
pub mod application;

/// Infrastructure layer: in-memory channel and loopback session.
pub mod infrastructure;
