//! Domain layer for modlink-host.
//!
//! Plain types with no I/O of their own beyond reading and writing the config
//! file.
//!
//! # What belongs in the domain layer?
//!
//! - Host configuration structures and their TOML persistence
//! - Error types describing failed channel exchanges
//!
//! # What does NOT belong here?
//!
//! - tokio tasks, mpsc queues or anything that waits on a peer

pub mod config;
pub mod error;

pub use config::{load_config_from, load_seed_devices, save_config_to, ConfigError, HostConfig};
pub use error::ChannelError;
