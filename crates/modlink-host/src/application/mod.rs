//! Application layer for modlink-host.
//!
//! Use cases that depend on the domain and on `modlink-core`, but never on a
//! concrete transport: the module operation contract (both sides of it), the
//! demo module, and the surface relay.

pub mod demo_module;
pub mod module_api;
pub mod surface_feed;

pub use demo_module::DemoModule;
pub use module_api::{module_handlers, ModuleApi, ModuleClient, ModuleOp, RequestSender};
pub use surface_feed::SurfaceFeed;
