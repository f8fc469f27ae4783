//! Application layer: the typed command/event contract with the
//! northbound HTTP/WebSocket transport, the port traits, and the service
//! that executes commands against the core.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;

pub use commands::AppCommand;
pub use events::AppEvent;
pub use service::{AppResponse, AppService};
