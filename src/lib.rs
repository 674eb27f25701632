//! Agent Bridge - Stream a JSON-emitting agent CLI as normalized events.

pub mod bridge;
pub mod config;
pub mod display;
pub mod permissions;
pub mod server;
