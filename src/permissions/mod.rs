//! Pending approval requests for tool calls.

mod table;
mod types;

pub use table::*;
pub use types::*;
