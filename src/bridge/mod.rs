//! Agent process bridge: spawn the agent CLI, reassemble its JSON output
//! and translate it into protocol events.

mod assembler;
mod attachments;
mod cancel;
mod command;
mod events;
mod launcher;
mod messages;
mod sanitize;
mod stream;
mod translator;

pub use assembler::*;
pub use attachments::*;
pub use cancel::*;
pub use command::*;
pub use events::*;
pub use launcher::*;
pub use messages::*;
pub use sanitize::*;
pub use stream::*;
pub use translator::*;
