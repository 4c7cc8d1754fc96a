mod call_session;
mod session_command;
mod session_context;
mod session_loop;
mod session_snapshot;

pub use call_session::*;
pub use session_context::*;
pub use session_snapshot::*;
