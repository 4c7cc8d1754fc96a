mod call_state;
mod candidate_buffer;
mod engine;
mod engine_event;
mod peer_session;
mod watchdog;

pub use call_state::*;
pub use candidate_buffer::*;
pub use engine::*;
pub use engine_event::*;
pub use peer_session::*;
pub use watchdog::*;
