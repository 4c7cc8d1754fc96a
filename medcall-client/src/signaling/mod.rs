mod channel;
mod channel_event;

pub use channel::*;
pub use channel_event::*;
