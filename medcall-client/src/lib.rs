pub mod config;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod session;
pub mod signaling;

pub use config::CallConfig;
pub use error::{CallError, MediaError, Result};
pub use media::{LocalStream, MediaDevices, RemoteStream, SyntheticDevices, TrackKind};
pub use negotiation::CallState;
pub use session::{CallSession, SessionContext, SessionSnapshot};

pub mod model {
    pub use medcall_core::model::*;
}
