pub mod relay;
pub mod session_helpers;

pub use relay::*;
pub use session_helpers::*;
