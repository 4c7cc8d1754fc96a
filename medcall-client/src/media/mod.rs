mod capture;
mod devices;
mod stream;

pub use capture::*;
pub use devices::*;
pub use stream::*;
