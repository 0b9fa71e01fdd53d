mod call;
mod config;
mod error;
mod media;
mod peer;
mod signaling;
mod transport;

pub use call::*;
pub use config::*;
pub use error::*;
pub use media::*;
pub use peer::*;
pub use signaling::*;
pub use transport::*;
