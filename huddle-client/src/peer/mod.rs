mod negotiation;
mod peer_session;
mod session_registry;

pub use negotiation::*;
pub use peer_session::*;
pub use session_registry::*;
