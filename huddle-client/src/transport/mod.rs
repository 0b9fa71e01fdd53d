mod connection;
mod transport_config;
mod transport_event;
mod webrtc_connection;

pub use connection::*;
pub use transport_config::*;
pub use transport_event::*;
pub use webrtc_connection::*;
