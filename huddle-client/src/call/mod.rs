mod call_command;
mod call_controller;
mod call_handle;
mod call_session;
mod render_sink;
mod snapshot;

pub use call_command::*;
pub use call_controller::*;
pub use call_handle::*;
pub use call_session::*;
pub use render_sink::*;
pub use snapshot::*;
