mod capture;
mod local_track;
mod media_manager;
mod silence_capture;

pub use capture::*;
pub use local_track::*;
pub use media_manager::*;
pub use silence_capture::*;
