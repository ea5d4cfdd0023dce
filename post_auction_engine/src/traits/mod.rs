mod banker;
mod event_recorder;

pub use banker::{Banker, NullBanker};
pub use event_recorder::{EventRecorder, LogRecorder, NullRecorder};
