mod channel;
mod event_types;
mod hooks;

pub use channel::{EventProducer, EventRelay, RelayHandler};
pub use event_types::*;
pub use hooks::{MatchHandler, MatchHooks, MatchProducers};
