//! Post-Auction Engine
//!
//! The post-auction engine is the stateful correlator sitting downstream of a real-time bidding system.
//! Bidders commit bids; some time later the exchange reports outcomes (win and loss notices) and post-delivery
//! telemetry (impressions, clicks, visits). The engine joins these asynchronous streams by
//! `(auction id, ad spot id)` and emits matched outcomes to the accounting service (the banker) and to
//! downstream consumers.
//!
//! The streams are unruly: a win can precede the auction record it belongs to, a click can precede the win, and
//! any notice may be duplicated, late, or never sent. The engine buffers early events, infers losses on
//! timeout while still honouring late wins, and guarantees that every reservation it opens with the banker is
//! settled or released exactly once.
//!
//! The library is divided into three main sections:
//! 1. The matcher (`matcher` module): the pipelines, the state machine and its tunables. Drive it with one
//!    worker feeding events and periodic expiry sweeps.
//! 2. The external seams (`traits` module): the [`Banker`] accounting contract and the [`EventRecorder`]
//!    metrics sink, injected at construction.
//! 3. Matched outputs (`events` module): the hook record handed to the matcher, plus a channel relay for
//!    fanning matched events out to async consumers without blocking the worker.
pub mod bid_types;
pub mod events;
pub mod matcher;
pub mod test_utils;
pub mod traits;

pub use matcher::{EventMatcher, MatchError, MatcherConfig, MatcherStats};
pub use traits::{Banker, EventRecorder, NullBanker, NullRecorder};
