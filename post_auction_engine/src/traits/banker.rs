use pag_common::Amount;

use crate::{
    bid_types::{AccountKey, LineItems},
    traits::EventRecorder,
};

/// The external accounting contract the matcher settles against.
///
/// The matcher guarantees that every reservation it opens with [`attach_bid`] is closed by exactly one of
/// [`win_bid`] or [`cancel_bid`] for the same transaction id, on every code path including errors.
/// [`force_win_bid`] settles without a reservation and is used for wins that can no longer be matched to one
/// (late wins over an inferred loss, and wins for auctions the matcher has never seen).
///
/// All methods are called inline on the matcher worker and must not block. Implementations talking to a remote
/// accounting service should enqueue and return.
///
/// [`attach_bid`]: Banker::attach_bid
/// [`win_bid`]: Banker::win_bid
/// [`cancel_bid`]: Banker::cancel_bid
/// [`force_win_bid`]: Banker::force_win_bid
pub trait Banker: Send + Sync {
    /// Reserve `max_price` against the account for the given transaction.
    fn attach_bid(&self, account: &AccountKey, transaction_id: &str, max_price: Amount);

    /// Settle a reserved transaction at `price`, releasing the rest of the reservation.
    fn win_bid(&self, account: &AccountKey, transaction_id: &str, price: Amount, line_items: &LineItems);

    /// Settle a win that has no open reservation, charging the account directly.
    fn force_win_bid(&self, account: &AccountKey, price: Amount, line_items: &LineItems);

    /// Release the reservation for a transaction that did not win.
    fn cancel_bid(&self, account: &AccountKey, transaction_id: &str);

    /// Push accumulated accounting counters to the recorder. Invoked once per expiry sweep.
    fn log_bid_events(&self, recorder: &dyn EventRecorder);
}

/// A banker that swallows every call. For embedders that settle through a side channel, and for tests that only
/// exercise matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBanker;

impl Banker for NullBanker {
    fn attach_bid(&self, _account: &AccountKey, _transaction_id: &str, _max_price: Amount) {}

    fn win_bid(&self, _account: &AccountKey, _transaction_id: &str, _price: Amount, _line_items: &LineItems) {}

    fn force_win_bid(&self, _account: &AccountKey, _price: Amount, _line_items: &LineItems) {}

    fn cancel_bid(&self, _account: &AccountKey, _transaction_id: &str) {}

    fn log_bid_events(&self, _recorder: &dyn EventRecorder) {}
}
