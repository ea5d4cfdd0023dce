use pag_common::{Amount, Id};
use thiserror::Error;

use crate::matcher::pending::PendingError;

/// Failures raised while resolving an event against the pipelines.
///
/// Only a subset is fatal for the event being processed; the rest are reported through the event recorder and
/// resolution continues. The top-level handlers catch all of these, so a poisoned event never stalls the worker.
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error("Ad spot {spot} is not present in auction {auction}")]
    SpotNotFound { auction: Id, spot: Id },
    #[error("Win price {win_price} exceeds bid price {bid_price}")]
    WinPriceExceedsBid { win_price: Amount, bid_price: Amount },
    #[error("Bid response had no bid price")]
    NoBidPrice,
    #[error("Cannot finalise auction {0} with a null ad spot id")]
    NullAdSpot(Id),
    #[error("Bid response carries an empty account key")]
    InvalidAccount,
    #[error("Submission for auction {0}, spot {1} has no bid attached")]
    IncompleteSubmission(Id, Id),
    #[error("Pending map error: {0}")]
    Pending(#[from] PendingError),
}
