use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Utc};
use pag_common::{Amount, Id};
use serde_json::Value;

use crate::{
    bid_types::{AccountKey, BidRequest, BidResponse, CampaignEvent, UserIds},
    matcher::FinishedInfo,
};

//--------------------------------------     MatchKind       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Win,
    Loss,
    /// A win notice received after the auction had already been marked as an inferred loss.
    LateWin,
}

impl Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::Win => write!(f, "Win"),
            MatchKind::Loss => write!(f, "Loss"),
            MatchKind::LateWin => write!(f, "LateWin"),
        }
    }
}

//--------------------------------------     Confidence      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// The exchange reported this outcome.
    Guaranteed,
    /// The matcher deduced this outcome (a loss assumed on timeout, or a loss notice standing in for one).
    Inferred,
}

impl Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Guaranteed => write!(f, "Guaranteed"),
            Confidence::Inferred => write!(f, "Inferred"),
        }
    }
}

//--------------------------------------   MatchedWinLoss    ---------------------------------------------------------
/// A resolved auction outcome, carrying the full bid context for downstream consumers.
#[derive(Debug, Clone)]
pub struct MatchedWinLoss {
    pub kind: MatchKind,
    pub confidence: Confidence,
    pub auction_id: Id,
    pub ad_spot_id: Id,
    pub spot_index: Option<usize>,
    pub account: AccountKey,
    /// The price reported by the exchange.
    pub win_price: Amount,
    /// The effective cost after the win cost model.
    pub price: Amount,
    pub bid_request: Arc<BidRequest>,
    pub bid_response: BidResponse,
    pub timestamp: DateTime<Utc>,
    pub uids: UserIds,
    pub metadata: Value,
}

impl MatchedWinLoss {
    pub(crate) fn new(
        kind: MatchKind,
        confidence: Confidence,
        info: &FinishedInfo,
        timestamp: DateTime<Utc>,
        uids: UserIds,
    ) -> Self {
        Self {
            kind,
            confidence,
            auction_id: info.auction_id.clone(),
            ad_spot_id: info.ad_spot_id.clone(),
            spot_index: info.spot_index,
            account: info.bid.account.clone(),
            win_price: info.win_price,
            price: info.price,
            bid_request: info.bid_request.clone(),
            bid_response: info.bid.clone(),
            timestamp,
            uids,
            metadata: info.win_meta.clone(),
        }
    }
}

//-------------------------------------- MatchedCampaignEvent ---------------------------------------------------------
/// A delivery event joined to its finished auction.
#[derive(Debug, Clone)]
pub struct MatchedCampaignEvent {
    pub label: String,
    pub finished: FinishedInfo,
}

//--------------------------------------   UnmatchedEvent    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedReason {
    /// The auction is still unresolved; the event was buffered for replay.
    InFlight,
    /// The label was already recorded for this auction.
    Duplicate,
    /// Neither pipeline knows the auction.
    AuctionNotFound,
}

impl Display for UnmatchedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnmatchedReason::InFlight => write!(f, "inFlight"),
            UnmatchedReason::Duplicate => write!(f, "duplicate"),
            UnmatchedReason::AuctionNotFound => write!(f, "auctionNotFound"),
        }
    }
}

/// A delivery event the matcher could not (or not yet) join to a finished auction.
#[derive(Debug, Clone)]
pub struct UnmatchedEvent {
    pub reason: UnmatchedReason,
    pub event: CampaignEvent,
}
