//! Helpers for exercising the matcher in tests: a banker that records every call, a recorder that counts every
//! metric, hooks that collect every matched output, and builders for the event types.
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
    },
};

use chrono::{DateTime, Utc};
use pag_common::{Amount, Currency, Id};
use serde_json::Value;

use crate::{
    bid_types::{
        AccountKey,
        AdSpot,
        AuctionSubmitted,
        BidPrice,
        BidRequest,
        BidResponse,
        Bids,
        BidStatus,
        CampaignEvent,
        LineItems,
        UserIds,
        WinCostModel,
        WinLossEvent,
    },
    events::{MatchedCampaignEvent, MatchedWinLoss, MatchHooks, UnmatchedEvent},
    traits::{Banker, EventRecorder},
};

//--------------------------------------   RecordingBanker   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum BankerOp {
    Attach { account: AccountKey, transaction_id: String, max_price: Amount },
    Win { account: AccountKey, transaction_id: String, price: Amount },
    ForceWin { account: AccountKey, price: Amount },
    Cancel { account: AccountKey, transaction_id: String },
}

/// A banker that records every call it receives, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingBanker {
    ops: Arc<Mutex<Vec<BankerOp>>>,
    log_events: Arc<AtomicU64>,
}

impl RecordingBanker {
    pub fn ops(&self) -> Vec<BankerOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Reservations opened for the given transaction id.
    pub fn attaches_for(&self, transaction_id: &str) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, BankerOp::Attach { transaction_id: t, .. } if t == transaction_id))
            .count()
    }

    /// Reservations closed (settled or released) for the given transaction id.
    pub fn closures_for(&self, transaction_id: &str) -> usize {
        self.ops()
            .iter()
            .filter(|op| {
                matches!(op, BankerOp::Win { transaction_id: t, .. } | BankerOp::Cancel { transaction_id: t, .. }
                    if t == transaction_id)
            })
            .count()
    }

    pub fn wins(&self) -> Vec<(String, Amount)> {
        self.ops()
            .iter()
            .filter_map(|op| match op {
                BankerOp::Win { transaction_id, price, .. } => Some((transaction_id.clone(), *price)),
                _ => None,
            })
            .collect()
    }

    pub fn force_wins(&self) -> Vec<(AccountKey, Amount)> {
        self.ops()
            .iter()
            .filter_map(|op| match op {
                BankerOp::ForceWin { account, price } => Some((account.clone(), *price)),
                _ => None,
            })
            .collect()
    }

    pub fn log_events_count(&self) -> u64 {
        self.log_events.load(Ordering::Relaxed)
    }
}

impl Banker for RecordingBanker {
    fn attach_bid(&self, account: &AccountKey, transaction_id: &str, max_price: Amount) {
        self.ops.lock().unwrap().push(BankerOp::Attach {
            account: account.clone(),
            transaction_id: transaction_id.to_string(),
            max_price,
        });
    }

    fn win_bid(&self, account: &AccountKey, transaction_id: &str, price: Amount, _line_items: &LineItems) {
        self.ops.lock().unwrap().push(BankerOp::Win {
            account: account.clone(),
            transaction_id: transaction_id.to_string(),
            price,
        });
    }

    fn force_win_bid(&self, account: &AccountKey, price: Amount, _line_items: &LineItems) {
        self.ops.lock().unwrap().push(BankerOp::ForceWin { account: account.clone(), price });
    }

    fn cancel_bid(&self, account: &AccountKey, transaction_id: &str) {
        self.ops.lock().unwrap().push(BankerOp::Cancel {
            account: account.clone(),
            transaction_id: transaction_id.to_string(),
        });
    }

    fn log_bid_events(&self, _recorder: &dyn EventRecorder) {
        self.log_events.fetch_add(1, Ordering::Relaxed);
    }
}

//--------------------------------------  CountingRecorder   ---------------------------------------------------------
/// A recorder that counts hits and keeps every outcome observation.
#[derive(Debug, Default)]
pub struct CountingRecorder {
    hits: Mutex<BTreeMap<String, u64>>,
    outcomes: Mutex<Vec<(String, f64)>>,
}

impl CountingRecorder {
    pub fn hit_count(&self, key: &str) -> u64 {
        self.hits.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn outcomes_for(&self, key: &str) -> Vec<f64> {
        self.outcomes.lock().unwrap().iter().filter(|(k, _)| k == key).map(|(_, v)| *v).collect()
    }
}

impl EventRecorder for CountingRecorder {
    fn record_hit(&self, key: &str) {
        *self.hits.lock().unwrap().entry(key.to_string()).or_insert(0) += 1;
    }

    fn record_outcome(&self, value: f64, key: &str) {
        self.outcomes.lock().unwrap().push((key.to_string(), value));
    }
}

//--------------------------------------     MatchedLog      ---------------------------------------------------------
/// Collects every matched output the matcher emits. Build the hooks with [`MatchedLog::hooks`].
#[derive(Clone, Default)]
pub struct MatchedLog {
    win_loss: Arc<Mutex<Vec<MatchedWinLoss>>>,
    campaign: Arc<Mutex<Vec<MatchedCampaignEvent>>>,
    unmatched: Arc<Mutex<Vec<UnmatchedEvent>>>,
}

impl MatchedLog {
    pub fn hooks(&self) -> MatchHooks {
        let win_loss = self.win_loss.clone();
        let campaign = self.campaign.clone();
        let unmatched = self.unmatched.clone();
        MatchHooks::default()
            .on_matched_win_loss(move |ev| win_loss.lock().unwrap().push(ev))
            .on_matched_campaign_event(move |ev| campaign.lock().unwrap().push(ev))
            .on_unmatched_event(move |ev| unmatched.lock().unwrap().push(ev))
    }

    pub fn win_loss_events(&self) -> Vec<MatchedWinLoss> {
        self.win_loss.lock().unwrap().clone()
    }

    pub fn campaign_events(&self) -> Vec<MatchedCampaignEvent> {
        self.campaign.lock().unwrap().clone()
    }

    pub fn unmatched_events(&self) -> Vec<UnmatchedEvent> {
        self.unmatched.lock().unwrap().clone()
    }
}

//--------------------------------------      Builders       ---------------------------------------------------------
pub fn usd(value: i64) -> Amount {
    Amount::new(value, Currency::Usd)
}

pub fn test_bid_request(auction: &str, spots: &[&str]) -> Arc<BidRequest> {
    Arc::new(BidRequest::new(auction, spots.iter().map(|spot| AdSpot::new(*spot)).collect()))
}

pub fn test_bid_response(account: &str, agent: &str, max_price: Amount) -> BidResponse {
    BidResponse {
        agent: agent.to_string(),
        account: AccountKey::from(account),
        price: BidPrice::new(max_price, 1.0),
        win_cost_model: WinCostModel::default(),
        bids: Bids::default(),
        visit_channels: Vec::new(),
    }
}

pub fn submitted_auction(
    request: &Arc<BidRequest>,
    spot: &str,
    response: BidResponse,
    loss_timeout: DateTime<Utc>,
) -> AuctionSubmitted {
    AuctionSubmitted {
        auction_id: request.auction_id.clone(),
        ad_spot_id: Id::from(spot),
        bid_request: request.clone(),
        bid_response: response,
        loss_timeout,
        augmentations: Value::Null,
    }
}

pub fn win_notice(auction: &str, spot: &str, win_price: Amount) -> WinLossEvent {
    WinLossEvent {
        status: BidStatus::Win,
        auction_id: Id::from(auction),
        ad_spot_id: Id::from(spot),
        win_price,
        timestamp: Utc::now(),
        bid_timestamp: Utc::now(),
        metadata: Value::Null,
        account: AccountKey::default(),
        uids: UserIds::default(),
    }
}

pub fn loss_notice(auction: &str, spot: &str) -> WinLossEvent {
    WinLossEvent { status: BidStatus::Loss, win_price: Amount::zero(), ..win_notice(auction, spot, Amount::zero()) }
}

/// A campaign event; pass `""` as the spot for telemetry that only knows the auction.
pub fn campaign_event(label: &str, auction: &str, spot: &str) -> CampaignEvent {
    CampaignEvent {
        label: label.to_string(),
        auction_id: Id::from(auction),
        ad_spot_id: Id::from(spot),
        timestamp: Utc::now(),
        metadata: Value::Null,
        uids: UserIds::default(),
    }
}
