use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use pag_common::{Amount, Id};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bid_types::{BidRequest, BidResponse, BidStatus, CampaignEvent, UserIds, WinLossEvent};

//--------------------------------------   SubmissionInfo    ---------------------------------------------------------
/// The record of a bid whose outcome is not yet final.
///
/// A submission is usually created from an [`crate::bid_types::AuctionSubmitted`] event, in which case
/// `bid_request` and `bid` are populated. When a win notice outruns the submission record, an empty
/// `SubmissionInfo` is created to buffer it, and the request and bid arrive later.
///
/// The two replay buffers live here so that buffered events share the submission's lifetime: when the key
/// expires, the buffered events are dropped with it.
#[derive(Debug, Clone, Default)]
pub struct SubmissionInfo {
    pub bid_request: Option<Arc<BidRequest>>,
    pub bid: Option<BidResponse>,
    /// Opaque augmentation payload carried over from the submission event.
    pub augmentations: Value,
    /// Win/loss notices that arrived before the submission record.
    pub early_win_events: Vec<WinLossEvent>,
    /// Campaign events that arrived while the auction was still unresolved.
    pub early_campaign_events: Vec<CampaignEvent>,
}

impl SubmissionInfo {
    /// True once the submission record itself has arrived (as opposed to a buffer-only entry created by an
    /// early win).
    pub fn has_submission(&self) -> bool {
        self.bid_request.is_some()
    }
}

//--------------------------------------   CampaignEvents    ---------------------------------------------------------
/// The campaign events reached for a finished auction, keyed by label. Each label is recorded at most once;
/// later arrivals with the same label are duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignEvents(BTreeMap<String, CampaignEventRecord>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignEventRecord {
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

impl CampaignEvents {
    pub fn has_event(&self, label: &str) -> bool {
        self.0.contains_key(label)
    }

    pub fn set_event(&mut self, label: impl Into<String>, timestamp: DateTime<Utc>, metadata: Value) {
        self.0.insert(label.into(), CampaignEventRecord { timestamp, metadata });
    }

    pub fn get(&self, label: &str) -> Option<&CampaignEventRecord> {
        self.0.get(label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//--------------------------------------    FinishedInfo     ---------------------------------------------------------
/// The record of a resolved auction, retained while late wins and delivery telemetry may still arrive.
#[derive(Debug, Clone)]
pub struct FinishedInfo {
    pub auction_id: Id,
    pub ad_spot_id: Id,
    /// Position of the spot in the original request. `None` when the spot id was not found there; resolution
    /// proceeds regardless, so downstream consumers must tolerate the gap.
    pub spot_index: Option<usize>,
    pub bid_request: Arc<BidRequest>,
    pub bid: BidResponse,
    /// How the auction was resolved. Flipped from `Loss` to `Win` by [`FinishedInfo::force_win`].
    pub reported_status: BidStatus,
    pub resolved_at: DateTime<Utc>,
    /// The effective cost after the win cost model; zero for losses.
    pub price: Amount,
    /// The win price as reported by the exchange, preserved for reporting.
    pub win_price: Amount,
    pub win_meta: Value,
    pub campaign_events: CampaignEvents,
    pub uids: UserIds,
    /// Channels whose visit telemetry is routed back for this bid, copied from the response.
    pub visit_channels: Vec<String>,
}

impl FinishedInfo {
    /// Override an inferred loss with a late win. The win price becomes the effective price: late wins settle
    /// without the cost model, exactly as the banker is charged via the forced settlement.
    pub fn force_win(&mut self, timestamp: DateTime<Utc>, win_price: Amount, meta: Value) {
        self.reported_status = BidStatus::Win;
        self.resolved_at = timestamp;
        self.win_price = win_price;
        self.price = win_price;
        self.win_meta = meta;
    }

    /// Merge user ids reported by a delivery event into the finished record's index.
    pub fn add_uids(&mut self, uids: &UserIds) {
        self.uids.merge(uids);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn campaign_events_record_once() {
        let mut events = CampaignEvents::default();
        let now = Utc::now();
        assert!(!events.has_event("CLICK"));
        events.set_event("CLICK", now, Value::Null);
        assert!(events.has_event("CLICK"));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn submission_without_request_has_no_submission() {
        let info = SubmissionInfo::default();
        assert!(!info.has_submission());
    }
}
