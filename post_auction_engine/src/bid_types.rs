use std::{collections::BTreeMap, fmt::Display, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use log::warn;
use pag_common::{Amount, Id};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

//--------------------------------------     BidStatus       ---------------------------------------------------------
/// The outcome of a bid as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidStatus {
    Win,
    Loss,
}

impl Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BidStatus::Win => write!(f, "WIN"),
            BidStatus::Loss => write!(f, "LOSS"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid bid status: {0}")]
pub struct ConversionError(String);

impl FromStr for BidStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WIN" => Ok(Self::Win),
            "LOSS" => Ok(Self::Loss),
            s => Err(ConversionError(format!("Invalid bid status: {s}"))),
        }
    }
}

//--------------------------------------     AccountKey      ---------------------------------------------------------
/// A hierarchical account path, e.g. `campaigns:summer:banner-a`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountKey(Vec<String>);

impl AccountKey {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// The account path joined with an arbitrary separator. Metric keys use `'.'` so that the account does not
    /// split the key's own dotted segments.
    pub fn to_string_with(&self, separator: char) -> String {
        self.0.join(&separator.to_string())
    }
}

impl From<&str> for AccountKey {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            return Self::default();
        }
        Self(value.split(':').map(String::from).collect())
    }
}

impl From<Vec<String>> for AccountKey {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_with(':'))
    }
}

//--------------------------------------      UserIds        ---------------------------------------------------------
/// User identifiers keyed by domain, carried on events so that delivery telemetry can be routed back to the
/// right user records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIds(BTreeMap<String, Id>);

impl UserIds {
    pub fn insert(&mut self, domain: impl Into<String>, id: Id) {
        self.0.insert(domain.into(), id);
    }

    /// Merge the other set into this one. On a domain collision the incoming id wins.
    pub fn merge(&mut self, other: &UserIds) {
        for (domain, id) in &other.0 {
            self.0.insert(domain.clone(), id.clone());
        }
    }

    pub fn get(&self, domain: &str) -> Option<&Id> {
        self.0.get(domain)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//--------------------------------------      AdSpot         ---------------------------------------------------------
/// A single sellable slot within an auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSpot {
    pub id: Id,
}

impl AdSpot {
    pub fn new(id: impl Into<Id>) -> Self {
        Self { id: id.into() }
    }
}

//--------------------------------------     BidRequest      ---------------------------------------------------------
/// The original request the bidder answered. Carried through the pipelines so that matched outputs can hand the
/// full context to downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRequest {
    pub auction_id: Id,
    pub spots: Vec<AdSpot>,
    pub user_ids: UserIds,
}

impl BidRequest {
    pub fn new(auction_id: impl Into<Id>, spots: Vec<AdSpot>) -> Self {
        Self { auction_id: auction_id.into(), spots, user_ids: UserIds::default() }
    }

    /// The position of the given spot in this request, if it is present.
    pub fn find_ad_spot_index(&self, ad_spot_id: &Id) -> Option<usize> {
        self.spots.iter().position(|spot| &spot.id == ad_spot_id)
    }
}

//--------------------------------------      BidPrice       ---------------------------------------------------------
/// The price attached to a bid response. `priority` breaks ties between equal prices; a response with a zero
/// max price and zero priority is a no-bid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BidPrice {
    pub max_price: Amount,
    pub priority: f64,
}

impl BidPrice {
    pub fn new(max_price: Amount, priority: f64) -> Self {
        Self { max_price, priority }
    }
}

//--------------------------------------        Bid          ---------------------------------------------------------
/// Per-spot bid data attached to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub spot_index: usize,
    pub max_price: Amount,
    pub priority: f64,
}

/// All the per-spot bids carried by a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bids(Vec<Bid>);

impl Bids {
    pub fn new(bids: Vec<Bid>) -> Self {
        Self(bids)
    }

    pub fn bid_for_spot(&self, spot_index: usize) -> Option<&Bid> {
        self.0.iter().find(|b| b.spot_index == spot_index)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//--------------------------------------   WinCostModel      ---------------------------------------------------------
/// Maps a reported win price to the effective cost of a win.
///
/// The model name selects the pricing rule; `data` carries model parameters and, at evaluation time, the win
/// notice metadata under the `"win"` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WinCostModel {
    pub model: String,
    pub data: serde_json::Map<String, Value>,
}

impl WinCostModel {
    pub fn named(model: impl Into<String>) -> Self {
        Self { model: model.into(), data: serde_json::Map::new() }
    }

    /// Attach the win notice metadata so the model can price on it.
    pub fn with_win_meta(mut self, meta: Value) -> Self {
        self.data.insert("win".to_string(), meta);
        self
    }

    /// The effective cost of winning at `win_price`.
    ///
    /// The empty model is the pass-through (second-price) rule. Unknown model names fall back to pass-through
    /// rather than mispricing the win.
    pub fn evaluate(&self, _bid: Option<&Bid>, win_price: Amount) -> Amount {
        match self.model.as_str() {
            "" => win_price,
            other => {
                warn!("💱️ Unknown win cost model '{other}', falling back to the win price");
                win_price
            },
        }
    }
}

//--------------------------------------     LineItems       ---------------------------------------------------------
/// A settlement breakdown handed to the accounting service. The matcher always settles without a breakdown, so
/// the empty value is the only one it ever constructs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItems(Vec<LineItem>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub amount: Amount,
}

impl LineItems {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//--------------------------------------    BidResponse      ---------------------------------------------------------
/// The bid the agent placed, as committed by the bidder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidResponse {
    /// The agent that placed the bid; part of the banker transaction id.
    pub agent: String,
    pub account: AccountKey,
    pub price: BidPrice,
    pub win_cost_model: WinCostModel,
    pub bids: Bids,
    /// Delivery channels whose visit telemetry should be routed back for this bid.
    pub visit_channels: Vec<String>,
}

//--------------------------------------  AuctionSubmitted   ---------------------------------------------------------
/// The bidder has committed a bid on an auction spot; the outcome is not yet known.
#[derive(Debug, Clone)]
pub struct AuctionSubmitted {
    pub auction_id: Id,
    pub ad_spot_id: Id,
    pub bid_request: Arc<BidRequest>,
    pub bid_response: BidResponse,
    /// The instant at which, absent a win notice, the bid is declared an inferred loss.
    pub loss_timeout: DateTime<Utc>,
    /// Opaque augmentation payload attached by the bid pipeline; carried through unmodified.
    pub augmentations: Value,
}

//--------------------------------------    WinLossEvent     ---------------------------------------------------------
/// An exchange outcome notice. May arrive late, duplicated, or not at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinLossEvent {
    pub status: BidStatus,
    pub auction_id: Id,
    pub ad_spot_id: Id,
    pub win_price: Amount,
    pub timestamp: DateTime<Utc>,
    /// When the bid this notice refers to was placed. Drives the orphan-win window.
    pub bid_timestamp: DateTime<Utc>,
    pub metadata: Value,
    /// The account to settle against when the notice cannot be matched to a reservation.
    pub account: AccountKey,
    pub uids: UserIds,
}

//--------------------------------------   CampaignEvent     ---------------------------------------------------------
/// Post-delivery telemetry (impression, click, conversion, visit) keyed by a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEvent {
    pub label: String,
    pub auction_id: Id,
    /// May be null: delivery often knows the auction but not which spot. Prefix completion resolves it.
    pub ad_spot_id: Id,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
    pub uids: UserIds,
}

//-------------------------------------- PostAuctionEvent    ---------------------------------------------------------
/// Any event the exchange can deliver after an auction closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PostAuctionEvent {
    WinLoss(WinLossEvent),
    Campaign(CampaignEvent),
}
