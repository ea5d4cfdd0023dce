use std::{
    cmp::Ordering,
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use log::*;
use pag_common::{Amount, Id};
use serde_json::Value;

use crate::{
    bid_types::{
        AccountKey,
        AuctionSubmitted,
        BidStatus,
        CampaignEvent,
        LineItems,
        PostAuctionEvent,
        UserIds,
        WinLossEvent,
    },
    events::{Confidence, MatchedCampaignEvent, MatchedWinLoss, MatchHooks, MatchKind, UnmatchedEvent, UnmatchedReason},
    matcher::{
        info::{FinishedInfo, SubmissionInfo},
        pending::PendingMap,
        MatchError,
        MatcherConfig,
    },
    traits::{Banker, EventRecorder},
};

/// The banker transaction id for a bid: `"{auction}-{spot}-{agent}"`.
///
/// No escaping is applied; components containing `-` make the id ambiguous, and callers either keep their ids
/// free of the separator or accept the resulting non-injectivity.
pub fn make_bid_id(auction_id: &Id, ad_spot_id: &Id, agent: &str) -> String {
    format!("{auction_id}-{ad_spot_id}-{agent}")
}

/// Locate a pending entry by auction id and (possibly null) spot id.
///
/// A null spot id is completed against the smallest spot stored for the auction, which is how delivery
/// telemetry that only knows the auction gets joined to a concrete spot.
fn find_auction<V: Clone>(
    pending: &PendingMap<(Id, Id), V>,
    auction_id: &Id,
    ad_spot_id: &Id,
) -> Option<((Id, Id), V)> {
    let key = if ad_spot_id.is_null() {
        pending.complete_prefix(auction_id)?
    } else {
        (auction_id.clone(), ad_spot_id.clone())
    };
    let value = pending.get(&key)?.clone();
    Some((key, value))
}

//--------------------------------------      BidGuard       ---------------------------------------------------------
/// Scope guard that releases a bid reservation unless the resolution explicitly settles it.
///
/// From the moment the guard exists, exactly one of `win_bid` (after [`BidGuard::disarm`]) or `cancel_bid`
/// (on drop) is issued for the transaction, whichever way the resolving function exits.
struct BidGuard<'a> {
    banker: &'a dyn Banker,
    account: &'a AccountKey,
    transaction_id: &'a str,
    armed: bool,
}

impl<'a> BidGuard<'a> {
    fn new(banker: &'a dyn Banker, account: &'a AccountKey, transaction_id: &'a str) -> Self {
        Self { banker, account, transaction_id, armed: true }
    }

    /// Hand accounting over to an explicit settlement call.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for BidGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.banker.cancel_bid(self.account, self.transaction_id);
        }
    }
}

//--------------------------------------    MatcherStats     ---------------------------------------------------------
/// Monotonic counters maintained by the matcher. Readable from any thread while the worker is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherStats {
    pub num_wins: u64,
    pub num_losses: u64,
    pub num_campaign_events: u64,
}

//--------------------------------------    EventMatcher     ---------------------------------------------------------
/// The state machine that joins auction submissions, exchange outcome notices and delivery telemetry into
/// matched outcomes, settling the money attached to each transition through the [`Banker`].
///
/// The matcher is single-writer: one worker feeds it events and periodic [`check_expired_auctions`] sweeps.
/// Matched outputs are delivered through the [`MatchHooks`] injected at construction and run inline on that
/// worker.
///
/// [`check_expired_auctions`]: EventMatcher::check_expired_auctions
pub struct EventMatcher<B> {
    submitted: PendingMap<(Id, Id), SubmissionInfo>,
    finished: PendingMap<(Id, Id), FinishedInfo>,
    banker: B,
    recorder: Arc<dyn EventRecorder>,
    hooks: MatchHooks,
    config: MatcherConfig,
    num_wins: AtomicU64,
    num_losses: AtomicU64,
    num_campaign_events: AtomicU64,
}

impl<B> Debug for EventMatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventMatcher(submitted: {}, finished: {})", self.submitted.len(), self.finished.len())
    }
}

impl<B> EventMatcher<B> {
    pub fn new(banker: B, recorder: Arc<dyn EventRecorder>, hooks: MatchHooks, config: MatcherConfig) -> Self {
        Self {
            submitted: PendingMap::new(),
            finished: PendingMap::new(),
            banker,
            recorder,
            hooks,
            config,
            num_wins: AtomicU64::new(0),
            num_losses: AtomicU64::new(0),
            num_campaign_events: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn banker(&self) -> &B {
        &self.banker
    }

    /// Auctions awaiting an outcome.
    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }

    /// Resolved auctions retained for late wins and delivery telemetry.
    pub fn finished_count(&self) -> usize {
        self.finished.len()
    }

    pub fn stats(&self) -> MatcherStats {
        MatcherStats {
            num_wins: self.num_wins.load(AtomicOrdering::Relaxed),
            num_losses: self.num_losses.load(AtomicOrdering::Relaxed),
            num_campaign_events: self.num_campaign_events.load(AtomicOrdering::Relaxed),
        }
    }

    fn record_hit(&self, key: &str) {
        self.recorder.record_hit(key);
    }

    fn record_outcome(&self, value: f64, key: &str) {
        self.recorder.record_outcome(value, key);
    }

    /// Record and log a non-fatal processing error.
    fn report_error(&self, key: &str, message: &str) {
        error!("⚖️ {key}: {message}");
        self.record_hit(&format!("error.{key}"));
    }

    fn emit_matched_win_loss(&self, event: MatchedWinLoss) {
        if let Some(hook) = &self.hooks.on_matched_win_loss {
            hook(event);
        }
    }

    fn emit_matched_campaign_event(&self, event: MatchedCampaignEvent) {
        if let Some(hook) = &self.hooks.on_matched_campaign_event {
            hook(event);
        }
    }

    fn emit_unmatched(&self, reason: UnmatchedReason, event: CampaignEvent) {
        if let Some(hook) = &self.hooks.on_unmatched_event {
            hook(UnmatchedEvent { reason, event });
        }
    }
}

impl<B> EventMatcher<B>
where B: Banker
{
    /// Dispatch a post-auction event to the right handler. Errors are logged and swallowed so that one poisoned
    /// event cannot stall the worker.
    pub fn handle_event(&mut self, event: PostAuctionEvent) {
        match event {
            PostAuctionEvent::WinLoss(ev) => self.handle_win_loss(ev, false),
            PostAuctionEvent::Campaign(ev) => self.handle_campaign_event(ev),
        }
    }

    /// A bid has been committed: move the auction into the submitted pipeline, reserve the funds and replay any
    /// win notices that outran the submission record.
    pub fn handle_auction(&mut self, event: AuctionSubmitted) {
        let auction_id = event.auction_id.clone();
        if let Err(e) = self.do_auction(event) {
            error!("🔨️ Ignored error while handling submitted auction {auction_id}: {e}");
        }
    }

    /// Process an exchange outcome notice. `is_replay` marks notices drained from an early-win buffer.
    pub fn handle_win_loss(&mut self, event: WinLossEvent, is_replay: bool) {
        let status = event.status;
        let auction_id = event.auction_id.clone();
        if let Err(e) = self.do_win_loss(event, is_replay) {
            error!("🏆️ Ignored error while handling {status} notice for auction {auction_id}: {e}");
        }
    }

    /// Process a delivery telemetry event.
    pub fn handle_campaign_event(&mut self, event: CampaignEvent) {
        let label = event.label.clone();
        if let Err(e) = self.do_campaign_event(event) {
            error!("📣️ Ignored error while handling campaign event {label}: {e}");
        }
    }

    fn do_auction(&mut self, event: AuctionSubmitted) -> Result<(), MatchError> {
        self.record_hit("processedAuction");

        let key = (event.auction_id.clone(), event.ad_spot_id.clone());

        // A win may already have arrived for this auction; keep its buffered notices for replay below.
        let mut submission = SubmissionInfo::default();
        let mut early_wins = Vec::new();
        if let Some(existing) = self.submitted.pop(&key) {
            submission = existing;
            early_wins = std::mem::take(&mut submission.early_win_events);
            self.record_hit("auctionAlreadySubmitted");
        }

        let account = event.bid_response.account.clone();
        let agent = event.bid_response.agent.clone();
        let max_price = event.bid_response.price.max_price;

        submission.bid_request = Some(event.bid_request);
        submission.bid = Some(event.bid_response);
        submission.augmentations = event.augmentations;

        self.submitted.insert(key.clone(), submission, event.loss_timeout);

        let transaction_id = make_bid_id(&key.0, &key.1, &agent);
        self.banker.attach_bid(&account, &transaction_id, max_price);
        trace!("🔨️ Auction {} spot {} submitted; reserved {max_price} on [{transaction_id}]", key.0, key.1);

        for early in early_wins {
            self.record_hit("replayedEarlyWinEvent");
            self.do_win_loss(early, true)?;
        }
        Ok(())
    }

    fn do_win_loss(&mut self, event: WinLossEvent, is_replay: bool) -> Result<(), MatchError> {
        let status = event.status;
        match status {
            BidStatus::Win => {
                self.num_wins.fetch_add(1, AtomicOrdering::Relaxed);
                self.record_hit("processedWin");
            },
            BidStatus::Loss => {
                self.num_losses.fetch_add(1, AtomicOrdering::Relaxed);
                self.record_hit("processedLoss");
            },
        }
        if is_replay {
            self.record_hit(&format!("bidResult.{status}.messagesReplayed"));
        } else {
            self.record_hit(&format!("bidResult.{status}.messagesReceived"));
        }

        let key = (event.auction_id.clone(), event.ad_spot_id.clone());
        let time_gap_ms = (Utc::now() - event.bid_timestamp).num_milliseconds() as f64;

        // The auction may already be finished: either this notice is a duplicate, or no notice arrived in time
        // and a loss was inferred, making this a late win.
        if let Some(info) = self.finished.get(&key) {
            let mut info = info.clone();
            if info.reported_status == status {
                if event.win_price == info.win_price {
                    self.record_hit(&format!("bidResult.{status}.duplicate"));
                } else {
                    self.record_hit(&format!("bidResult.{status}.duplicateWithDifferentPrice"));
                }
                return Ok(());
            }
            self.record_hit(&format!("bidResult.{status}.auctionAlreadyFinished"));
            self.record_outcome(time_gap_ms, &format!("bidResult.{status}.alreadyFinishedTimeSinceBidSubmittedMs"));

            if status == BidStatus::Win {
                // Late win overriding an inferred loss. The reservation is long released, so settle directly.
                info!(
                    "🏆️ Late win for auction {} spot {} at {}; overriding the inferred loss",
                    key.0, key.1, event.win_price
                );
                self.banker.force_win_bid(&info.bid.account, event.win_price, &LineItems::default());
                info.force_win(event.timestamp, event.win_price, event.metadata.clone());
                self.finished.update(&key, info.clone())?;
                self.emit_matched_win_loss(MatchedWinLoss::new(
                    MatchKind::LateWin,
                    Confidence::Guaranteed,
                    &info,
                    event.timestamp,
                    event.uids.clone(),
                ));
                self.record_hit(&format!("bidResult.{status}.winAfterLossAssumed"));
                self.record_outcome(
                    event.win_price.value() as f64,
                    &format!("bidResult.{status}.winAfterLossAssumedAmount.{}", event.win_price.currency().code()),
                );
            }
            return Ok(());
        }

        if !self.submitted.contains(&key) {
            if time_gap_ms < self.config.loss_timeout.num_milliseconds() as f64 {
                // The notice outran the submission record. Buffer it and wait for the auction.
                self.record_hit(&format!("bidResult.{status}.noBidSubmitted"));
                let mut info = SubmissionInfo::default();
                info.early_win_events.push(event);
                let expiry = Utc::now() + self.config.loss_timeout;
                self.submitted.insert(key, info, expiry);
                return Ok(());
            }

            error!(
                "🏆️ {status} notice for unknown auction {} spot {} arrived {time_gap_ms:.0}ms after the bid; \
                 account = {}, win price = {}",
                key.0, key.1, event.account, event.win_price
            );
            self.record_hit(&format!("bidResult.{status}.notInSubmitted"));
            self.record_outcome(time_gap_ms, &format!("bidResult.{status}.notInSubmittedTimeSinceBidSubmittedMs"));

            // Settlement bypassing the reservation flow: the only record of this win is the notice itself.
            if self.config.settle_unknown_wins && !event.account.is_empty() {
                self.banker.force_win_bid(&event.account, event.win_price, &LineItems::default());
            }
            return Ok(());
        }

        let mut submission = match self.submitted.pop(&key) {
            Some(submission) => submission,
            None => return Ok(()),
        };
        if !submission.has_submission() {
            // A second notice before the auction itself; keep buffering.
            submission.early_win_events.push(event);
            let expiry = Utc::now() + self.config.loss_timeout;
            self.submitted.insert(key, submission, expiry);
            return Ok(());
        }

        self.record_hit(&format!("bidResult.{status}.delivered"));

        let confidence = match status {
            BidStatus::Win => Confidence::Guaranteed,
            BidStatus::Loss => Confidence::Inferred,
        };
        let early_campaign = std::mem::take(&mut submission.early_campaign_events);
        self.resolve_bid(
            &key,
            &submission,
            event.win_price,
            event.timestamp,
            status,
            confidence,
            &event.metadata,
            &event.uids,
        )?;

        for campaign in early_campaign {
            self.handle_campaign_event(campaign);
        }
        Ok(())
    }

    /// The resolution primitive: settle the bid with the banker, emit the matched outcome and move the key to
    /// the finished pipeline.
    #[allow(clippy::too_many_arguments)]
    fn resolve_bid(
        &mut self,
        key: &(Id, Id),
        submission: &SubmissionInfo,
        win_price: Amount,
        timestamp: DateTime<Utc>,
        status: BidStatus,
        confidence: Confidence,
        win_meta: &Value,
        uids: &UserIds,
    ) -> Result<(), MatchError> {
        let (auction_id, ad_spot_id) = key;
        if ad_spot_id.is_null() {
            return Err(MatchError::NullAdSpot(auction_id.clone()));
        }
        let bid_request = submission
            .bid_request
            .clone()
            .ok_or_else(|| MatchError::IncompleteSubmission(auction_id.clone(), ad_spot_id.clone()))?;
        let response = submission
            .bid
            .as_ref()
            .ok_or_else(|| MatchError::IncompleteSubmission(auction_id.clone(), ad_spot_id.clone()))?;

        let spot_index = bid_request.find_ad_spot_index(ad_spot_id);
        if spot_index.is_none() {
            let e = MatchError::SpotNotFound { auction: auction_id.clone(), spot: ad_spot_id.clone() };
            self.report_error("doBidResult.adSpotIdNotFound", &e.to_string());
        }

        let account = response.account.clone();
        if account.is_empty() {
            return Err(MatchError::InvalidAccount);
        }

        let bid_price = response.price.max_price;
        if win_price.partial_cmp(&bid_price) == Some(Ordering::Greater) {
            let e = MatchError::WinPriceExceedsBid { win_price, bid_price };
            self.report_error("doBidResult.winPriceExceedsBidPrice", &e.to_string());
        }

        let transaction_id = make_bid_id(auction_id, ad_spot_id, &response.agent);

        // Account for the bid no matter which path leaves this function.
        let guard = BidGuard::new(&self.banker, &account, &transaction_id);

        if bid_price.is_zero() && response.price.priority == 0.0 {
            self.report_error("doBidResult.responseadNoBidPrice", "bid response had no bid price");
            return Err(MatchError::NoBidPrice);
        }

        let mut price = win_price;
        if status == BidStatus::Win {
            let wcm = response.win_cost_model.clone().with_win_meta(win_meta.clone());
            let bid = spot_index.and_then(|index| response.bids.bid_for_spot(index));
            price = wcm.evaluate(bid, win_price);

            let account_path = account.to_string_with('.');
            self.recorder.record_outcome(
                win_price.value() as f64,
                &format!("accounts.{account_path}.winPrice.{}", win_price.currency().code()),
            );
            self.recorder.record_outcome(
                price.value() as f64,
                &format!("accounts.{account_path}.winCostPrice.{}", price.currency().code()),
            );

            // This is a real win: the explicit settlement takes over from the guard.
            guard.disarm();
            self.banker.win_bid(&account, &transaction_id, price, &LineItems::default());
            debug!("💰️ Settled [{transaction_id}] at {price} (reported win price {win_price})");
        }

        let info = FinishedInfo {
            auction_id: auction_id.clone(),
            ad_spot_id: ad_spot_id.clone(),
            spot_index,
            bid_request,
            bid: response.clone(),
            reported_status: status,
            resolved_at: timestamp,
            price,
            win_price,
            win_meta: win_meta.clone(),
            campaign_events: Default::default(),
            uids: uids.clone(),
            visit_channels: response.visit_channels.clone(),
        };

        let kind = match status {
            BidStatus::Win => MatchKind::Win,
            BidStatus::Loss => MatchKind::Loss,
        };
        self.emit_matched_win_loss(MatchedWinLoss::new(kind, confidence, &info, timestamp, uids.clone()));

        let retention = match status {
            BidStatus::Win => self.config.win_timeout,
            BidStatus::Loss => self.config.auction_timeout,
        };
        self.finished.insert(key.clone(), info, Utc::now() + retention);
        Ok(())
    }

    fn do_campaign_event(&mut self, event: CampaignEvent) -> Result<(), MatchError> {
        let label = event.label.clone();
        self.record_hit(&format!("delivery.EVENT.{label}.messagesReceived"));

        // Still unresolved: buffer the event on the submission, to be replayed once the outcome lands.
        if let Some((key, mut submission)) = find_auction(&self.submitted, &event.auction_id, &event.ad_spot_id) {
            self.record_hit(&format!("delivery.{label}.stillInFlight"));
            self.report_error(
                &format!("doCampaignEvent.auctionNotWon{label}"),
                "delivery event for an auction that is not resolved yet",
            );
            self.emit_unmatched(UnmatchedReason::InFlight, event.clone());
            submission.early_campaign_events.push(event);
            self.submitted.update(&key, submission)?;
            return Ok(());
        }

        if let Some((key, mut info)) = find_auction(&self.finished, &event.auction_id, &event.ad_spot_id) {
            if info.campaign_events.has_event(&label) {
                self.record_hit(&format!("delivery.{label}.duplicate"));
                self.report_error(&format!("doCampaignEvent.duplicate{label}"), "delivery event duplicated");
                self.emit_unmatched(UnmatchedReason::Duplicate, event);
                return Ok(());
            }

            info.campaign_events.set_event(label.clone(), event.timestamp, event.metadata.clone());
            self.num_campaign_events.fetch_add(1, AtomicOrdering::Relaxed);
            self.record_hit(&format!("delivery.{label}.account.{}.matched", info.bid.account.to_string_with('.')));

            if key.1.is_null() {
                return Err(MatchError::NullAdSpot(key.0));
            }

            // Index the user ids reported with the delivery so later visits can be routed.
            info.add_uids(&event.uids);
            self.finished.update(&key, info.clone())?;
            self.emit_matched_campaign_event(MatchedCampaignEvent { label, finished: info });
            return Ok(());
        }

        self.record_hit(&format!("delivery.{label}.auctionNotFound"));
        self.report_error(&format!("doCampaignEvent.auctionNotFound{label}"), "auction not found for delivery event");
        self.emit_unmatched(UnmatchedReason::AuctionNotFound, event);
        Ok(())
    }

    /// The periodic sweep: submitted auctions whose loss timeout has passed become inferred losses, and
    /// finished auctions past their retention are dropped. Finally the banker pushes its accumulated
    /// accounting counters to the recorder.
    ///
    /// Per-entry failures are reported and do not stop the sweep. Calling this with a far-future `now` drains
    /// all in-flight state.
    pub fn check_expired_auctions(&mut self, now: DateTime<Utc>) {
        debug!("🧹️ Checking {} submitted auctions for inferred losses", self.submitted.len());

        let recorder = self.recorder.clone();
        let mut inferred = Vec::new();
        self.submitted.expire(
            |key, info| {
                recorder.record_hit("submittedAuctionExpiry");
                if !info.has_submission() {
                    // Only early wins ever arrived; there is no bid to resolve.
                    recorder.record_hit("submittedAuctionExpiryWithoutBid");
                    return None;
                }
                inferred.push((key.clone(), info.clone()));
                None
            },
            now,
        );

        for (key, info) in inferred {
            if let Err(e) = self.resolve_bid(
                &key,
                &info,
                Amount::zero(),
                now,
                BidStatus::Loss,
                Confidence::Inferred,
                &Value::Null,
                &UserIds::default(),
            ) {
                error!("🧹️ Error handling expired auction {} spot {}: {e}", key.0, key.1);
                self.report_error("checkExpiredAuctions.loss", &e.to_string());
            }
        }

        debug!("🧹️ Checking {} finished auctions for expiry", self.finished.len());
        let recorder = self.recorder.clone();
        self.finished.expire(
            |_key, _info| {
                recorder.record_hit("finishedAuctionExpiry");
                None
            },
            now,
        );

        self.banker.log_bid_events(self.recorder.as_ref());
    }
}
