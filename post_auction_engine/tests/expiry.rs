use std::sync::Arc;

use chrono::{Duration, Utc};
use pag_common::Amount;
use post_auction_engine::{
    events::{Confidence, MatchKind},
    test_utils::{
        submitted_auction,
        test_bid_request,
        test_bid_response,
        usd,
        win_notice,
        CountingRecorder,
        MatchedLog,
        RecordingBanker,
    },
    EventMatcher,
    MatcherConfig,
};

fn setup(config: MatcherConfig) -> (EventMatcher<RecordingBanker>, RecordingBanker, Arc<CountingRecorder>, MatchedLog) {
    let _ = env_logger::try_init();
    let banker = RecordingBanker::default();
    let recorder = Arc::new(CountingRecorder::default());
    let log = MatchedLog::default();
    let matcher = EventMatcher::new(banker.clone(), recorder.clone(), log.hooks(), config);
    (matcher, banker, recorder, log)
}

#[test]
fn submission_without_outcome_becomes_an_inferred_loss() {
    let (mut matcher, banker, recorder, log) = setup(MatcherConfig::default());

    let request = test_bid_request("auction-1", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(5_000_000));
    let now = Utc::now();
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, now + Duration::seconds(1)));

    // Not due yet: nothing happens.
    matcher.check_expired_auctions(now);
    assert!(log.win_loss_events().is_empty());
    assert_eq!(matcher.submitted_count(), 1);

    // First sweep past the loss timeout declares the loss.
    matcher.check_expired_auctions(now + Duration::seconds(2));

    let matched = log.win_loss_events();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].kind, MatchKind::Loss);
    assert_eq!(matched[0].confidence, Confidence::Inferred);
    assert_eq!(matched[0].price, Amount::zero());

    // The reservation was released through the guard.
    let txid = "auction-1-spot-1-agent-a";
    assert_eq!(banker.attaches_for(txid), 1);
    assert_eq!(banker.closures_for(txid), 1);
    assert!(banker.wins().is_empty());

    assert_eq!(matcher.submitted_count(), 0);
    assert_eq!(matcher.finished_count(), 1);
    assert_eq!(recorder.hit_count("submittedAuctionExpiry"), 1);
    // the banker pushes its event log on every sweep
    assert_eq!(banker.log_events_count(), 2);
}

#[test]
fn late_win_overrides_an_inferred_loss() {
    let (mut matcher, banker, recorder, log) = setup(MatcherConfig::default());

    let request = test_bid_request("auction-2", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(5_000_000));
    let now = Utc::now();
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, now + Duration::seconds(1)));
    matcher.check_expired_auctions(now + Duration::seconds(2));
    assert_eq!(log.win_loss_events().len(), 1);

    // The win notice finally lands.
    matcher.handle_win_loss(win_notice("auction-2", "spot-1", usd(2_000_000)), false);

    let matched = log.win_loss_events();
    assert_eq!(matched.len(), 2);
    assert_eq!(matched[1].kind, MatchKind::LateWin);
    assert_eq!(matched[1].confidence, Confidence::Guaranteed);
    assert_eq!(matched[1].win_price, usd(2_000_000));

    assert_eq!(banker.force_wins(), vec![("campaigns:summer".into(), usd(2_000_000))]);
    assert_eq!(recorder.hit_count("bidResult.WIN.winAfterLossAssumed"), 1);
    assert_eq!(matcher.finished_count(), 1);
}

#[test]
fn loss_after_recorded_win_emits_nothing_further() {
    let (mut matcher, banker, recorder, log) = setup(MatcherConfig::default());

    let request = test_bid_request("auction-3", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(5_000_000));
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, Utc::now() + Duration::seconds(15)));
    matcher.handle_win_loss(win_notice("auction-3", "spot-1", usd(3_000_000)), false);

    let ops_before = banker.ops();
    let mut loss = win_notice("auction-3", "spot-1", Amount::zero());
    loss.status = post_auction_engine::bid_types::BidStatus::Loss;
    matcher.handle_win_loss(loss, false);

    assert_eq!(recorder.hit_count("bidResult.LOSS.auctionAlreadyFinished"), 1);
    assert_eq!(log.win_loss_events().len(), 1);
    assert_eq!(banker.ops(), ops_before);
}

#[test]
fn orphaned_early_win_expires_without_a_bid() {
    let (mut matcher, banker, recorder, log) = setup(MatcherConfig::default());

    matcher.handle_win_loss(win_notice("auction-4", "spot-1", usd(1_000_000)), false);
    assert_eq!(matcher.submitted_count(), 1);

    matcher.check_expired_auctions(Utc::now() + Duration::seconds(20));

    assert_eq!(recorder.hit_count("submittedAuctionExpiryWithoutBid"), 1);
    assert_eq!(matcher.submitted_count(), 0);
    assert_eq!(matcher.finished_count(), 0);
    assert!(log.win_loss_events().is_empty());
    assert!(banker.ops().is_empty());
}

#[test]
fn really_late_unknown_win_settles_against_the_event_account() {
    let (mut matcher, banker, recorder, _log) = setup(MatcherConfig::default());

    let mut notice = win_notice("auction-5", "spot-1", usd(2_500_000));
    notice.bid_timestamp = Utc::now() - Duration::seconds(60);
    notice.account = "campaigns:summer".into();
    matcher.handle_win_loss(notice, false);

    assert_eq!(recorder.hit_count("bidResult.WIN.notInSubmitted"), 1);
    assert_eq!(banker.force_wins(), vec![("campaigns:summer".into(), usd(2_500_000))]);
    assert_eq!(matcher.submitted_count(), 0);
}

#[test]
fn unknown_win_settlement_can_be_switched_off() {
    let mut config = MatcherConfig::default();
    config.settle_unknown_wins = false;
    let (mut matcher, banker, recorder, _log) = setup(config);

    let mut notice = win_notice("auction-6", "spot-1", usd(2_500_000));
    notice.bid_timestamp = Utc::now() - Duration::seconds(60);
    notice.account = "campaigns:summer".into();
    matcher.handle_win_loss(notice, false);

    assert_eq!(recorder.hit_count("bidResult.WIN.notInSubmitted"), 1);
    assert!(banker.ops().is_empty());
}

#[test]
fn far_future_sweep_drains_all_state() {
    let (mut matcher, _banker, recorder, log) = setup(MatcherConfig::default());

    let request = test_bid_request("auction-7", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(5_000_000));
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, Utc::now() + Duration::seconds(15)));

    matcher.check_expired_auctions(Utc::now() + Duration::days(365));

    assert_eq!(matcher.submitted_count(), 0);
    assert_eq!(matcher.finished_count(), 0);
    assert_eq!(log.win_loss_events().len(), 1);
    assert_eq!(log.win_loss_events()[0].kind, MatchKind::Loss);
    assert_eq!(recorder.hit_count("finishedAuctionExpiry"), 1);
}
