use std::sync::Arc;

use chrono::{Duration, Utc};
use post_auction_engine::{
    events::{Confidence, MatchKind, UnmatchedReason},
    test_utils::{
        campaign_event,
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

fn setup() -> (EventMatcher<RecordingBanker>, RecordingBanker, Arc<CountingRecorder>, MatchedLog) {
    let _ = env_logger::try_init();
    let banker = RecordingBanker::default();
    let recorder = Arc::new(CountingRecorder::default());
    let log = MatchedLog::default();
    let matcher = EventMatcher::new(banker.clone(), recorder.clone(), log.hooks(), MatcherConfig::default());
    (matcher, banker, recorder, log)
}

#[test]
fn submission_followed_by_win_settles_and_finishes() {
    let (mut matcher, banker, recorder, log) = setup();

    let request = test_bid_request("auction-1", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(5_000_000));
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, Utc::now() + Duration::seconds(15)));
    matcher.handle_win_loss(win_notice("auction-1", "spot-1", usd(3_000_000)), false);

    let txid = "auction-1-spot-1-agent-a";
    assert_eq!(banker.attaches_for(txid), 1);
    assert_eq!(banker.closures_for(txid), 1);
    assert_eq!(banker.wins(), vec![(txid.to_string(), usd(3_000_000))]);

    let matched = log.win_loss_events();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].kind, MatchKind::Win);
    assert_eq!(matched[0].confidence, Confidence::Guaranteed);
    assert_eq!(matched[0].price, usd(3_000_000));
    assert_eq!(matched[0].win_price, usd(3_000_000));

    assert_eq!(matcher.submitted_count(), 0);
    assert_eq!(matcher.finished_count(), 1);
    assert_eq!(recorder.hit_count("processedAuction"), 1);
    assert_eq!(recorder.hit_count("bidResult.WIN.delivered"), 1);
    assert_eq!(matcher.stats().num_wins, 1);
}

#[test]
fn win_arriving_before_submission_is_buffered_and_replayed() {
    let (mut matcher, banker, recorder, log) = setup();

    // The win outruns the auction record.
    matcher.handle_win_loss(win_notice("auction-2", "spot-1", usd(4_000_000)), false);
    assert_eq!(recorder.hit_count("bidResult.WIN.noBidSubmitted"), 1);
    assert_eq!(matcher.submitted_count(), 1);
    assert!(log.win_loss_events().is_empty());
    assert!(banker.ops().is_empty());

    let request = test_bid_request("auction-2", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(6_000_000));
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, Utc::now() + Duration::seconds(15)));

    assert_eq!(recorder.hit_count("auctionAlreadySubmitted"), 1);
    assert_eq!(recorder.hit_count("replayedEarlyWinEvent"), 1);
    assert_eq!(recorder.hit_count("bidResult.WIN.messagesReplayed"), 1);

    let matched = log.win_loss_events();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].kind, MatchKind::Win);
    assert_eq!(matched[0].confidence, Confidence::Guaranteed);
    assert_eq!(banker.wins(), vec![("auction-2-spot-1-agent-a".to_string(), usd(4_000_000))]);
    assert_eq!(matcher.finished_count(), 1);
}

#[test]
fn several_early_wins_resolve_to_a_single_outcome() {
    let (mut matcher, banker, _recorder, log) = setup();

    // Two identical notices arrive before the auction; the first resolves, the second is a duplicate.
    matcher.handle_win_loss(win_notice("auction-3", "spot-1", usd(2_000_000)), false);
    matcher.handle_win_loss(win_notice("auction-3", "spot-1", usd(2_000_000)), false);
    assert_eq!(matcher.submitted_count(), 1);

    let request = test_bid_request("auction-3", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(6_000_000));
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, Utc::now() + Duration::seconds(15)));

    let matched = log.win_loss_events();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].win_price, usd(2_000_000));
    assert_eq!(banker.wins().len(), 1);
}

#[test]
fn campaign_event_before_resolution_is_buffered_then_replayed() {
    let (mut matcher, _banker, recorder, log) = setup();

    let request = test_bid_request("auction-4", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(5_000_000));
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, Utc::now() + Duration::seconds(15)));

    // Delivery telemetry that only knows the auction, while the outcome is still open.
    matcher.handle_campaign_event(campaign_event("IMPRESSION", "auction-4", ""));
    let unmatched = log.unmatched_events();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].reason, UnmatchedReason::InFlight);
    assert_eq!(recorder.hit_count("delivery.IMPRESSION.stillInFlight"), 1);
    assert!(log.campaign_events().is_empty());

    matcher.handle_win_loss(win_notice("auction-4", "spot-1", usd(3_000_000)), false);

    let campaigns = log.campaign_events();
    assert_eq!(campaigns.len(), 1);
    assert_eq!(campaigns[0].label, "IMPRESSION");
    assert_eq!(campaigns[0].finished.ad_spot_id, "spot-1".into());
    assert_eq!(recorder.hit_count("delivery.IMPRESSION.account.campaigns.summer.matched"), 1);
    assert_eq!(matcher.stats().num_campaign_events, 1);
}

#[test]
fn duplicate_win_is_counted_and_ignored() {
    let (mut matcher, banker, recorder, log) = setup();

    let request = test_bid_request("auction-5", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(5_000_000));
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, Utc::now() + Duration::seconds(15)));
    matcher.handle_win_loss(win_notice("auction-5", "spot-1", usd(3_000_000)), false);

    let ops_before = banker.ops();
    matcher.handle_win_loss(win_notice("auction-5", "spot-1", usd(3_000_000)), false);

    assert_eq!(recorder.hit_count("bidResult.WIN.duplicate"), 1);
    assert_eq!(banker.ops(), ops_before);
    assert_eq!(log.win_loss_events().len(), 1);
}

#[tokio::test]
async fn matched_outputs_fan_out_through_a_relay() {
    use std::sync::Mutex;

    use post_auction_engine::events::{EventRelay, MatchedWinLoss, MatchHooks, MatchProducers, RelayHandler};

    let _ = env_logger::try_init();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: RelayHandler<MatchedWinLoss> = Arc::new(move |ev: MatchedWinLoss| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push((ev.auction_id.clone(), ev.kind));
        })
    });
    let relay = EventRelay::new(handler);

    let mut producers = MatchProducers::default();
    producers.matched_win_loss.push(relay.subscribe());
    let hooks = MatchHooks::from_producers(producers);

    let mut matcher =
        EventMatcher::new(RecordingBanker::default(), Arc::new(CountingRecorder::default()), hooks, MatcherConfig::default());

    let request = test_bid_request("auction-6", &["spot-1"]);
    let response = test_bid_response("campaigns:summer", "agent-a", usd(5_000_000));
    matcher.handle_auction(submitted_auction(&request, "spot-1", response, Utc::now() + Duration::seconds(15)));
    matcher.handle_win_loss(win_notice("auction-6", "spot-1", usd(1_000_000)), false);

    // dropping the matcher drops its hooks and with them the last producer, letting the relay drain and stop
    drop(matcher);
    relay.start_relay().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], ("auction-6".into(), MatchKind::Win));
}
