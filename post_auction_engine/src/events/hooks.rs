use std::sync::Arc;

use crate::events::{
    EventProducer,
    MatchedCampaignEvent,
    MatchedWinLoss,
    UnmatchedEvent,
};

/// A synchronous matched-output callback. Runs inline on the matcher worker, so it must not block; hand the
/// event to an [`EventProducer`](crate::events::EventProducer) (see [`MatchHooks::from_producers`]) to fan work
/// out to async consumers.
pub type MatchHandler<E> = Arc<dyn Fn(E) + Send + Sync>;

/// The matched-output callbacks injected into the matcher at construction.
///
/// The typical usage flow is to create a `MatchHooks`, populate the hooks you care about, and hand it to
/// [`EventMatcher::new`](crate::matcher::EventMatcher::new). Hooks that are not set cost nothing.
#[derive(Default, Clone)]
pub struct MatchHooks {
    pub on_matched_win_loss: Option<MatchHandler<MatchedWinLoss>>,
    pub on_matched_campaign_event: Option<MatchHandler<MatchedCampaignEvent>>,
    pub on_unmatched_event: Option<MatchHandler<UnmatchedEvent>>,
}

impl MatchHooks {
    pub fn on_matched_win_loss<F>(mut self, f: F) -> Self
    where F: Fn(MatchedWinLoss) + Send + Sync + 'static {
        self.on_matched_win_loss = Some(Arc::new(f));
        self
    }

    pub fn on_matched_campaign_event<F>(mut self, f: F) -> Self
    where F: Fn(MatchedCampaignEvent) + Send + Sync + 'static {
        self.on_matched_campaign_event = Some(Arc::new(f));
        self
    }

    pub fn on_unmatched_event<F>(mut self, f: F) -> Self
    where F: Fn(UnmatchedEvent) + Send + Sync + 'static {
        self.on_unmatched_event = Some(Arc::new(f));
        self
    }

    /// Build hooks that publish every matched output into the given producers, one clone per subscriber.
    pub fn from_producers(producers: MatchProducers) -> Self {
        let mut hooks = Self::default();
        if !producers.matched_win_loss.is_empty() {
            let subscribers = producers.matched_win_loss;
            hooks = hooks.on_matched_win_loss(move |ev: MatchedWinLoss| {
                for producer in &subscribers {
                    producer.publish(ev.clone());
                }
            });
        }
        if !producers.matched_campaign_event.is_empty() {
            let subscribers = producers.matched_campaign_event;
            hooks = hooks.on_matched_campaign_event(move |ev: MatchedCampaignEvent| {
                for producer in &subscribers {
                    producer.publish(ev.clone());
                }
            });
        }
        if !producers.unmatched_event.is_empty() {
            let subscribers = producers.unmatched_event;
            hooks = hooks.on_unmatched_event(move |ev: UnmatchedEvent| {
                for producer in &subscribers {
                    producer.publish(ev.clone());
                }
            });
        }
        hooks
    }
}

/// A container for the producers feeding each matched-output stream. Subscribe an
/// [`EventRelay`](crate::events::EventRelay) per stream and collect its producers here.
#[derive(Default)]
pub struct MatchProducers {
    pub matched_win_loss: Vec<EventProducer<MatchedWinLoss>>,
    pub matched_campaign_event: Vec<EventProducer<MatchedCampaignEvent>>,
    pub unmatched_event: Vec<EventProducer<UnmatchedEvent>>,
}
