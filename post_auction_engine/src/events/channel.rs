//! Channel relay between the matcher worker and async consumers
//!
//! Matched-output hooks run inline on the matcher worker and must never block it. This module provides the
//! fan-out half: an [`EventProducer`] performs a non-blocking send into an unbounded channel, and an
//! [`EventRelay`] drains the channel on a tokio runtime, spawning the (async) consumer for each event.
use std::{
    future::Future,
    pin::Pin,
    sync::{atomic::AtomicI64, Arc},
};

use log::*;
use tokio::sync::mpsc;

pub type RelayHandler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventRelay<E: Send + Sync + 'static> {
    listener: mpsc::UnboundedReceiver<E>,
    sender: mpsc::UnboundedSender<E>,
    handler: RelayHandler<E>,
}

impl<E: Send + Sync + 'static> EventRelay<E> {
    pub fn new(handler: RelayHandler<E>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_relay(mut self) {
        debug!("📬️ Starting event relay");
        // drop the internal sender so that when the last producer is dropped, the relay shuts down on its own
        drop(self.sender);
        let jobs = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Relaying event");
            let handler = Arc::clone(&self.handler);
            jobs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let job = jobs.clone();
            tokio::spawn(async move {
                (handler)(ev).await;
                job.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                trace!("📬️ Event relayed");
            });
        }
        while jobs.load(std::sync::atomic::Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting for in-flight handlers to complete");
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
        debug!("📬️ Event relay has shut down");
    }
}

/// The sending half of a relay. `publish` is synchronous and non-blocking, so it is safe to call from the
/// matcher worker.
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::UnboundedSender<E>,
}

impl<E: Send + Sync> Clone for EventProducer<E> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::UnboundedSender<E>) -> Self {
        Self { sender }
    }

    pub fn publish(&self, event: E) {
        if self.sender.send(event).is_err() {
            error!("📬️ Failed to publish event: relay has shut down");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn relay_delivers_everything_before_shutdown() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let c2 = count.clone();
        let handler: RelayHandler<u64> = Arc::new(move |v| {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(v, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let relay = EventRelay::new(handler);
        let producer_1 = relay.subscribe();
        let producer_2 = relay.subscribe();
        // producers publish synchronously, as the matcher worker would
        std::thread::spawn(move || {
            for i in 0..5u64 {
                producer_1.publish(i * 2 + 1);
            }
        })
        .join()
        .unwrap();
        for i in 0..5u64 {
            producer_2.publish(i * 2);
        }
        drop(producer_2);
        relay.start_relay().await;
        assert_eq!(c2.load(Ordering::SeqCst), 45);
    }
}
