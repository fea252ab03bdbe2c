//! Subscription registry and the fan-out worker.
//!
//! The worker owns the subject → subscribers map exclusively. Records and
//! lifecycle events arrive over channels, so no lock is ever taken: a
//! subscription's cancellation is observed by a small forwarder task that
//! turns it into an `Unsubscribe` message for the worker.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::Record;

/// Downstream capability pushing one payload to a connected subscription
/// client. Invoked synchronously by the worker, so it must not block;
/// a slow updater stalls fan-out for every subscriber.
pub trait SubscriptionUpdater: Send + Sync {
    fn update(&self, data: Bytes);
}

pub(crate) type SubscriptionId = u64;

#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) subjects: Vec<String>,
    pub(crate) updater: Arc<dyn SubscriptionUpdater>,
    pub(crate) token: CancellationToken,
}

pub(crate) enum SubscriptionEvent {
    Subscribe(Subscription),
    Unsubscribe { id: SubscriptionId },
}

/// Single-threaded dispatcher. Not safe for concurrent use; run exactly one
/// per pub/sub instance.
pub(crate) struct FanoutWorker {
    subscriptions: HashMap<String, Vec<Subscription>>,
    work: mpsc::Receiver<Record>,
    sub: mpsc::Receiver<SubscriptionEvent>,
    sub_tx: mpsc::Sender<SubscriptionEvent>,
    shutdown: CancellationToken,
}

impl FanoutWorker {
    pub(crate) fn new(
        work: mpsc::Receiver<Record>,
        sub: mpsc::Receiver<SubscriptionEvent>,
        sub_tx: mpsc::Sender<SubscriptionEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            subscriptions: HashMap::new(),
            work,
            sub,
            sub_tx,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        loop {
            // Biased: lifecycle events are taken before records, so a
            // subscription accepted into the channel is registered before
            // any record forwarded after it.
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                Some(event) = self.sub.recv() => self.handle_event(event),
                Some(record) = self.work.recv() => self.dispatch(record),
                else => return,
            }
        }
    }

    /// Delivers a record to every live subscription under its topic, in
    /// registration order. A record observed after a subscription's
    /// cancellation is silently dropped for that subscription.
    fn dispatch(&self, record: Record) {
        let Some(subscriptions) = self.subscriptions.get(&record.topic) else {
            return;
        };
        for subscription in subscriptions {
            if subscription.token.is_cancelled() {
                continue;
            }
            tracing::debug!(topic = %record.topic, "subscription update");
            subscription.updater.update(record.payload.clone());
        }
    }

    fn handle_event(&mut self, event: SubscriptionEvent) {
        match event {
            SubscriptionEvent::Subscribe(subscription) => {
                tracing::debug!(topics = ?subscription.subjects, "subscribe");

                for subject in &subscription.subjects {
                    self.subscriptions
                        .entry(subject.clone())
                        .or_default()
                        .push(subscription.clone());
                }

                let id = subscription.id;
                let token = subscription.token.clone();
                let shutdown = self.shutdown.clone();
                let unsubscribe = self.sub_tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {
                            let _ = unsubscribe
                                .send(SubscriptionEvent::Unsubscribe { id })
                                .await;
                        }
                        _ = shutdown.cancelled() => {}
                    }
                });
            }
            SubscriptionEvent::Unsubscribe { id } => {
                // Subjects with nobody left are erased entirely.
                self.subscriptions.retain(|_, subscriptions| {
                    subscriptions.retain(|s| s.id != id);
                    !subscriptions.is_empty()
                });
            }
        }
    }
}
