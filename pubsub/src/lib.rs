//! Pub/sub subscription fan-out over an upstream message-stream client.
//!
//! A connector multiplexes one broker client into many per-subject
//! subscribers: a poller drives the client and forwards records over a
//! bounded channel (the backpressure edge) to a single-threaded worker that
//! owns the subscription registry and fans each record out to every live
//! subscriber of its topic. Publishing wraps the broker's async produce in
//! a synchronous-looking call.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

mod broker;
mod error;
mod fanout;
mod poller;
#[cfg(test)]
mod testing;

pub use broker::BrokerClient;
pub use broker::BrokerError;
pub use broker::FetchError;
pub use broker::Fetches;
pub use broker::ProduceCallback;
pub use broker::Record;
pub use error::PubSubError;
pub use fanout::SubscriptionUpdater;

use fanout::FanoutWorker;
use fanout::Subscription;
use fanout::SubscriptionEvent;

/// Builds [`PubSub`] instances over one broker client.
pub struct Connector {
    client: Arc<dyn BrokerClient>,
}

impl Connector {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self { client }
    }

    /// Spawns the worker and poller and returns the pub/sub facade. Both
    /// tasks run until `shutdown` fires; the poller additionally ends when
    /// the broker client closes, which is not treated as an error.
    pub fn build(&self, shutdown: CancellationToken) -> PubSub {
        let (work_tx, work_rx) = mpsc::channel(1);
        let (sub_tx, sub_rx) = mpsc::channel(1);

        let worker = FanoutWorker::new(work_rx, sub_rx, sub_tx.clone(), shutdown.clone());
        tokio::spawn(worker.run());

        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(err) = poller::poll(client, work_tx, shutdown).await {
                if err != PubSubError::ClientClosed {
                    tracing::error!(error = %err, "consume error");
                }
            }
        });

        PubSub {
            client: self.client.clone(),
            sub_tx,
            next_subscription_id: AtomicU64::new(0),
        }
    }
}

/// The subscription boundary handed to the resolver layer.
pub struct PubSub {
    client: Arc<dyn BrokerClient>,
    sub_tx: mpsc::Sender<SubscriptionEvent>,
    next_subscription_id: AtomicU64,
}

impl PubSub {
    /// Transport identifier of the underlying client.
    pub fn id(&self) -> &'static str {
        self.client.id()
    }

    /// Registers `updater` for every subject in `subjects` until `token` is
    /// cancelled. Subjects must be non-empty and unique; the engine is
    /// expected to deduplicate equivalent subscriptions before this call.
    pub async fn subscribe(
        &self,
        token: CancellationToken,
        subjects: Vec<String>,
        updater: Arc<dyn SubscriptionUpdater>,
    ) -> Result<(), PubSubError> {
        if subjects.is_empty() {
            return Err(PubSubError::InvalidSubjects(
                "subscription has no subjects".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for subject in &subjects {
            if !seen.insert(subject.as_str()) {
                return Err(PubSubError::InvalidSubjects(format!(
                    "duplicate subject {subject:?}"
                )));
            }
        }

        // Non-blocking; the client refreshes its metadata to start polling
        // the new topics.
        self.client.add_consume_topics(&subjects);

        let subscription = Subscription {
            id: self.next_subscription_id.fetch_add(1, Ordering::Relaxed),
            subjects,
            updater,
            token,
        };
        self.sub_tx
            .send(SubscriptionEvent::Subscribe(subscription))
            .await
            .map_err(|_| PubSubError::ClientClosed)
    }

    /// Produces one record and waits for the broker's completion callback.
    pub async fn publish(&self, subject: String, data: Bytes) -> Result<(), PubSubError> {
        tracing::debug!(topic = %subject, "publish");

        let (done_tx, done_rx) = oneshot::channel();
        self.client.produce(
            Record {
                topic: subject,
                payload: data,
            },
            Box::new(move |result| {
                let _ = done_tx.send(result);
            }),
        );

        match done_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(PubSubError::PublishFailed(err)),
            Err(_) => Err(PubSubError::ClientClosed),
        }
    }

    /// Request/reply is not a capability of this transport.
    pub async fn request(
        &self,
        _subject: String,
        _data: Bytes,
        _sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), PubSubError> {
        Err(PubSubError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;
    use tokio::time::Duration;
    use tokio::time::timeout;

    use super::*;
    use crate::testing::ScriptedBroker;
    use crate::testing::fetch_with;
    use crate::testing::record;

    /// Updater handing payloads to the test over a channel.
    struct ChannelUpdater {
        deliveries: mpsc::UnboundedSender<Bytes>,
    }

    impl ChannelUpdater {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
            let (deliveries, received) = mpsc::unbounded_channel();
            (Arc::new(Self { deliveries }), received)
        }
    }

    impl SubscriptionUpdater for ChannelUpdater {
        fn update(&self, data: Bytes) {
            let _ = self.deliveries.send(data);
        }
    }

    async fn receive(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Bytes {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery arrives")
            .expect("channel open")
    }

    #[test(tokio::test)]
    async fn fans_records_out_to_subscribers() {
        let (broker, script) = ScriptedBroker::new();
        let pubsub = Connector::new(broker.clone()).build(CancellationToken::new());

        let (updater, mut received) = ChannelUpdater::new();
        pubsub
            .subscribe(
                CancellationToken::new(),
                vec!["employee.created".to_string()],
                updater,
            )
            .await
            .expect("subscribe succeeds");
        assert_eq!(
            *broker.consume_topics.lock(),
            vec!["employee.created".to_string()]
        );

        script
            .send(fetch_with(vec![record("employee.created", "1")]))
            .unwrap();
        assert_eq!(receive(&mut received).await.as_ref(), b"1");
    }

    #[test(tokio::test)]
    async fn cancelled_subscription_is_never_updated_again() {
        let (broker, script) = ScriptedBroker::new();
        let pubsub = Connector::new(broker).build(CancellationToken::new());

        let (updater, mut received) = ChannelUpdater::new();
        let token = CancellationToken::new();
        pubsub
            .subscribe(
                token.clone(),
                vec!["employee.created".to_string()],
                updater,
            )
            .await
            .expect("subscribe succeeds");

        // A sentinel subscriber on another topic lets the test observe that
        // the worker has processed everything queued before it.
        let (sentinel, mut sentinel_rx) = ChannelUpdater::new();
        pubsub
            .subscribe(
                CancellationToken::new(),
                vec!["sentinel".to_string()],
                sentinel,
            )
            .await
            .expect("subscribe succeeds");

        script
            .send(fetch_with(vec![record("employee.created", "before")]))
            .unwrap();
        assert_eq!(receive(&mut received).await.as_ref(), b"before");

        token.cancel();
        script
            .send(fetch_with(vec![
                record("employee.created", "after"),
                record("sentinel", "done"),
            ]))
            .unwrap();

        assert_eq!(receive(&mut sentinel_rx).await.as_ref(), b"done");
        assert!(received.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribing_on_multiple_subjects_receives_each() {
        let (broker, script) = ScriptedBroker::new();
        let pubsub = Connector::new(broker).build(CancellationToken::new());

        let (updater, mut received) = ChannelUpdater::new();
        pubsub
            .subscribe(
                CancellationToken::new(),
                vec![
                    "employee.created".to_string(),
                    "employee.updated".to_string(),
                ],
                updater,
            )
            .await
            .expect("subscribe succeeds");

        script
            .send(fetch_with(vec![
                record("employee.created", "a"),
                record("employee.updated", "b"),
            ]))
            .unwrap();

        assert_eq!(receive(&mut received).await.as_ref(), b"a");
        assert_eq!(receive(&mut received).await.as_ref(), b"b");
    }

    #[tokio::test]
    async fn rejects_duplicate_subjects() {
        let (broker, _script) = ScriptedBroker::new();
        let pubsub = Connector::new(broker.clone()).build(CancellationToken::new());

        let (updater, _received) = ChannelUpdater::new();
        let err = pubsub
            .subscribe(
                CancellationToken::new(),
                vec!["employee.created".to_string(), "employee.created".to_string()],
                updater,
            )
            .await
            .expect_err("duplicates are invalid");

        assert!(matches!(err, PubSubError::InvalidSubjects(_)));
        assert!(broker.consume_topics.lock().is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_subjects() {
        let (broker, _script) = ScriptedBroker::new();
        let pubsub = Connector::new(broker).build(CancellationToken::new());

        let (updater, _received) = ChannelUpdater::new();
        let err = pubsub
            .subscribe(CancellationToken::new(), Vec::new(), updater)
            .await
            .expect_err("empty subjects are invalid");

        assert!(matches!(err, PubSubError::InvalidSubjects(_)));
    }

    #[tokio::test]
    async fn publish_completes_with_the_producer_outcome() {
        let (broker, _script) = ScriptedBroker::new();
        let pubsub = Connector::new(broker.clone()).build(CancellationToken::new());

        pubsub
            .publish("employee.created".to_string(), Bytes::from_static(b"1"))
            .await
            .expect("publish succeeds");
        assert_eq!(broker.produced.lock().len(), 1);
        assert_eq!(broker.produced.lock()[0].topic, "employee.created");

        let failure = BrokerError {
            message: "broker unreachable".to_string(),
            retriable: false,
        };
        *broker.produce_error.lock() = Some(failure.clone());
        let err = pubsub
            .publish("employee.created".to_string(), Bytes::from_static(b"2"))
            .await
            .expect_err("producer reported a failure");
        assert_eq!(err, PubSubError::PublishFailed(failure));
    }

    #[tokio::test]
    async fn request_reply_is_unsupported() {
        let (broker, _script) = ScriptedBroker::new();
        let pubsub = Connector::new(broker).build(CancellationToken::new());

        let mut sink = Vec::new();
        let err = pubsub
            .request(
                "employee.created".to_string(),
                Bytes::from_static(b"1"),
                &mut sink,
            )
            .await
            .expect_err("no request/reply on this transport");
        assert_eq!(err, PubSubError::Unsupported);
        assert_eq!(pubsub.id(), "scripted");
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker() {
        let (broker, script) = ScriptedBroker::new();
        let shutdown = CancellationToken::new();
        let pubsub = Connector::new(broker).build(shutdown.clone());

        shutdown.cancel();
        // Give both tasks a chance to observe the token.
        tokio::task::yield_now().await;

        let (updater, _received) = ChannelUpdater::new();
        let result = timeout(
            Duration::from_secs(1),
            pubsub.subscribe(
                CancellationToken::new(),
                vec!["employee.created".to_string()],
                updater,
            ),
        )
        .await;

        // Either the worker is already gone (send fails) or the lifecycle
        // message is never processed; in both cases no delivery can happen.
        drop(script);
        match result {
            Ok(Ok(())) | Ok(Err(PubSubError::ClientClosed)) => {}
            other => panic!("unexpected subscribe outcome: {other:?}"),
        }
    }
}
