//! Scripted broker client for tests.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::broker::BrokerClient;
use crate::broker::BrokerError;
use crate::broker::Fetches;
use crate::broker::ProduceCallback;
use crate::broker::Record;

pub(crate) fn record(topic: &str, payload: &str) -> Record {
    Record {
        topic: topic.to_string(),
        payload: Bytes::from(payload.to_string()),
    }
}

pub(crate) fn fetch_with(records: Vec<Record>) -> Fetches {
    Fetches {
        records,
        ..Default::default()
    }
}

/// Broker whose polls are answered from a script channel. Every sent
/// `Fetches` answers one poll; once the script handle is dropped the client
/// reports itself closed.
pub(crate) struct ScriptedBroker {
    fetches: tokio::sync::Mutex<mpsc::UnboundedReceiver<Fetches>>,
    pub(crate) rebalances: AtomicUsize,
    pub(crate) consume_topics: Mutex<Vec<String>>,
    pub(crate) produce_error: Mutex<Option<BrokerError>>,
    pub(crate) produced: Mutex<Vec<Record>>,
}

impl ScriptedBroker {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<Fetches>) {
        let (script, fetches) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                fetches: tokio::sync::Mutex::new(fetches),
                rebalances: AtomicUsize::new(0),
                consume_topics: Mutex::new(Vec::new()),
                produce_error: Mutex::new(None),
                produced: Mutex::new(Vec::new()),
            }),
            script,
        )
    }
}

#[async_trait]
impl BrokerClient for ScriptedBroker {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn poll_records(&self, _max: usize) -> Fetches {
        match self.fetches.lock().await.recv().await {
            Some(fetches) => fetches,
            None => Fetches {
                client_closed: true,
                ..Default::default()
            },
        }
    }

    fn allow_rebalance(&self) {
        self.rebalances.fetch_add(1, Ordering::SeqCst);
    }

    fn add_consume_topics(&self, subjects: &[String]) {
        self.consume_topics.lock().extend_from_slice(subjects);
    }

    fn produce(&self, record: Record, callback: ProduceCallback) {
        self.produced.lock().push(record);
        let result = match self.produce_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        callback(result);
    }
}
