//! Abstract capabilities consumed from the message-stream broker client.
//!
//! The broker library is a collaborator; this module fixes the contract the
//! fan-out core relies on and nothing more. Implementations are assumed
//! safe for concurrent use.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Structured error surfaced by the broker for one fetch or produce.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BrokerError {
    pub message: String,
    /// Whether the broker considers the failure transient.
    pub retriable: bool,
}

/// A record on a topic, both as consumed and as produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub payload: Bytes,
}

/// Per-(topic, partition) fetch failure.
#[derive(Clone, Debug)]
pub struct FetchError {
    pub topic: String,
    pub partition: i32,
    pub error: BrokerError,
}

/// Result of one poll: records in fetch order plus any per-partition
/// errors, and whether the client has been shut down.
#[derive(Debug, Default)]
pub struct Fetches {
    pub client_closed: bool,
    pub errors: Vec<FetchError>,
    pub records: Vec<Record>,
}

/// Fires exactly once with the produce outcome.
pub type ProduceCallback = Box<dyn FnOnce(Result<(), BrokerError>) + Send>;

#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Stable transport identifier, e.g. `"kafka"`.
    fn id(&self) -> &'static str;

    /// Awaits the next batch of records from any consumed topic.
    async fn poll_records(&self, max: usize) -> Fetches;

    /// Permits the broker to reassign partitions between fetch cycles.
    fn allow_rebalance(&self);

    /// Starts consuming the given topics. Non-blocking; the client updates
    /// its metadata in the background and cleans up topics nobody consumes
    /// anymore.
    fn add_consume_topics(&self, subjects: &[String]);

    /// Hands a record to the producer. Batching is the broker library's
    /// concern.
    fn produce(&self, record: Record, callback: ProduceCallback);
}
