//! Boundary with the columnar analytical store.
//!
//! The store is a collaborator: this module only fixes the batch contract
//! and the persisted row shapes. Field order in the row structs is the
//! store's column declaration order and must not be rearranged.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;
use tower::BoxError;

pub const OPERATIONS_TABLE: &str = "gql_metrics_operations";
pub const METRICS_TABLE: &str = "gql_metrics_schema_usage";

/// A failure reported by the store driver, tagged with the batch stage it
/// occurred in.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to prepare batch")]
    Prepare(#[source] BoxError),
    #[error("failed to append row")]
    Append(#[source] BoxError),
    #[error("failed to send batch")]
    Send(#[source] BoxError),
}

/// One row of `gql_metrics_operations`.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationRow {
    pub insert_time: DateTime<Utc>,
    pub name: String,
    pub hash: String,
    pub operation_type: String,
    pub document: String,
}

/// One row of `gql_metrics_schema_usage`, flattened from a single
/// field/argument/input usage entry.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRow {
    pub insert_time: DateTime<Utc>,
    pub organization_id: String,
    pub federated_graph_id: String,
    pub schema_version: String,
    pub operation_hash: String,
    pub operation_name: String,
    pub operation_type: String,
    pub count: u64,
    pub path: Vec<String>,
    pub type_names: Vec<String>,
    pub named_type: String,
    pub client_name: String,
    pub client_version: String,
    pub status_code: String,
    pub error: String,
    pub subgraph_ids: Vec<String>,
    pub is_argument: bool,
    pub is_input: bool,
    pub attributes: HashMap<String, String>,
}

/// An open append-only batch against one table.
#[async_trait]
pub trait RowBatch<R>: Send {
    fn append(&mut self, row: R) -> Result<(), StoreError>;

    /// Number of rows appended so far. Send success acknowledges nothing
    /// beyond handoff to the store.
    fn rows(&self) -> usize;

    async fn send(self: Box<Self>) -> Result<(), StoreError>;
}

/// Connection handle able to open one batch per table.
///
/// Implementations are expected to be safe for concurrent use; the ingest
/// service opens the operations and metrics batches in parallel.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Opens an insert batch against [`OPERATIONS_TABLE`].
    async fn operations_batch(&self) -> Result<Box<dyn RowBatch<OperationRow>>, StoreError>;

    /// Opens an insert batch against [`METRICS_TABLE`].
    async fn metrics_batch(&self) -> Result<Box<dyn RowBatch<MetricRow>>, StoreError>;
}
