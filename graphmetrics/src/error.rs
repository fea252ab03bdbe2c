//! Error taxonomy of the ingest pipeline.

use thiserror::Error;

/// Errors surfaced by the publish-metrics RPC. Row-level causes are logged
/// at the failure site; the RPC only reports which sink path failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MetricsError {
    /// Claims were missing from the request context. Terminal for the RPC.
    #[error("authentication didn't succeed")]
    NotAuthenticated,

    /// Any failure in the operations batch path.
    #[error("operation write failed")]
    OperationWriteFailed,

    /// Any failure in the metrics batch path.
    #[error("failed to write metrics")]
    MetricWriteFailed,
}
