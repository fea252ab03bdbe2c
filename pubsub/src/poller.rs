//! Drives the broker client and feeds records into the worker.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::BrokerClient;
use crate::broker::Record;
use crate::error::PubSubError;

/// Upper bound of records fetched per poll.
pub(crate) const MAX_POLL_RECORDS: usize = 500;

/// Polls until the token fires, the client closes, or a non-retriable fetch
/// error surfaces. Retriable fetch errors are logged and skipped. The send
/// into `work` awaits the worker; that is the backpressure edge, and it
/// keeps per-topic fetch order intact.
pub(crate) async fn poll(
    client: Arc<dyn BrokerClient>,
    work: mpsc::Sender<Record>,
    token: CancellationToken,
) -> Result<(), PubSubError> {
    loop {
        let fetches = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            fetches = client.poll_records(MAX_POLL_RECORDS) => fetches,
        };

        if fetches.client_closed {
            return Err(PubSubError::ClientClosed);
        }

        for fetch_error in &fetches.errors {
            if !fetch_error.error.retriable {
                tracing::error!(
                    topic = %fetch_error.topic,
                    partition = fetch_error.partition,
                    error = %fetch_error.error,
                    "fetch error and non retriable"
                );
                return Err(PubSubError::FetchFatal(fetch_error.error.clone()));
            }
            tracing::error!(
                topic = %fetch_error.topic,
                partition = fetch_error.partition,
                error = %fetch_error.error,
                "fetch error"
            );
        }

        for record in fetches.records {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                sent = work.send(record) => {
                    if sent.is_err() {
                        // Worker gone, nothing left to feed.
                        return Ok(());
                    }
                }
            }
        }

        client.allow_rebalance();
    }
}
