//! Error taxonomy of the fan-out core.

use thiserror::Error;

use crate::broker::BrokerError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PubSubError {
    /// The broker client has been shut down. Expected terminal outcome for
    /// the poller; not logged as an error.
    #[error("client closed")]
    ClientClosed,

    /// A non-retriable structured broker error terminated the poller.
    #[error("non retriable fetch error")]
    FetchFatal(#[source] BrokerError),

    /// Request/reply was invoked on a transport that cannot implement it.
    #[error("request/reply semantics are not supported by this transport")]
    Unsupported,

    /// The broker's produce callback reported a failure.
    #[error("publish failed")]
    PublishFailed(#[source] BrokerError),

    /// The subject list of a subscription was empty or contained
    /// duplicates.
    #[error("invalid subjects: {0}")]
    InvalidSubjects(String),
}
