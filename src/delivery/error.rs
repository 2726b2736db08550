use crate::reading::Reading;

/// A single failed send. Always retryable from the delivery client's point of view.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("broker did not acknowledge: {0}")]
    Ack(String),
    #[error("transport is closed")]
    Closed,
}

/// Errors crossing the delivery client boundary
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Recoverable send failure, retried internally
    #[error("transient delivery failure")]
    Transient(#[source] TransportError),

    /// Retries exhausted for one reading
    #[error("delivery of {reading} failed after {attempts} attempts")]
    Unretryable {
        reading: Reading,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("failed to encode {reading}")]
    Encode {
        reading: Reading,
        #[source]
        source: serde_json::Error,
    },

    #[error("topic must not be empty")]
    EmptyTopic,
}

impl DeliveryError {
    /// Reading the error refers to, if any
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            Self::Unretryable { reading, .. } | Self::Encode { reading, .. } => Some(reading),
            Self::Transient(_) | Self::EmptyTopic => None,
        }
    }
}

/// Outcome of a flush where at least one record exhausted its retries.
///
/// Holds one [`DeliveryError::Unretryable`] per failed reading, in submission order.
#[derive(Debug, thiserror::Error)]
#[error("{} of {attempted} readings were not delivered", .failures.len())]
pub struct FlushError {
    pub attempted: usize,
    pub failures: Vec<DeliveryError>,
}
