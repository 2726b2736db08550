use super::TransportError;
use async_trait::async_trait;
use std::sync::Arc;

/// Connection to the broker.
///
/// `send` resolves once the broker has acknowledged the record. Implementations
/// are expected to reconnect on their own; the delivery client only retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Flush buffered data and release the connection
    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        (**self).send(topic, payload).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        (**self).close().await
    }
}
