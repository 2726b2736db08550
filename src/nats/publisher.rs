use super::NatsClient;
use crate::delivery::{Transport, TransportError};
use async_nats::jetstream;
use async_trait::async_trait;
use tracing::{debug, info};

/// [`Transport`] over NATS.
///
/// In JetStream mode every send awaits the stream's publish ack. In core mode
/// the client is flushed after each publish. Reconnects are handled by the
/// NATS client itself.
pub struct NatsTransport {
    client: async_nats::Client,
    jetstream: Option<jetstream::Context>,
}

impl NatsTransport {
    pub fn new(nats: &NatsClient) -> Self {
        Self {
            client: nats.client().clone(),
            jetstream: nats.jetstream().cloned(),
        }
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        debug!(subject = %topic, bytes = payload.len(), "Publishing record to NATS");

        match &self.jetstream {
            Some(js) => {
                js.publish(topic.to_string(), payload.into())
                    .await
                    .map_err(|e| TransportError::Publish(e.to_string()))?
                    .await
                    .map_err(|e| TransportError::Ack(e.to_string()))?;
            }
            None => {
                self.client
                    .publish(topic.to_string(), payload.into())
                    .await
                    .map_err(|e| TransportError::Publish(e.to_string()))?;
                self.client
                    .flush()
                    .await
                    .map_err(|e| TransportError::Ack(e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        info!("NATS connection flushed and released");
        Ok(())
    }
}
