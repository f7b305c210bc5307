//! NATS replies for answered prediction requests

use crate::responder::ReplySink;
use anyhow::Result;
use async_nats::Client;
use async_trait::async_trait;
use tracing::debug;

/// Publishes serialized prediction responses to a request's reply subject
#[derive(Clone)]
pub struct ReplyProducer {
    client: Client,
}

impl ReplyProducer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplySink for ReplyProducer {
    /// Publish a response body
    async fn reply(&self, reply_to: String, request_id: &str, body: Vec<u8>) -> Result<()> {
        let bytes = body.len();
        self.client.publish(reply_to, body.into()).await?;

        debug!(request_id = %request_id, bytes, "Published prediction reply");
        Ok(())
    }

    /// Flush pending replies before shutdown
    async fn flush(&self) -> Result<()> {
        self.client.flush().await?;
        Ok(())
    }
}
