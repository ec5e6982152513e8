use async_trait::async_trait;
use thiserror::Error;

use accord_core::ChannelId;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel {0} is not reachable")]
    UnknownChannel(ChannelId),
    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound side of the chat connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), TransportError>;
}
