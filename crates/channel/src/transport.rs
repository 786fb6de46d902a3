//! Transport seam for the messaging channel.
//!
//! The concrete transport (a phone-number messaging bridge) lives outside
//! this crate; the runner only needs connect/read/send/disconnect. Keeping
//! the seam this narrow is what lets the runner tests script an entire
//! conversation without a network.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// One message as it arrives from the wire. `sender` is the raw transport
/// id (suffix and all); replies go back to exactly this value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: String,
    pub text: String,
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    /// Next inbound message, or `None` when the stream has closed cleanly.
    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError>;

    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), TransportError>;

    async fn send_image(
        &self,
        recipient: &str,
        url: &str,
        caption: &str,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Stands in when the channel is enabled but no bridge is wired up yet:
/// connects, reports a closed stream, sends nowhere.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl ChannelTransport for NoopTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
        Ok(None)
    }

    async fn send_text(&self, _recipient: &str, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_image(
        &self,
        _recipient: &str,
        _url: &str,
        _caption: &str,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}
