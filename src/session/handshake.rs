use crate::channel::ChannelError;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Side-channel announce: tells the model process where to publish results.
///
/// Issued once per session, after the channel is open and before `ready` can
/// be expected. Failure here is a connect failure — the session never leaves
/// `Connecting`.
#[async_trait]
pub trait HandshakeApi: Send + Sync {
    async fn announce(&self, session_id: &str, channel_address: &str) -> Result<(), ChannelError>;
}

#[derive(Debug, Serialize)]
struct AnnounceRequest<'a> {
    session_id: &'a str,
    channel: &'a str,
}

/// HTTP implementation of the announce call.
pub struct HttpHandshake {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpHandshake {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HandshakeApi for HttpHandshake {
    async fn announce(&self, session_id: &str, channel_address: &str) -> Result<(), ChannelError> {
        info!(
            "Announcing channel {} for session {}",
            channel_address, session_id
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnnounceRequest {
                session_id,
                channel: channel_address,
            })
            .send()
            .await
            .map_err(|e| ChannelError::Connect(format!("handshake request failed: {}", e)))?;

        response
            .error_for_status()
            .map_err(|e| ChannelError::Connect(format!("handshake rejected: {}", e)))?;

        Ok(())
    }
}
