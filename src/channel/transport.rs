use super::envelope::Envelope;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Channel-level failures, mapped onto the session error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Channel or handshake could not be established. Fatal at session start.
    #[error("failed to establish channel: {0}")]
    Connect(String),

    /// Transient publish failure. The batching scheduler requeues and retries.
    #[error("failed to publish envelope: {0}")]
    Publish(String),

    /// Publish attempted after `close()`.
    #[error("channel is closed")]
    Closed,

    /// Inbound subscription broken. Fatal, triggers session teardown.
    #[error("inbound subscription failed: {0}")]
    Subscription(String),
}

/// A duplex pub/sub channel scoped to one session address.
///
/// The inbound side is exposed as a stream of parsed envelopes consumed by a
/// single dispatcher; delivery order is arrival order and nothing is delivered
/// concurrently to the same subscriber. The stream ending while a session is
/// still active means the subscription died — there is no auto-reconnect.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> Result<(), ChannelError>;

    async fn subscribe(&self) -> Result<BoxStream<'static, Envelope>, ChannelError>;

    /// Idempotent. Publishes after close fail with [`ChannelError::Closed`].
    async fn close(&self) -> Result<(), ChannelError>;

    fn address(&self) -> &str;
}

/// Opens channels bound to fresh per-session addresses.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Channel>, ChannelError>;
}

/// NATS-backed channel: one subject carries both directions, with consumers
/// filtering on the envelope `direction` field.
pub struct NatsChannel {
    client: async_nats::Client,
    address: String,
    closed: AtomicBool,
}

impl NatsChannel {
    pub async fn connect(url: &str, address: String) -> Result<Self, ChannelError> {
        info!("Connecting to NATS at {} for channel {}", url, address);

        let client = async_nats::connect(url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            address,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Channel for NatsChannel {
    async fn publish(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        let payload =
            serde_json::to_vec(envelope).map_err(|e| ChannelError::Publish(e.to_string()))?;

        self.client
            .publish(self.address.clone(), payload.into())
            .await
            .map_err(|e| ChannelError::Publish(e.to_string()))
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, Envelope>, ChannelError> {
        let subscriber = self
            .client
            .subscribe(self.address.clone())
            .await
            .map_err(|e| ChannelError::Subscription(e.to_string()))?;

        info!("Subscribed to channel {}", self.address);

        // Malformed JSON is dropped here with a warning so one bad publisher
        // cannot end the session.
        let envelopes = subscriber.filter_map(|message| async move {
            match serde_json::from_slice::<Envelope>(&message.payload) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!("Dropping undecodable envelope: {}", e);
                    None
                }
            }
        });

        Ok(envelopes.boxed())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing channel {}", self.address);

        // Flush what we already queued; connection resources are released on drop.
        if let Err(e) = self.client.flush().await {
            warn!("Flush during channel close failed: {}", e);
        }

        Ok(())
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// Connector producing [`NatsChannel`]s against one configured server.
pub struct NatsConnector {
    url: String,
}

impl NatsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ChannelConnector for NatsConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Channel>, ChannelError> {
        let channel = NatsChannel::connect(&self.url, address.to_string()).await?;
        Ok(Arc::new(channel))
    }
}
