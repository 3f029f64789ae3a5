use super::batcher::BatchConfig;
use serde::{Deserialize, Serialize};

/// Configuration for one speech session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g. "session-2026-08-07-demo")
    pub session_id: String,

    /// Tenant owning this session
    pub tenant_id: String,

    /// System prompt sent to the model at activation
    pub system_prompt: String,

    /// Subject namespace for the per-session channel address
    pub channel_namespace: String,

    /// Capture sample rate in Hz (what the model expects on the way in)
    pub capture_sample_rate: u32,

    /// Playback sample rate in Hz (what the model sends back)
    pub playback_sample_rate: u32,

    /// Samples per encoded capture frame
    pub frame_size: usize,

    /// Batching thresholds for outbound audio
    pub batch: BatchConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            tenant_id: "default".to_string(),
            system_prompt: String::new(),
            channel_namespace: "speech.session".to_string(),
            capture_sample_rate: 16000, // 16kHz capture on the wire
            playback_sample_rate: 24000, // 24kHz synthesized audio back
            frame_size: 512,
            batch: BatchConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Fresh channel address: namespace plus a random id, never shared
    /// across sessions.
    pub fn fresh_channel_address(&self) -> String {
        format!("{}.{}", self.channel_namespace, uuid::Uuid::new_v4())
    }
}
