use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub channel: ChannelConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// NATS server carrying the per-session channels
    pub nats_url: String,
    /// Subject namespace; each session appends a random id
    pub namespace: String,
    /// Endpoint for the handshake announce call
    pub handshake_url: String,
}

/// Audio tuning. The water marks and frame size are observed values with no
/// documented rationale upstream; treat them as tunables, not invariants.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_size: usize,
    pub batch_low_water: usize,
    pub batch_high_water: usize,
    pub batch_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "voicebridge".to_string(),
                http: HttpConfig {
                    bind: "127.0.0.1".to_string(),
                    port: 8090,
                },
            },
            channel: ChannelConfig {
                nats_url: "nats://localhost:4222".to_string(),
                namespace: "speech.session".to_string(),
                handshake_url: "http://localhost:8091/invocations/announce".to_string(),
            },
            audio: AudioConfig {
                capture_sample_rate: 16000,
                playback_sample_rate: 24000,
                frame_size: 512,
                batch_low_water: 10,
                batch_high_water: 20,
                batch_interval_ms: 10,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
