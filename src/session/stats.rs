use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a speech session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
}

/// Statistics about a speech session, served by the control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// When the session was started (start of the last `start()` call)
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since the session started
    pub duration_secs: f64,

    /// Number of audio batches published to the channel
    pub batches_published: usize,

    /// Number of messages in the reconciled transcript
    pub transcript_messages: usize,

    /// Terminal error from the transport, if one ended the session
    pub last_error: Option<String>,
}
