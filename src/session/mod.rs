//! Speech session management
//!
//! This module provides the `SpeechSession` abstraction that manages:
//! - Session lifecycle (idle → connecting → active → closing)
//! - The per-session channel and its handshake announce
//! - Outbound audio batching and the startup event sequence
//! - Transcript reconciliation and playback dispatch
//! - Session statistics for the control API

mod batcher;
mod config;
mod handshake;
mod session;
mod stats;

pub use batcher::{BatchConfig, BatchScheduler};
pub use config::SessionConfig;
pub use handshake::{HandshakeApi, HttpHandshake};
pub use session::SpeechSession;
pub use stats::{SessionState, SessionStats};
