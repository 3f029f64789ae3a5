//! HTTP API server for external control (browser front end)
//!
//! This module provides a REST API for controlling speech sessions:
//! - POST /sessions/start - Open a channel and start a session
//! - POST /sessions/stop/:id - Stop a session
//! - GET /sessions/:id/status - Query session status
//! - GET /sessions/:id/transcript - Get the reconciled transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, SessionRegistry};
