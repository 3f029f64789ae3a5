use super::state::AppState;
use crate::audio::{CaptureConfig, CpalCapture, CpalSink};
use crate::channel::NatsConnector;
use crate::session::{BatchConfig, HttpHandshake, SessionConfig, SessionStats, SpeechSession};
use crate::transcript::Message;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Tenant owning the session
    pub tenant_id: Option<String>,

    /// System prompt for the model
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Open a channel, announce it, and start a new speech session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting speech session: {}", session_id);

    let audio = &state.config.audio;
    let session_config = SessionConfig {
        session_id: session_id.clone(),
        tenant_id: req.tenant_id.unwrap_or_else(|| "default".to_string()),
        system_prompt: req.system_prompt.unwrap_or_default(),
        channel_namespace: state.config.channel.namespace.clone(),
        capture_sample_rate: audio.capture_sample_rate,
        playback_sample_rate: audio.playback_sample_rate,
        frame_size: audio.frame_size,
        batch: BatchConfig {
            low_water: audio.batch_low_water,
            high_water: audio.batch_high_water,
            tick: Duration::from_millis(audio.batch_interval_ms),
        },
    };

    let session = Arc::new(SpeechSession::new(
        session_config,
        Arc::new(NatsConnector::new(state.config.channel.nats_url.clone())),
        Box::new(CpalCapture::new(CaptureConfig {
            sample_rate: audio.capture_sample_rate,
            frame_size: audio.frame_size,
        })),
        Arc::new(CpalSink::new(audio.playback_sample_rate)),
        Arc::new(HttpHandshake::new(state.config.channel.handshake_url.clone())),
    ));

    if state.registry.insert(Arc::clone(&session)).await.is_err() {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Session {} is already running", session_id),
            }),
        )
            .into_response();
    }

    if let Err(e) = session.start().await {
        error!("Failed to start session {}: {:#}", session_id, e);
        // Nothing stays registered after a failed start: the UI must not
        // show a recording affordance.
        state.registry.remove(&session_id).await;
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to start session: {:#}", e),
            }),
        )
            .into_response();
    }

    info!("Session {} connecting", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id: session_id.clone(),
            status: "connecting".to_string(),
            message: format!("Session {} started", session_id),
        }),
    )
        .into_response()
}

/// POST /sessions/stop/:session_id
/// Stop a speech session and evict it from the registry
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping speech session: {}", session_id);

    let session = state.registry.remove(&session_id).await;

    match session {
        Some(session) => match session.close().await {
            Ok(stats) => (
                StatusCode::OK,
                Json(StopSessionResponse {
                    session_id,
                    status: "stopped".to_string(),
                    stats,
                }),
            )
                .into_response(),
            Err(e) => {
                error!("Failed to stop session {}: {:#}", session_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to stop session: {:#}", e),
                    }),
                )
                    .into_response()
            }
        },
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&session_id).await {
        Some(session) => (StatusCode::OK, Json(session.stats())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /sessions/:session_id/transcript
/// The reconciled transcript accumulated so far
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&session_id).await {
        Some(session) => (
            StatusCode::OK,
            Json(TranscriptResponse {
                session_id,
                messages: session.transcript(),
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
