//! REST API Server for the compliance agent
//!
//! Exposes the orchestrator via HTTP endpoints
//! Integrates with the chat frontend

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::ComplianceError;
use crate::models::{Attachment, ChatRequest};
use crate::normalizer::mime_type_for;
use crate::Result;

/// Uploaded datasheets and photos can be large; axum's default is 2 MB.
const UPLOAD_LIMIT_BYTES: usize = 20 * 1024 * 1024;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatBody {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub timestamp: String,
}

impl ErrorBody {
    fn bad_request(message: impl Into<String>) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(Self {
                error: message.into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            }),
        )
            .into_response()
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(body): Json<ChatBody>) -> Response {
    if body.message.trim().is_empty() {
        return ErrorBody::bad_request("message must not be empty");
    }

    info!(chars = body.message.chars().count(), "Received chat request");
    let reply = state.orchestrator.answer(ChatRequest::text(body.message)).await;

    (StatusCode::OK, Json(reply)).into_response()
}

async fn upload_handler(State(state): State<ApiState>, multipart: Multipart) -> Response {
    let request = match read_upload(multipart).await {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected upload");
            return ErrorBody::bad_request(e.to_string());
        }
    };

    info!(
        chars = request.message.chars().count(),
        attachment = request.attachment.as_ref().map(|a| a.filename.as_str()).unwrap_or("none"),
        "Received chat request with upload"
    );
    let reply = state.orchestrator.answer(request).await;

    (StatusCode::OK, Json(reply)).into_response()
}

/// Collect the `message` field and the optional `file` part.
async fn read_upload(mut multipart: Multipart) -> Result<ChatRequest> {
    let mut message = None;
    let mut attachment = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "message" => {
                message = Some(field.text().await.map_err(invalid)?);
            }
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
                    .map(str::to_string)
                    .unwrap_or_else(|| mime_type_for(&filename).to_string());
                let bytes = field.bytes().await.map_err(invalid)?;

                if !bytes.is_empty() {
                    attachment = Some(Attachment {
                        bytes: bytes.to_vec(),
                        mime_type,
                        filename,
                    });
                }
            }
            _ => {}
        }
    }

    let message = message.unwrap_or_default();
    if message.trim().is_empty() {
        return Err(ComplianceError::InvalidRequest(
            "message must not be empty".to_string(),
        ));
    }

    Ok(ChatRequest { message, attachment })
}

fn invalid(e: MultipartError) -> ComplianceError {
    ComplianceError::InvalidRequest(e.to_string())
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route(
            "/api/chat/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
