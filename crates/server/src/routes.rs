//! Public HTTP surface: the chat endpoint used for manual testing and the
//! image proxy the rendered replies point at.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mostrador_agent::{AssistantClient, RunOrchestrator};
use mostrador_core::domain::reply::ReplySegment;
use mostrador_store::CustomerStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RunOrchestrator>,
    pub assistant: Arc<dyn AssistantClient>,
}

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub from: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: Vec<ReplySegment>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

pub fn router(state: AppState, customers: Arc<dyn CustomerStore>) -> Router {
    Router::new()
        .route("/chat", get(chat))
        .route("/images/{file_id}", get(image))
        .with_state(state)
        .merge(crate::health::router(customers))
}

/// Runs one full exchange for `from` and returns the rendered reply segments.
/// Shares sessions with the channel, so a phone number talking here continues
/// its existing conversation.
pub async fn chat(State(state): State<AppState>, Query(params): Query<ChatParams>) -> Response {
    match state.orchestrator.handle_message(&params.from, &params.message).await {
        Ok(reply) => {
            let payload = ChatResponse { message: reply.segments, session_id: reply.session_id };
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => {
            error!(
                event_name = "server.chat_failed",
                from = %params.from,
                error = %error,
                "chat exchange failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Error en el servidor" })))
                .into_response()
        }
    }
}

/// Proxies a stored file from the completion service. The upstream does not
/// report a media type, so the body is served as JPEG like the catalog images
/// it holds.
pub async fn image(State(state): State<AppState>, Path(file_id): Path<String>) -> Response {
    match state.assistant.file_content(&file_id).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(error) => {
            error!(
                event_name = "server.image_failed",
                file_id = %file_id,
                error = %error,
                "image fetch failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Error al obtener la imagen").into_response()
        }
    }
}
