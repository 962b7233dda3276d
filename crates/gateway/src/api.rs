//! Request handlers for the `/api` surface.

use axum::{
    Extension,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use lumi_agent::ChatRequest;
use lumi_core::error::Error;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::{AppState, CallerId};

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    /// Token usage reported by the LLM, or `{}` when it was not called.
    pub usage: Value,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: Value,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn detail(status: StatusCode, detail: impl Into<Value>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

/// Map a pipeline error to its HTTP response.
pub fn error_response(err: &Error) -> ApiError {
    match err {
        Error::InvalidRequest(reason) => detail(StatusCode::BAD_REQUEST, reason.as_str()),
        Error::Provider(provider_err) => {
            warn!(error = %provider_err, "LLM call failed");
            detail(
                StatusCode::BAD_GATEWAY,
                json!({
                    "upstream_error": provider_err.upstream_body(),
                    "status": provider_err.status_code(),
                }),
            )
        }
        other => {
            error!(error = %other, "Chat turn failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// POST /api/chat
pub async fn chat_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerId>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| detail(StatusCode::BAD_REQUEST, rejection.body_text()))?;

    info!(
        user_id = %caller.0,
        message_len = request.message.len(),
        has_profile = request.profile.is_some(),
        "Chat request"
    );

    let reply = state
        .orchestrator
        .handle(&caller.0, &request)
        .await
        .map_err(|e| error_response(&e))?;

    let usage = match reply.usage {
        Some(usage) => json!({
            "prompt_tokens": usage.prompt_tokens,
            "completion_tokens": usage.completion_tokens,
            "total_tokens": usage.total_tokens,
        }),
        None => json!({}),
    };

    Ok(Json(ChatResponse {
        answer: reply.answer,
        usage,
    }))
}

#[derive(Serialize)]
pub struct BannerResponse {
    pub message: String,
}

/// GET /api
pub async fn banner_handler() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: format!(
            "Lumi LLM API is running in version: {}",
            env!("CARGO_PKG_VERSION")
        ),
    })
}
