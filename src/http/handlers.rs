use super::state::AppState;
use crate::error::Error;
use crate::houndify::auth::{self, HOUND_REQUEST_INFO, HOUND_REQUEST_INFO_LENGTH};
use crate::houndify::VoiceRequestInfo;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error, info};

// Fallback identity for proxied requests whose request info carries no
// UserID of its own.
const PROXY_USER_ID: &str = "voice-bridge-proxy";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Public configuration handed to browsers. The secret client key must
/// never appear here.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub client_id: String,
    pub voice_request_info: VoiceRequestInfo,
    pub voice_endpoint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VoiceStubResponse {
    pub error: String,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/config
/// Public client configuration: id, defaults, and the voice endpoint.
pub async fn client_config(State(state): State<AppState>) -> impl IntoResponse {
    let houndify = &state.config.houndify;
    Json(ClientConfig {
        client_id: houndify.client_id.clone(),
        voice_request_info: houndify.voice_defaults.clone(),
        voice_endpoint: houndify.voice_endpoint.clone(),
    })
}

/// GET /houndifyAuth?token=...
/// Sign a client-supplied auth token with the secret key. The client
/// uses the returned signature to open its own voice stream.
pub async fn auth_signature(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
) -> Response {
    let Some(token) = query.token.filter(|token| !token.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Missing token".to_string(),
            }),
        )
            .into_response();
    };

    match auth::sign_token(state.config.houndify.client_key(), &token) {
        Ok(signature) => {
            debug!("Issued stream signature");
            (StatusCode::OK, signature).into_response()
        }
        Err(err) => {
            error!("Failed to sign token: {}", err);
            error_response(&state, &err)
        }
    }
}

/// POST /textSearchProxy?query=...
/// Forward a text query upstream with server-side auth headers
/// attached. The response body passes through verbatim.
pub async fn text_search_proxy(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    _body: String,
) -> Response {
    // Request info rides in a header; the posted body is ignored, the
    // upstream call is rebuilt from scratch.
    let request_info = headers
        .get(HOUND_REQUEST_INFO)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let user_id = serde_json::from_str::<Value>(&request_info)
        .ok()
        .and_then(|info| {
            info.get("UserID")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| PROXY_USER_ID.to_string());

    let auth_headers = match auth::client_auth_headers(
        &state.config.houndify.client_id,
        state.config.houndify.client_key(),
        &user_id,
    ) {
        Ok(auth_headers) => auth_headers,
        Err(err) => {
            error!("Failed to sign proxied query: {}", err);
            return error_response(&state, &err);
        }
    };

    let query = params.get("query").cloned().unwrap_or_default();
    info!(%query, "Proxying text query");

    let mut upstream = state
        .http
        .get(&state.config.houndify.endpoint)
        .query(&params);
    for (name, value) in &auth_headers {
        upstream = upstream.header(*name, value);
    }
    if !request_info.is_empty() {
        upstream = upstream
            .header(HOUND_REQUEST_INFO, &request_info)
            .header(HOUND_REQUEST_INFO_LENGTH, request_info.len().to_string());
    }

    match upstream.send().await {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("application/json")
                .to_string();
            match response.bytes().await {
                Ok(bytes) => {
                    debug!(status = %status, bytes = bytes.len(), "Upstream responded");
                    (status, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
                }
                Err(err) => {
                    error!("Failed to read upstream response: {}", err);
                    error_response(&state, &Error::Http(err))
                }
            }
        }
        Err(err) => {
            error!("Upstream request failed: {}", err);
            error_response(&state, &Error::Http(err))
        }
    }
}

/// POST /api/houndify/voice
/// Voice queries stream over WebSocket, not REST; this endpoint only
/// points callers at the right mechanism.
pub async fn voice_query() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(VoiceStubResponse {
            error: "Voice queries are not served over REST".to_string(),
            message: "Start a voice session from the client; audio streams over WebSocket"
                .to_string(),
        }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Endpoint not found".to_string(),
        }),
    )
}

/// Map an error to its HTTP shape. Production responses carry only the
/// user-facing message; development keeps the full detail.
pub fn error_response(state: &AppState, err: &Error) -> Response {
    let status = match err {
        Error::Upstream(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
        Error::CorsViolation(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = if state.is_production() {
        err.user_message()
    } else {
        err.to_string()
    };
    (status, Json(ErrorResponse { error: message })).into_response()
}
