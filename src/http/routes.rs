use super::handlers::{self, ErrorResponse};
use super::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        // Public client configuration
        .route("/api/config", get(handlers::client_config))
        // Signature service for client voice streams
        .route("/houndifyAuth", get(handlers::auth_signature))
        // Signed text query proxy
        .route("/textSearchProxy", post(handlers::text_search_proxy))
        // REST voice stub (real voice goes over WebSocket)
        .route("/api/houndify/voice", post(handlers::voice_query))
        // Health check
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_origin,
        ))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Browsers enforce CORS on their side; this middleware turns a
// disallowed origin into an explicit 403 instead of silently serving
// it. Requests without an Origin header (curl, same-origin) pass.
async fn enforce_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(origin) = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
    {
        if !state.config.server.origin_allowed(origin) {
            warn!(%origin, "Rejected cross-origin request");
            return (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse {
                    error: "CORS policy violation".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
