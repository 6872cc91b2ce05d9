//! Credential guard HTTP server
//!
//! The guard is the only process that holds the secret client key. It
//! exposes a small REST surface the browser client relies on:
//! - GET /api/config - Public client id and default request parameters
//! - GET /houndifyAuth?token=... - Sign a token for a voice stream
//! - POST /textSearchProxy - Forward a text query with auth attached
//! - POST /api/houndify/voice - Stub; voice streams over WebSocket
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ClientConfig, ErrorResponse, HealthResponse};
pub use routes::create_router;
pub use state::AppState;

use crate::config::Config;
use crate::error::Result;
use tracing::info;

/// Bind and serve the guard until the process is stopped.
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::new(config)?;
    let addr = state.config.server.bind_addr();
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Credential guard listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
