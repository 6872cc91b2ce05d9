use std::sync::Arc;

use crate::config::{Config, RuntimeEnv};
use crate::error::{Error, Result};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration (the only holder of the secret key)
    pub config: Arc<Config>,
    /// Pooled client for upstream requests, with the configured timeout
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.houndify.request_timeout)
            .build()
            .map_err(|err| Error::Config(format!("failed to build upstream HTTP client: {err}")))?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn is_production(&self) -> bool {
        self.config.server.environment == RuntimeEnv::Production
    }
}
