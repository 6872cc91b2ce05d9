use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::houndify::VoiceRequestInfo;

pub const DEFAULT_TEXT_ENDPOINT: &str = "https://api.houndify.com/v1/text";
pub const DEFAULT_VOICE_ENDPOINT: &str = "wss://api.houndify.com/v1/audio";
const DEFAULT_LATITUDE: f64 = 37.388309;
const DEFAULT_LONGITUDE: f64 = -121.973968;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_VAD_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_PORT: u16 = 3000;

/// Raw environment settings before validation. Every field is optional
/// here; `Config::from_raw` decides what is required and what defaults.
///
/// Variable names map 1:1 to fields: `HOUNDIFY_CLIENT_ID` becomes
/// `houndify_client_id`, and so on.
#[derive(Debug, Default, Deserialize)]
pub struct RawSettings {
    pub houndify_client_id: Option<String>,
    pub houndify_client_key: Option<String>,
    pub houndify_endpoint: Option<String>,
    pub houndify_voice_endpoint: Option<String>,
    pub houndify_request_timeout: Option<u64>,
    pub houndify_vad_timeout: Option<u64>,
    pub default_latitude: Option<f64>,
    pub default_longitude: Option<f64>,
    pub cors_origins: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub app_env: Option<String>,
}

#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub houndify: HoundifyConfig,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: RuntimeEnv,
    /// Allowed CORS origins. A single `*` entry allows everything.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    Development,
    Production,
}

pub struct HoundifyConfig {
    pub client_id: String,
    /// The secret client key. Never serialized, never logged; the only
    /// consumer is the request signer.
    pub client_key: SecretString,
    pub endpoint: String,
    pub voice_endpoint: String,
    pub request_timeout: std::time::Duration,
    pub voice_defaults: VoiceRequestInfo,
}

impl std::fmt::Debug for HoundifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoundifyConfig")
            .field("client_id", &self.client_id)
            .field("client_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("voice_endpoint", &self.voice_endpoint)
            .field("request_timeout", &self.request_timeout)
            .field("voice_defaults", &self.voice_defaults)
            .finish()
    }
}

impl HoundifyConfig {
    pub fn client_key(&self) -> &str {
        self.client_key.expose_secret()
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
    }
}

impl Config {
    /// Load settings from the process environment.
    pub fn load() -> Result<Self> {
        let raw: RawSettings = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|err| Error::Config(format!("failed to read environment: {err}")))?
            .try_deserialize()
            .map_err(|err| Error::Config(format!("invalid environment value: {err}")))?;

        Self::from_raw(raw)
    }

    /// Validate raw settings and apply defaults. Refuses to produce a
    /// config without both Houndify credentials, since without them the
    /// guard cannot sign anything.
    pub fn from_raw(raw: RawSettings) -> Result<Self> {
        let mut missing = Vec::new();
        if is_unset(&raw.houndify_client_id) {
            missing.push("HOUNDIFY_CLIENT_ID");
        }
        if is_unset(&raw.houndify_client_key) {
            missing.push("HOUNDIFY_CLIENT_KEY");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let environment = match raw.app_env.as_deref() {
            Some("production") => RuntimeEnv::Production,
            _ => RuntimeEnv::Development,
        };

        let cors_origins = match raw.cors_origins.as_deref() {
            None | Some("") => vec!["http://localhost:3000".to_string()],
            Some(list) => list
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        };

        let latitude = raw.default_latitude.unwrap_or(DEFAULT_LATITUDE);
        let longitude = raw.default_longitude.unwrap_or(DEFAULT_LONGITUDE);
        let vad_timeout = raw.houndify_vad_timeout.unwrap_or(DEFAULT_VAD_TIMEOUT_MS);

        Ok(Self {
            server: ServerConfig {
                host: raw.host.unwrap_or_else(|| "0.0.0.0".to_string()),
                port: raw.port.unwrap_or(DEFAULT_PORT),
                environment,
                cors_origins,
            },
            houndify: HoundifyConfig {
                // Guaranteed present by the missing-variable check above.
                client_id: raw.houndify_client_id.unwrap_or_default(),
                client_key: SecretString::from(raw.houndify_client_key.unwrap_or_default()),
                endpoint: raw
                    .houndify_endpoint
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| DEFAULT_TEXT_ENDPOINT.to_string()),
                voice_endpoint: raw
                    .houndify_voice_endpoint
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| DEFAULT_VOICE_ENDPOINT.to_string()),
                request_timeout: std::time::Duration::from_millis(
                    raw.houndify_request_timeout
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
                ),
                voice_defaults: VoiceRequestInfo::with_defaults(latitude, longitude, vad_timeout),
            },
        })
    }
}

// Empty strings count as unset, same as a missing variable.
fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> RawSettings {
        RawSettings {
            houndify_client_id: Some("test-client".to_string()),
            houndify_client_key: Some("dGVzdC1rZXk=".to_string()),
            ..RawSettings::default()
        }
    }

    #[test]
    fn refuses_to_start_without_credentials() {
        let err = Config::from_raw(RawSettings::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("HOUNDIFY_CLIENT_ID"));
        assert!(message.contains("HOUNDIFY_CLIENT_KEY"));
    }

    #[test]
    fn empty_credentials_count_as_missing() {
        let raw = RawSettings {
            houndify_client_id: Some("test-client".to_string()),
            houndify_client_key: Some(String::new()),
            ..RawSettings::default()
        };
        let err = Config::from_raw(raw).unwrap_err();
        assert!(err.to_string().contains("HOUNDIFY_CLIENT_KEY"));
        assert!(!err.to_string().contains("HOUNDIFY_CLIENT_ID"));
    }

    #[test]
    fn applies_documented_defaults() {
        let config = Config::from_raw(minimal_raw()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.environment, RuntimeEnv::Development);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.houndify.endpoint, DEFAULT_TEXT_ENDPOINT);
        assert_eq!(config.houndify.voice_endpoint, DEFAULT_VOICE_ENDPOINT);
        assert_eq!(
            config.houndify.request_timeout,
            std::time::Duration::from_secs(10)
        );
        let defaults = &config.houndify.voice_defaults;
        assert_eq!(defaults.latitude, 37.388309);
        assert_eq!(defaults.longitude, -121.973968);
        assert_eq!(defaults.sample_rate, 16_000);
        assert_eq!(defaults.vad_timeout, 2_000);
    }

    #[test]
    fn parses_cors_origin_list() {
        let raw = RawSettings {
            cors_origins: Some("http://localhost:3000, https://app.example.com".to_string()),
            ..minimal_raw()
        };
        let config = Config::from_raw(raw).unwrap();
        assert!(config.server.origin_allowed("http://localhost:3000"));
        assert!(config.server.origin_allowed("https://app.example.com"));
        assert!(!config.server.origin_allowed("https://evil.example.com"));
    }

    #[test]
    fn wildcard_allows_any_origin() {
        let raw = RawSettings {
            cors_origins: Some("*".to_string()),
            ..minimal_raw()
        };
        let config = Config::from_raw(raw).unwrap();
        assert!(config.server.origin_allowed("https://anything.example"));
    }

    #[test]
    fn production_env_is_recognized() {
        let raw = RawSettings {
            app_env: Some("production".to_string()),
            ..minimal_raw()
        };
        let config = Config::from_raw(raw).unwrap();
        assert_eq!(config.server.environment, RuntimeEnv::Production);
    }

    #[test]
    fn debug_output_never_contains_the_key() {
        let config = Config::from_raw(minimal_raw()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("dGVzdC1rZXk"));
        assert!(debug.contains("test-client"));
    }
}
