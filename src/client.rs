//! Client side of the bridge: talks to the credential guard for
//! configuration and signatures, runs text queries through the proxy,
//! and drives voice sessions against the streaming endpoint.
//!
//! The client never sees the secret key. Text queries are signed by
//! the guard; voice streams authenticate with a signature the guard
//! computes over a client-chosen token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::audio::CaptureBackend;
use crate::error::{Error, Result};
use crate::houndify::auth::{RequestAuth, HOUND_REQUEST_INFO};
use crate::houndify::types::CommandResult;
use crate::houndify::{QueryResponse, StreamAuth, VoiceTransport, WsVoiceTransport};
use crate::http::ClientConfig;
use crate::session::{
    has_context, SessionEvent, SessionHandle, SessionOverrides, SessionParams, VoiceSession,
};

const DEFAULT_USER_ID: &str = "voice-bridge-user";

pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    voice_endpoint: String,
    user_id: String,
    defaults: crate::houndify::VoiceRequestInfo,
    /// Continuity token shared with running voice sessions.
    conversation_state: Arc<Mutex<Value>>,
    /// True while a voice session is running; enforces one at a time.
    voice_active: Arc<AtomicBool>,
}

impl BridgeClient {
    /// Fetch public configuration from the guard and build a client.
    pub async fn connect(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::new();

        let response = http.get(format!("{base_url}/api/config")).send().await?;
        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "config request failed with status {}",
                response.status()
            )));
        }
        let config: ClientConfig = response.json().await?;
        info!(client_id = %config.client_id, "Connected to credential guard");

        Ok(Self {
            http,
            base_url,
            client_id: config.client_id,
            voice_endpoint: config.voice_endpoint,
            user_id: DEFAULT_USER_ID.to_string(),
            defaults: config.voice_request_info,
            conversation_state: Arc::new(Mutex::new(Value::Null)),
            voice_active: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current conversation-state token (Null until a query succeeds).
    pub async fn conversation_state(&self) -> Value {
        self.conversation_state.lock().await.clone()
    }

    /// Forget multi-turn context.
    pub async fn reset_conversation(&self) {
        *self.conversation_state.lock().await = Value::Null;
    }

    /// Run a text query through the guard's proxy. On success the
    /// conversation state advances; on failure it is left untouched so
    /// the user can retry without losing context.
    pub async fn text_query(&self, query: &str) -> Result<QueryResponse> {
        let request_info = {
            let state = self.conversation_state.lock().await;
            self.text_request_info(&state)
        };

        debug!(%query, "Sending text query");
        let response = self
            .http
            .post(format!("{}/textSearchProxy", self.base_url))
            .query(&[("query", query)])
            .header(HOUND_REQUEST_INFO, request_info.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&detail)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("text query failed with status {status}"));
            return Err(Error::Upstream(message));
        }

        let parsed: QueryResponse = response.json().await?;
        self.absorb(&parsed).await;
        Ok(parsed)
    }

    /// Start a voice session against the configured voice endpoint.
    /// Only one session may run at a time per client.
    pub async fn start_voice(
        &self,
        capture: Box<dyn CaptureBackend>,
        overrides: SessionOverrides,
    ) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
        if self.voice_active.load(Ordering::SeqCst) {
            return Err(Error::SessionActive);
        }
        let auth = self.authenticate().await?;
        let transport = Box::new(WsVoiceTransport::new(self.voice_endpoint.clone(), auth));
        self.start_voice_with(capture, transport, overrides).await
    }

    /// Start a voice session over an already-built transport. Used by
    /// tests and by callers that bring their own connection.
    pub async fn start_voice_with(
        &self,
        capture: Box<dyn CaptureBackend>,
        transport: Box<dyn VoiceTransport>,
        overrides: SessionOverrides,
    ) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
        if self.voice_active.swap(true, Ordering::SeqCst) {
            return Err(Error::SessionActive);
        }

        let params = SessionParams::from_defaults(&self.defaults).apply(overrides);
        let request_info = {
            let state = self.conversation_state.lock().await;
            params.request_info(&self.user_id, &state)
        };

        let (handle, events) = VoiceSession::new(params, request_info)
            .with_conversation_state(Arc::clone(&self.conversation_state))
            .with_active_flag(Arc::clone(&self.voice_active))
            .spawn(capture, transport);
        Ok((handle, events))
    }

    /// Ask the guard to sign a fresh auth token for a voice stream.
    async fn authenticate(&self) -> Result<StreamAuth> {
        let auth = RequestAuth::new(self.user_id.clone());
        let response = self
            .http
            .get(format!("{}/houndifyAuth", self.base_url))
            .query(&[("token", auth.token())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "signature request failed with status {}",
                response.status()
            )));
        }
        let signature = response.text().await?;
        debug!("Received stream signature from guard");
        Ok(StreamAuth {
            client_id: self.client_id.clone(),
            auth,
            signature,
        })
    }

    async fn absorb(&self, response: &QueryResponse) {
        if let Some(update) = response
            .first_result()
            .and_then(CommandResult::conversation_state_update)
        {
            *self.conversation_state.lock().await = update.clone();
            debug!("Conversation state updated");
        }
    }

    fn text_request_info(&self, conversation_state: &Value) -> Value {
        let mut info = json!({
            "UserID": self.user_id,
            "Latitude": self.defaults.latitude,
            "Longitude": self.defaults.longitude,
        });
        if has_context(conversation_state) {
            info["ConversationState"] = conversation_state.clone();
        }
        info
    }
}
