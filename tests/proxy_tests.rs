// End-to-end tests for the text query proxy
//
// These tests run the credential guard and a scripted upstream on
// ephemeral ports with the bridge client in front, verifying that auth
// headers are attached server-side, that upstream bodies pass through
// verbatim, and that conversation state survives across queries.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use voice_bridge::audio::{AudioFrame, CaptureBackend};
use voice_bridge::config::{Config, RawSettings};
use voice_bridge::houndify::{sign_token, QueryResponse, TransportEvent, VoiceTransport};
use voice_bridge::session::SessionOverrides;
use voice_bridge::{create_router, AppState, BridgeClient, Error, Result};

const TEST_CLIENT_ID: &str = "test-client-id";
const TEST_CLIENT_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

// ============================================================================
// Scripted upstream
// ============================================================================

#[derive(Clone, Debug)]
struct CapturedRequest {
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Stand-in for the Houndify text endpoint: records every request and
/// replays scripted responses in order.
#[derive(Clone, Default)]
struct Upstream {
    requests: Arc<StdMutex<Vec<CapturedRequest>>>,
    responses: Arc<StdMutex<VecDeque<(StatusCode, Value)>>>,
}

impl Upstream {
    fn push_response(&self, status: StatusCode, body: Value) {
        self.responses.lock().unwrap().push_back((status, body));
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn upstream_handler(
    State(upstream): State<Upstream>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let mut captured = HashMap::new();
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            captured.insert(name.as_str().to_string(), value.to_string());
        }
    }
    upstream.requests.lock().unwrap().push(CapturedRequest {
        query,
        headers: captured,
    });

    let scripted = upstream.responses.lock().unwrap().pop_front();
    let (status, body) =
        scripted.unwrap_or((StatusCode::OK, json!({"Status": "OK", "AllResults": []})));
    (status, Json(body))
}

/// Serve the scripted upstream on an ephemeral port; returns the full
/// endpoint URL for the guard's configuration.
async fn spawn_upstream(upstream: Upstream) -> String {
    let app = Router::new()
        .route("/v1/text", get(upstream_handler))
        .with_state(upstream);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1/text")
}

/// Serve a guard wired to the given upstream; returns its base URL.
async fn spawn_guard(endpoint: String, app_env: Option<&str>) -> String {
    let config = Config::from_raw(RawSettings {
        houndify_client_id: Some(TEST_CLIENT_ID.to_string()),
        houndify_client_key: Some(TEST_CLIENT_KEY.to_string()),
        houndify_endpoint: Some(endpoint),
        app_env: app_env.map(str::to_string),
        ..RawSettings::default()
    })
    .unwrap();
    let router = create_router(AppState::new(config).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn weather_body(conversation_turn: u64) -> Value {
    json!({
        "Status": "OK",
        "AllResults": [{
            "CommandKind": "WeatherCommand",
            "Transcription": "what is the weather",
            "SpokenResponseLong": "It is sunny in Santa Clara",
            "WrittenResponseLong": "Sunny, 22C",
            "ConversationState": {"turn": conversation_turn}
        }]
    })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_text_query_end_to_end() {
    let upstream = Upstream::default();
    upstream.push_response(StatusCode::OK, weather_body(1));
    let endpoint = spawn_upstream(upstream.clone()).await;
    let guard = spawn_guard(endpoint, None).await;

    let client = BridgeClient::connect(&guard).await.unwrap();
    assert_eq!(client.client_id(), TEST_CLIENT_ID);

    let response = client.text_query("what is the weather").await.unwrap();
    assert_eq!(
        response.summary(),
        "Response: It is sunny in Santa Clara\nDetails: Sunny, 22C"
    );
    assert_eq!(client.conversation_state().await, json!({"turn": 1}));

    let captured = upstream.requests();
    assert_eq!(captured.len(), 1);
    let request = &captured[0];
    assert_eq!(
        request.query.get("query").map(String::as_str),
        Some("what is the weather")
    );

    // The guard attached both auth headers with a verifiable signature
    let request_auth = request.header("hound-request-authentication").unwrap();
    let client_auth = request.header("hound-client-authentication").unwrap();
    let (user_id, request_id) = request_auth.split_once(';').unwrap();
    let mut parts = client_auth.splitn(3, ';');
    assert_eq!(parts.next(), Some(TEST_CLIENT_ID));
    let timestamp = parts.next().unwrap();
    let signature = parts.next().unwrap();
    let token = format!("{user_id};{request_id}{timestamp}");
    assert_eq!(sign_token(TEST_CLIENT_KEY, &token).unwrap(), signature);
    // The signature derives from the key; the key itself never travels
    assert!(!client_auth.contains(TEST_CLIENT_KEY));

    // Request info rode the header, with a matching length header
    let info_header = request.header("hound-request-info").unwrap();
    let info: Value = serde_json::from_str(info_header).unwrap();
    assert_eq!(info["UserID"], json!(user_id));
    assert!(info["Latitude"].is_number());
    let length: usize = request
        .header("hound-request-info-length")
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(length, info_header.len());
}

#[tokio::test]
async fn test_conversation_state_flows_into_the_next_query() {
    let upstream = Upstream::default();
    upstream.push_response(StatusCode::OK, weather_body(1));
    // Second answer carries no conversation state at all
    upstream.push_response(
        StatusCode::OK,
        json!({
            "Status": "OK",
            "AllResults": [{
                "CommandKind": "TimeCommand",
                "Transcription": "what time is it",
                "SpokenResponse": "It is noon"
            }]
        }),
    );
    let endpoint = spawn_upstream(upstream.clone()).await;
    let guard = spawn_guard(endpoint, None).await;
    let client = BridgeClient::connect(&guard).await.unwrap();

    client.text_query("what is the weather").await.unwrap();
    client.text_query("what time is it").await.unwrap();

    let captured = upstream.requests();
    assert_eq!(captured.len(), 2);

    // First query had no context to send
    let first: Value = serde_json::from_str(captured[0].header("hound-request-info").unwrap()).unwrap();
    assert!(first.get("ConversationState").is_none());

    // Second query echoed the state from the first answer
    let second: Value =
        serde_json::from_str(captured[1].header("hound-request-info").unwrap()).unwrap();
    assert_eq!(second["ConversationState"], json!({"turn": 1}));

    // A stateless answer keeps the existing context
    assert_eq!(client.conversation_state().await, json!({"turn": 1}));

    client.reset_conversation().await;
    assert_eq!(client.conversation_state().await, Value::Null);
}

#[tokio::test]
async fn test_upstream_failure_passes_through() {
    let upstream = Upstream::default();
    upstream.push_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "upstream exploded"}),
    );
    let endpoint = spawn_upstream(upstream.clone()).await;
    let guard = spawn_guard(endpoint, None).await;
    let client = BridgeClient::connect(&guard).await.unwrap();

    let err = client.text_query("boom").await.unwrap_err();
    match err {
        Error::Upstream(message) => assert_eq!(message, "upstream exploded"),
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_bad_gateway() {
    // Grab a port and release it so the connection is refused
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_endpoint = format!("http://{}/v1/text", listener.local_addr().unwrap());
    drop(listener);

    let guard = spawn_guard(dead_endpoint.clone(), None).await;
    let http = reqwest::Client::new();

    // Development mode keeps the failure detail
    let response = http
        .post(format!("{guard}/textSearchProxy"))
        .query(&[("query", "hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    let detail = body["error"].as_str().unwrap();
    assert_ne!(detail, "Speech service request failed. Please try again.");

    // Production mode redacts it
    let production = spawn_guard(dead_endpoint, Some("production")).await;
    let response = http
        .post(format!("{production}/textSearchProxy"))
        .query(&[("query", "hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Speech service request failed. Please try again."
    );
}

#[tokio::test]
async fn test_signature_round_trip_over_http() {
    let endpoint = spawn_upstream(Upstream::default()).await;
    let guard = spawn_guard(endpoint, None).await;

    let token = "voice-bridge-user;req-91755000000";
    let response = reqwest::Client::new()
        .get(format!("{guard}/houndifyAuth"))
        .query(&[("token", token)])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let signature = response.text().await.unwrap();
    assert_eq!(signature, sign_token(TEST_CLIENT_KEY, token).unwrap());
}

// ============================================================================
// Voice session doubles (used for the concurrency test)
// ============================================================================

/// Capture that produces no frames and stays open until stopped.
struct IdleCapture {
    keep: Option<mpsc::Sender<AudioFrame>>,
    capturing: bool,
}

impl IdleCapture {
    fn new() -> Self {
        Self {
            keep: None,
            capturing: false,
        }
    }
}

#[async_trait]
impl CaptureBackend for IdleCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(1);
        self.keep = Some(tx);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.keep = None;
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "idle"
    }
}

/// Transport that answers with a fixed response after end-of-audio.
struct NullTransport {
    response: Option<QueryResponse>,
    tx: Option<mpsc::Sender<TransportEvent>>,
}

impl NullTransport {
    fn answering(response: QueryResponse) -> Self {
        Self {
            response: Some(response),
            tx: None,
        }
    }
}

#[async_trait]
impl VoiceTransport for NullTransport {
    async fn open(&mut self, _request_info: &Value) -> Result<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(2);
        self.tx = Some(tx);
        Ok(rx)
    }

    async fn send_audio(&mut self, _pcm: Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(response) = self.response.take() {
            if let Some(tx) = &self.tx {
                let _ = tx.send(TransportEvent::Response(response)).await;
            }
        }
        self.tx = None;
        Ok(())
    }
}

fn voice_answer() -> QueryResponse {
    serde_json::from_value(weather_body(7)).unwrap()
}

#[tokio::test]
async fn test_one_voice_session_at_a_time() {
    let endpoint = spawn_upstream(Upstream::default()).await;
    let guard = spawn_guard(endpoint, None).await;
    let client = BridgeClient::connect(&guard).await.unwrap();

    let (handle, mut events) = client
        .start_voice_with(
            Box::new(IdleCapture::new()),
            Box::new(NullTransport::answering(voice_answer())),
            SessionOverrides::default(),
        )
        .await
        .unwrap();

    // A second session on the same client is refused while the first runs
    let err = client
        .start_voice_with(
            Box::new(IdleCapture::new()),
            Box::new(NullTransport::answering(voice_answer())),
            SessionOverrides::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionActive));
    assert_eq!(err.user_message(), "A voice session is already active.");

    handle.stop();
    let outcome = handle.outcome().await;
    assert!(outcome.is_response());
    while events.recv().await.is_some() {}

    // The slot frees up once the session ends
    let (handle, _events) = client
        .start_voice_with(
            Box::new(IdleCapture::new()),
            Box::new(NullTransport::answering(voice_answer())),
            SessionOverrides::default(),
        )
        .await
        .unwrap();
    handle.stop();
    assert!(handle.outcome().await.is_response());

    // The voice answer advanced the shared conversation state
    assert_eq!(client.conversation_state().await, json!({"turn": 7}));
}
