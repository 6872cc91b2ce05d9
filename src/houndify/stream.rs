//! Streaming voice transport.
//!
//! The voice endpoint speaks WebSocket: the client sends one JSON text
//! frame with request info and auth, then raw PCM in binary frames,
//! then an end-of-audio marker. The service pushes JSON text frames
//! back the whole time: partial transcripts while audio flows, then a
//! single final response.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::auth::RequestAuth;
use super::types::{PartialTranscript, QueryResponse};
use crate::error::{Error, Result};

const END_OF_AUDIO: &str = "END_OF_AUDIO";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Everything a voice stream needs to authenticate itself: the public
/// client id plus a signature fetched from the credential guard.
#[derive(Debug, Clone)]
pub struct StreamAuth {
    pub client_id: String,
    pub auth: RequestAuth,
    pub signature: String,
}

/// Events surfaced by a voice transport while a query is in flight.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Incremental transcription of audio heard so far
    Transcript(PartialTranscript),
    /// The final answer; nothing follows it
    Response(QueryResponse),
    /// The service reported a failure or the stream broke
    Error(String),
}

/// Bidirectional connection to the voice endpoint.
///
/// `open` hands back a channel of incoming events so the session loop
/// can `select!` over audio frames and service messages without
/// holding a borrow on the transport.
#[async_trait]
pub trait VoiceTransport: Send {
    /// Connect and send the opening request-info frame.
    async fn open(&mut self, request_info: &Value) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Stream one frame of little-endian PCM.
    async fn send_audio(&mut self, pcm: Vec<u8>) -> Result<()>;

    /// Signal that no more audio is coming. The connection stays up so
    /// the final response can still arrive. Idempotent.
    async fn finish(&mut self) -> Result<()>;
}

pub struct WsVoiceTransport {
    url: String,
    auth: StreamAuth,
    sink: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
    finished: bool,
}

impl WsVoiceTransport {
    pub fn new(url: impl Into<String>, auth: StreamAuth) -> Self {
        Self {
            url: url.into(),
            auth,
            sink: None,
            reader: None,
            finished: false,
        }
    }
}

#[async_trait]
impl VoiceTransport for WsVoiceTransport {
    async fn open(&mut self, request_info: &Value) -> Result<mpsc::Receiver<TransportEvent>> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| Error::Upstream(format!("failed to connect to voice endpoint: {err}")))?;
        debug!(url = %self.url, "Voice stream connected");

        let (mut sink, mut stream) = ws.split();
        let payload = open_payload(request_info, &self.auth);
        sink.send(Message::Text(payload.to_string()))
            .await
            .map_err(|err| Error::Upstream(format!("failed to send request info: {err}")))?;

        let (tx, rx) = mpsc::channel(64);
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = classify_message(&text) {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        let _ = tx
                            .send(TransportEvent::Error(format!("voice stream failed: {err}")))
                            .await;
                        break;
                    }
                }
            }
        });

        self.sink = Some(sink);
        self.reader = Some(reader);
        self.finished = false;
        Ok(rx)
    }

    async fn send_audio(&mut self, pcm: Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Error::Upstream("voice stream already finished".to_string()));
        }
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::Upstream("voice stream is not open".to_string()))?;
        sink.send(Message::Binary(pcm))
            .await
            .map_err(|err| Error::Upstream(format!("failed to send audio: {err}")))
    }

    async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Some(sink) = self.sink.as_mut() {
            sink.send(Message::Text(END_OF_AUDIO.to_string()))
                .await
                .map_err(|err| Error::Upstream(format!("failed to signal end of audio: {err}")))?;
        }
        Ok(())
    }
}

impl Drop for WsVoiceTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

// The opening frame is the merged request info plus the auth fields
// the service validates against the signature.
fn open_payload(request_info: &Value, auth: &StreamAuth) -> Value {
    let mut payload = request_info.clone();
    if let Value::Object(map) = &mut payload {
        map.insert("ClientID".to_string(), json!(auth.client_id));
        map.insert("RequestID".to_string(), json!(auth.auth.request_id));
        map.insert("TimeStamp".to_string(), json!(auth.auth.timestamp));
        map.insert("UserID".to_string(), json!(auth.auth.user_id));
        map.insert("Signature".to_string(), json!(auth.signature));
    }
    payload
}

fn classify_message(text: &str) -> Option<TransportEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "Ignoring non-JSON voice message");
            return None;
        }
    };

    if value.get("PartialTranscript").is_some() {
        return serde_json::from_value(value)
            .ok()
            .map(TransportEvent::Transcript);
    }
    if value.get("Status").and_then(Value::as_str) == Some("Error") {
        let message = value
            .get("ErrorMessage")
            .and_then(Value::as_str)
            .unwrap_or("voice query failed")
            .to_string();
        return Some(TransportEvent::Error(message));
    }
    if value.get("AllResults").is_some() {
        return serde_json::from_value(value)
            .ok()
            .map(TransportEvent::Response);
    }

    debug!("Ignoring unrecognized voice message");
    None
}
