use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{SessionEvent, SessionOutcome};
use super::params::SessionParams;
use super::state::SessionState;
use crate::audio::CaptureBackend;
use crate::error::{Error, Result};
use crate::houndify::types::{CommandResult, PartialTranscript, QueryResponse};
use crate::houndify::{TransportEvent, VoiceTransport};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One voice interaction from capture start to final response.
///
/// A session is single-use: `spawn` consumes it, runs the state
/// machine on a task, and the outcome is collected through the
/// returned [`SessionHandle`]. Stopping early, VAD auto-stop, and
/// errors all funnel through the same cleanup path, so the capture
/// device is released no matter how the session ends.
pub struct VoiceSession {
    params: SessionParams,
    request_info: Value,
    conversation_state: Arc<Mutex<Value>>,
    active: Option<Arc<AtomicBool>>,
}

/// Control handle for a running session.
#[derive(Debug)]
pub struct SessionHandle {
    stop: mpsc::Sender<()>,
    join: JoinHandle<SessionOutcome>,
}

impl VoiceSession {
    pub fn new(params: SessionParams, request_info: Value) -> Self {
        Self {
            params,
            request_info,
            conversation_state: Arc::new(Mutex::new(Value::Null)),
            active: None,
        }
    }

    /// Share a conversation-state slot with the owning client; it is
    /// updated in place when the session ends with a usable response.
    pub fn with_conversation_state(mut self, state: Arc<Mutex<Value>>) -> Self {
        self.conversation_state = state;
        self
    }

    /// Flag cleared when the session task ends, however it ends. The
    /// client uses this to refuse a second concurrent session.
    pub(crate) fn with_active_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.active = Some(flag);
        self
    }

    /// Start the session on its own task.
    pub fn spawn(
        self,
        capture: Box<dyn CaptureBackend>,
        transport: Box<dyn VoiceTransport>,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let runner = SessionRunner {
            params: self.params,
            request_info: self.request_info,
            conversation_state: self.conversation_state,
            active: self.active,
            state: SessionState::Idle,
            latest_partial: String::new(),
            events: events_tx,
        };
        let join = tokio::spawn(runner.run(capture, transport, stop_rx));

        (
            SessionHandle {
                stop: stop_tx,
                join,
            },
            events_rx,
        )
    }
}

impl SessionHandle {
    /// Ask the session to stop recording and finalize. Calling this on
    /// a session that is already finalizing or finished is a no-op.
    pub fn stop(&self) {
        let _ = self.stop.try_send(());
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the session to end and take its outcome.
    pub async fn outcome(self) -> SessionOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => {
                SessionOutcome::Error(Error::Capture(format!("voice session task failed: {err}")))
            }
        }
    }
}

/// Why the recording loop ended.
enum RecordingEnd {
    /// The user asked to stop
    Stopped,
    /// The silence detector fired
    Silence,
    /// The capture stream closed on its own (file finished, device gone)
    CaptureEnded,
    /// The capture backend delivered audio the session cannot forward
    CaptureFailed(String),
    /// The service answered before we stopped sending audio
    EarlyResponse(QueryResponse),
    /// The service or the connection failed mid-stream
    TransportFailed(String),
}

struct SessionRunner {
    params: SessionParams,
    request_info: Value,
    conversation_state: Arc<Mutex<Value>>,
    active: Option<Arc<AtomicBool>>,
    state: SessionState,
    /// Most recent partial transcript; repeats are not re-surfaced.
    latest_partial: String,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionRunner {
    async fn run(
        mut self,
        mut capture: Box<dyn CaptureBackend>,
        mut transport: Box<dyn VoiceTransport>,
        mut stop_rx: mpsc::Receiver<()>,
    ) -> SessionOutcome {
        // Cleared on every exit path, including panics.
        let _active = ActiveGuard(self.active.take());

        self.set_state(SessionState::RequestingPermission);
        let mut frames = match capture.start().await {
            Ok(frames) => frames,
            Err(err) => return self.fail(err),
        };

        let mut events = match transport.open(&self.request_info).await {
            Ok(events) => events,
            Err(err) => {
                if let Err(stop_err) = capture.stop().await {
                    warn!(error = %stop_err, "Failed to stop audio capture");
                }
                return self.fail(err);
            }
        };

        self.set_state(SessionState::Recording);
        info!(backend = capture.name(), "Recording started");
        let mut detector = self.params.silence_detector();
        let mut stop_closed = false;

        let ended = loop {
            tokio::select! {
                stop = stop_rx.recv(), if !stop_closed => match stop {
                    Some(()) => {
                        info!("Stop requested");
                        break RecordingEnd::Stopped;
                    }
                    // Handle dropped; keep recording until VAD or EOF.
                    None => stop_closed = true,
                },
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        // The request info already told the service what
                        // rate to expect; mismatched PCM would decode as
                        // garbage upstream.
                        if frame.sample_rate != self.params.sample_rate {
                            break RecordingEnd::CaptureFailed(format!(
                                "capture produced {} Hz audio for a {} Hz session",
                                frame.sample_rate, self.params.sample_rate
                            ));
                        }
                        if let Some(detector) = detector.as_mut() {
                            if detector.observe(&frame) {
                                info!(
                                    timeout_ms = self.params.vad_timeout_ms,
                                    "Trailing silence limit reached"
                                );
                                break RecordingEnd::Silence;
                            }
                        }
                        if let Err(err) = transport.send_audio(frame.pcm_bytes()).await {
                            // The event stream will surface the real failure.
                            warn!(error = %err, "Failed to forward audio frame");
                        }
                    }
                    None => {
                        debug!("Capture stream ended");
                        break RecordingEnd::CaptureEnded;
                    }
                },
                event = events.recv() => match event {
                    Some(TransportEvent::Transcript(partial)) => self.on_partial(partial),
                    Some(TransportEvent::Response(response)) => {
                        debug!("Final response arrived while still recording");
                        break RecordingEnd::EarlyResponse(response);
                    }
                    Some(TransportEvent::Error(message)) => {
                        break RecordingEnd::TransportFailed(message);
                    }
                    None => {
                        break RecordingEnd::TransportFailed(
                            "voice stream closed unexpectedly".to_string(),
                        );
                    }
                },
            }
        };

        let early_response = match ended {
            RecordingEnd::TransportFailed(message) => {
                release(capture.as_mut(), transport.as_mut()).await;
                return self.fail(Error::Upstream(message));
            }
            RecordingEnd::CaptureFailed(message) => {
                release(capture.as_mut(), transport.as_mut()).await;
                return self.fail(Error::Capture(message));
            }
            RecordingEnd::EarlyResponse(response) => Some(response),
            RecordingEnd::Stopped | RecordingEnd::Silence | RecordingEnd::CaptureEnded => None,
        };

        self.set_state(SessionState::Finalizing);
        release(capture.as_mut(), transport.as_mut()).await;
        // Device goes away here even though the response is still pending.
        drop(capture);

        let result = match early_response {
            Some(response) => Ok(response),
            None => self.await_final(&mut events).await,
        };

        match result {
            Ok(response) if !response.has_usable_speech() => self.fail(Error::NoSpeechDetected),
            Ok(response) => self.respond(response).await,
            Err(err) => self.fail(err),
        }
    }

    /// Drain remaining events until the final response shows up.
    /// Partial transcripts can still trickle in here.
    async fn await_final(
        &mut self,
        events: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<QueryResponse> {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Transcript(partial) => self.on_partial(partial),
                TransportEvent::Response(response) => return Ok(response),
                TransportEvent::Error(message) => return Err(Error::Upstream(message)),
            }
        }
        Err(Error::Upstream(
            "voice stream closed before a response arrived".to_string(),
        ))
    }

    fn on_partial(&mut self, partial: PartialTranscript) {
        let text = partial.partial_transcript.trim();
        if text.is_empty() || text == self.latest_partial {
            return;
        }
        if partial.safe_to_stop_audio == Some(true) {
            debug!("Service reports it is safe to stop audio");
        }
        self.latest_partial = text.to_string();
        self.emit(SessionEvent::PartialTranscript(text.to_string()));
    }

    async fn respond(&mut self, response: QueryResponse) -> SessionOutcome {
        if let Some(update) = response
            .first_result()
            .and_then(CommandResult::conversation_state_update)
        {
            *self.conversation_state.lock().await = update.clone();
            debug!("Conversation state updated");
        }
        self.set_state(SessionState::Responded);
        self.emit(SessionEvent::Response(response.clone()));
        SessionOutcome::Response(response)
    }

    fn fail(&mut self, err: Error) -> SessionOutcome {
        warn!(error = %err, state = %self.state, "Voice session failed");
        self.set_state(SessionState::Failed);
        self.emit(SessionEvent::Failed(err.user_message()));
        SessionOutcome::Error(err)
    }

    fn set_state(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Ignoring invalid state transition");
            return;
        }
        debug!(from = %self.state, to = %next, "Session state changed");
        self.state = next;
        self.emit(SessionEvent::StateChanged(next));
    }

    // Events are display-only; never let a slow consumer stall the
    // session.
    fn emit(&self, event: SessionEvent) {
        if let Err(err) = self.events.try_send(event) {
            debug!(error = %err, "Dropping session event");
        }
    }
}

/// Stop capture and signal end-of-audio, tolerating failures in both.
/// Cleanup must never abort the session.
async fn release(capture: &mut dyn CaptureBackend, transport: &mut dyn VoiceTransport) {
    if let Err(err) = capture.stop().await {
        warn!(error = %err, "Failed to stop audio capture");
    }
    if let Err(err) = transport.finish().await {
        warn!(error = %err, "Failed to signal end of audio");
    }
}

struct ActiveGuard(Option<Arc<AtomicBool>>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Some(flag) = self.0.take() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}
