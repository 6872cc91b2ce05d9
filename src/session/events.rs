use super::state::SessionState;
use crate::error::Error;
use crate::houndify::QueryResponse;

/// Display-oriented notifications emitted while a session runs.
///
/// Events are advisory: the authoritative result comes back through
/// [`super::SessionHandle::outcome`]. A slow or absent consumer never
/// stalls the session; events are dropped instead.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session moved to a new lifecycle state
    StateChanged(SessionState),
    /// Incremental transcription of the audio heard so far
    PartialTranscript(String),
    /// The final answer (also delivered via the outcome)
    Response(QueryResponse),
    /// The session failed; the payload is the user-facing message
    Failed(String),
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Response(QueryResponse),
    Error(Error),
}

impl SessionOutcome {
    pub fn is_response(&self) -> bool {
        matches!(self, SessionOutcome::Response(_))
    }

    /// User-facing text for this outcome, ready to render.
    pub fn user_message(&self) -> String {
        match self {
            SessionOutcome::Response(response) => response.summary(),
            SessionOutcome::Error(error) => error.user_message(),
        }
    }
}
