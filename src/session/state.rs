/// Lifecycle of one voice session.
///
/// Every session walks forward through these states; there are no
/// backward edges. A finished session is never restarted, the client
/// creates a fresh one instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not yet started.
    Idle,
    /// Waiting for the capture device to open (permission prompt).
    RequestingPermission,
    /// Audio is flowing to the service.
    Recording,
    /// Capture has stopped; waiting for the final response.
    Finalizing,
    /// The service answered.
    Responded,
    /// The session ended with an error.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Responded | SessionState::Failed)
    }

    /// Whether a session in this state holds capture or network
    /// resources that a new session would conflict with.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::RequestingPermission | SessionState::Recording | SessionState::Finalizing
        )
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, RequestingPermission)
                | (RequestingPermission, Recording)
                | (RequestingPermission, Failed)
                | (Recording, Finalizing)
                | (Recording, Failed)
                | (Finalizing, Responded)
                | (Finalizing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::RequestingPermission => "requesting-permission",
            SessionState::Recording => "recording",
            SessionState::Finalizing => "finalizing",
            SessionState::Responded => "responded",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
