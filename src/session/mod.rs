//! Voice session management
//!
//! This module provides the `VoiceSession` state machine that manages:
//! - Capture backend lifecycle (permission, start, stop, release)
//! - Streaming captured audio to the voice transport
//! - Partial transcript and state-change notifications
//! - Silence-based auto-stop (VAD)
//! - Conversation-state continuity across queries

mod events;
mod params;
mod session;
mod state;

pub use events::{SessionEvent, SessionOutcome};
pub use params::{has_context, SessionOverrides, SessionParams};
pub use session::{SessionHandle, VoiceSession};
pub use state::SessionState;
