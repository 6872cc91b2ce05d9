pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod houndify;
pub mod http;
pub mod session;

pub use audio::{AudioFrame, CaptureBackend, CaptureFactory, FileCapture, SilenceDetector};
pub use client::BridgeClient;
pub use config::Config;
pub use error::{Error, Result};
pub use houndify::{PartialTranscript, QueryResponse, VoiceRequestInfo};
pub use http::{create_router, AppState};
pub use session::{SessionEvent, SessionHandle, SessionOutcome, SessionState, VoiceSession};
