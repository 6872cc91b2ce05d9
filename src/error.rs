//! Error types for the voice bridge

use thiserror::Error;

/// Result type alias for voice bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice bridge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing or invalid settings)
    #[error("configuration error: {0}")]
    Config(String),

    /// The speech service rejected a request or returned a failure
    #[error("upstream error: {0}")]
    Upstream(String),

    /// HTTP transport failure talking to the speech service or the guard
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Microphone permission was denied
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No usable capture device is attached
    #[error("no audio input device found")]
    NoDeviceFound,

    /// The runtime environment cannot capture audio at all
    #[error("audio capture is not supported in this environment")]
    UnsupportedEnvironment,

    /// The final response contained no recognizable speech
    #[error("no speech detected")]
    NoSpeechDetected,

    /// Local audio pipeline failure
    #[error("capture error: {0}")]
    Capture(String),

    /// Request originated from an origin outside the allow list
    #[error("origin not allowed: {0}")]
    CorsViolation(String),

    /// A voice session is already in progress on this client
    #[error("a voice session is already active")]
    SessionActive,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Message suitable for end-user display. Internal detail (addresses,
    /// upstream payloads) stays in the `Display` impl and the logs.
    pub fn user_message(&self) -> String {
        match self {
            Error::Config(_) => "Server configuration error. Please try again later.".to_string(),
            Error::Upstream(_) | Error::Http(_) => {
                "Speech service request failed. Please try again.".to_string()
            }
            Error::PermissionDenied => {
                "Microphone access denied. Please allow microphone access and try again."
                    .to_string()
            }
            Error::NoDeviceFound => {
                "No microphone found. Please check your audio devices.".to_string()
            }
            Error::UnsupportedEnvironment => {
                "Audio capture is not supported in this environment.".to_string()
            }
            Error::NoSpeechDetected => {
                "No speech detected. Please try speaking louder and clearer.".to_string()
            }
            Error::Capture(detail) => format!("Recording error: {detail}"),
            Error::CorsViolation(_) => "CORS policy violation".to_string(),
            Error::SessionActive => "A voice session is already active.".to_string(),
            Error::Io(_) | Error::Serialization(_) => {
                "Internal error. Please try again.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_do_not_leak_detail() {
        let err = Error::Upstream("secret-internal-host:9999 refused connection".to_string());
        assert!(!err.user_message().contains("secret-internal-host"));

        let err = Error::Config("HOUNDIFY_CLIENT_KEY is unset".to_string());
        assert!(!err.user_message().contains("HOUNDIFY"));
    }

    #[test]
    fn capture_errors_keep_their_detail() {
        let err = Error::Capture("device disconnected".to_string());
        assert_eq!(err.user_message(), "Recording error: device disconnected");
    }
}
