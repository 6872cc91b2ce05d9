use serde_json::{json, Value};

use crate::audio::SilenceDetector;
use crate::houndify::VoiceRequestInfo;

/// Effective parameters for one voice session: the server-advertised
/// defaults with any per-session overrides applied.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Sample rate the capture backend should deliver (Hz)
    pub sample_rate: u32,

    /// Whether incremental transcripts are requested
    pub partial_transcripts: bool,

    /// Whether trailing silence ends the recording automatically
    pub enable_vad: bool,

    /// Trailing-silence timeout in milliseconds
    pub vad_timeout_ms: u64,

    /// Silence threshold scale, 0..=1 (1 treats quiet audio as speech)
    pub vad_sensitivity: f32,

    /// Audio format requested for spoken responses
    pub response_audio_format: String,

    /// Location hint forwarded to the service
    pub latitude: f64,
    pub longitude: f64,
}

/// Per-session parameter overrides. `None` keeps the default.
#[derive(Debug, Clone, Default)]
pub struct SessionOverrides {
    pub sample_rate: Option<u32>,
    pub partial_transcripts: Option<bool>,
    pub enable_vad: Option<bool>,
    pub vad_timeout_ms: Option<u64>,
    pub vad_sensitivity: Option<f32>,
    pub response_audio_format: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl SessionParams {
    pub fn from_defaults(defaults: &VoiceRequestInfo) -> Self {
        Self {
            sample_rate: defaults.sample_rate,
            partial_transcripts: defaults.partial_transcripts_desired,
            enable_vad: defaults.enable_vad,
            vad_timeout_ms: defaults.vad_timeout,
            vad_sensitivity: defaults.vad_sensitivity,
            response_audio_format: defaults.response_audio_format.clone(),
            latitude: defaults.latitude,
            longitude: defaults.longitude,
        }
    }

    pub fn apply(mut self, overrides: SessionOverrides) -> Self {
        if let Some(sample_rate) = overrides.sample_rate {
            self.sample_rate = sample_rate;
        }
        if let Some(partial) = overrides.partial_transcripts {
            self.partial_transcripts = partial;
        }
        if let Some(enable) = overrides.enable_vad {
            self.enable_vad = enable;
        }
        if let Some(timeout) = overrides.vad_timeout_ms {
            self.vad_timeout_ms = timeout;
        }
        if let Some(sensitivity) = overrides.vad_sensitivity {
            self.vad_sensitivity = sensitivity;
        }
        if let Some(format) = overrides.response_audio_format {
            self.response_audio_format = format;
        }
        if let Some(latitude) = overrides.latitude {
            self.latitude = latitude;
        }
        if let Some(longitude) = overrides.longitude {
            self.longitude = longitude;
        }
        self
    }

    /// Local silence detector, when VAD is on.
    pub fn silence_detector(&self) -> Option<SilenceDetector> {
        self.enable_vad
            .then(|| SilenceDetector::new(self.vad_sensitivity, self.vad_timeout_ms))
    }

    /// Request-info JSON sent to the service when the stream opens.
    /// Conversation state is included only when there is prior context.
    pub fn request_info(&self, user_id: &str, conversation_state: &Value) -> Value {
        let mut info = json!({
            "UserID": user_id,
            "Latitude": self.latitude,
            "Longitude": self.longitude,
            "PartialTranscriptsDesired": self.partial_transcripts,
            "SampleRate": self.sample_rate,
            "ResponseAudioFormat": self.response_audio_format,
            "EnableVAD": self.enable_vad,
            "VADSensitivity": self.vad_sensitivity,
            "VADTimeout": self.vad_timeout_ms,
        });
        if has_context(conversation_state) {
            info["ConversationState"] = conversation_state.clone();
        }
        info
    }
}

/// Whether a conversation-state value carries real context worth
/// echoing back to the service.
pub fn has_context(conversation_state: &Value) -> bool {
    match conversation_state {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}
