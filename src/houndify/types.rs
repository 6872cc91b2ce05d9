//! Wire types for the Houndify text and voice APIs.
//!
//! Field names follow the service's JSON casing (`AllResults`,
//! `PartialTranscript`, ...). Everything here is a plain data carrier;
//! auth and transport live in sibling modules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default request parameters advertised to clients via `/api/config`
/// and merged into every outgoing query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceRequestInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub partial_transcripts_desired: bool,
    pub response_audio_format: String,
    pub sample_rate: u32,
    #[serde(rename = "EnableVAD")]
    pub enable_vad: bool,
    #[serde(rename = "VADSensitivity")]
    pub vad_sensitivity: f32,
    /// Trailing-silence timeout in milliseconds.
    #[serde(rename = "VADTimeout")]
    pub vad_timeout: u64,
}

impl VoiceRequestInfo {
    pub fn with_defaults(latitude: f64, longitude: f64, vad_timeout_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            partial_transcripts_desired: true,
            response_audio_format: "WAV".to_string(),
            sample_rate: 16_000,
            enable_vad: true,
            vad_sensitivity: 0.5,
            vad_timeout: vad_timeout_ms,
        }
    }
}

/// Incremental transcription update pushed while audio is streaming.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PartialTranscript {
    #[serde(default)]
    pub partial_transcript: String,
    #[serde(default, rename = "DurationMS")]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub safe_to_stop_audio: Option<bool>,
}

/// Final answer for one text or voice query.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub all_results: Vec<CommandResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One entry of `AllResults`. Only the first entry is consulted;
/// unknown fields are preserved nowhere and simply ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CommandResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoken_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoken_response_long: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_response_long: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_state: Option<Value>,
}

impl QueryResponse {
    pub fn first_result(&self) -> Option<&CommandResult> {
        self.all_results.first()
    }

    /// Whether a voice query actually recognized speech. `NoResult`
    /// command kinds and missing/empty transcriptions both count as
    /// "nothing was said".
    pub fn has_usable_speech(&self) -> bool {
        match self.first_result() {
            None => false,
            Some(result) => {
                result.command_kind.as_deref() != Some("NoResult")
                    && result
                        .transcription
                        .as_deref()
                        .is_some_and(|t| !t.trim().is_empty())
            }
        }
    }

    /// Human-readable rendering of the first result: the spoken answer
    /// first, the longer written form as a detail line.
    pub fn summary(&self) -> String {
        let Some(result) = self.first_result() else {
            return "No response available".to_string();
        };
        let mut lines = Vec::new();
        if let Some(spoken) = result
            .spoken_response_long
            .as_deref()
            .or(result.spoken_response.as_deref())
        {
            lines.push(format!("Response: {spoken}"));
        }
        if let Some(written) = result
            .written_response_long
            .as_deref()
            .or(result.written_response.as_deref())
        {
            lines.push(format!("Details: {written}"));
        }
        if lines.is_empty() {
            "No response available".to_string()
        } else {
            lines.join("\n")
        }
    }
}

impl CommandResult {
    /// Continuity token to carry into the next query. `None` when the
    /// service sent nothing useful (absent, null, or an empty object),
    /// in which case the caller keeps its current state.
    pub fn conversation_state_update(&self) -> Option<&Value> {
        match self.conversation_state.as_ref() {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(value) => Some(value),
        }
    }
}
