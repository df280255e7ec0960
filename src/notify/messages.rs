use serde::{Deserialize, Serialize};

/// Status payload POSTed to the consumer's status path
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub call_id: String,
    /// `joined`, `left`, `error`, or a platform state name
    pub status: String,
    pub message: String,
    pub timestamp: String, // RFC3339 timestamp
    /// Files produced by the call (left events only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_files: Vec<String>,
}

/// Capture payload POSTed to the consumer's capture path
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMessage {
    pub call_id: String,
    pub audio_file_path: String,
    pub timestamp: String, // RFC3339 timestamp
    pub speaker_id: String,
    pub speaker_name: String,
    pub duration_ms: u64,
}
