use chrono::{DateTime, Utc};
use std::path::PathBuf;

use super::messages::{CaptureMessage, StatusMessage};
use crate::audio::CaptureArtifact;

/// Kind-specific part of an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Joined,
    Left { audio_files: Vec<PathBuf> },
    Error,
    StatusChanged { state: String },
    AudioCaptured {
        speaker_id: String,
        speaker_name: String,
        audio_file_path: PathBuf,
        duration_ms: u64,
    },
}

/// Which consumer endpoint an event goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    Status,
    Capture,
}

/// Lifecycle or capture event, built where it happens and dropped after one delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub call_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl WebhookEvent {
    fn new(call_id: &str, message: impl Into<String>, kind: EventKind) -> Self {
        Self {
            call_id: call_id.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn joined(call_id: &str, message: impl Into<String>) -> Self {
        Self::new(call_id, message, EventKind::Joined)
    }

    pub fn left(call_id: &str, message: impl Into<String>, audio_files: Vec<PathBuf>) -> Self {
        Self::new(call_id, message, EventKind::Left { audio_files })
    }

    pub fn error(call_id: &str, message: impl Into<String>) -> Self {
        Self::new(call_id, message, EventKind::Error)
    }

    pub fn status_changed(call_id: &str, state: impl Into<String>) -> Self {
        let state = state.into();
        Self::new(
            call_id,
            format!("Call state changed to {}", state),
            EventKind::StatusChanged { state },
        )
    }

    pub fn audio_captured(artifact: &CaptureArtifact) -> Self {
        Self::new(
            &artifact.call_id,
            format!(
                "Captured {} ms of audio for {}",
                artifact.duration_ms, artifact.display_label
            ),
            EventKind::AudioCaptured {
                speaker_id: artifact.source_id.clone(),
                speaker_name: artifact.display_label.clone(),
                audio_file_path: artifact.file_path.clone(),
                duration_ms: artifact.duration_ms,
            },
        )
    }

    pub fn route(&self) -> EventRoute {
        match self.kind {
            EventKind::AudioCaptured { .. } => EventRoute::Capture,
            _ => EventRoute::Status,
        }
    }

    /// Wire name of the status (`joined`, `left`, `error`, platform state)
    pub fn status(&self) -> &str {
        match &self.kind {
            EventKind::Joined => "joined",
            EventKind::Left { .. } => "left",
            EventKind::Error => "error",
            EventKind::StatusChanged { state } => state,
            EventKind::AudioCaptured { .. } => "audio_captured",
        }
    }

    /// JSON body for the consumer
    pub fn to_payload(&self) -> serde_json::Result<serde_json::Value> {
        let timestamp = self.timestamp.to_rfc3339();

        match &self.kind {
            EventKind::AudioCaptured {
                speaker_id,
                speaker_name,
                audio_file_path,
                duration_ms,
            } => serde_json::to_value(CaptureMessage {
                call_id: self.call_id.clone(),
                audio_file_path: audio_file_path.display().to_string(),
                timestamp,
                speaker_id: speaker_id.clone(),
                speaker_name: speaker_name.clone(),
                duration_ms: *duration_ms,
            }),
            kind => {
                let audio_files = match kind {
                    EventKind::Left { audio_files } => audio_files
                        .iter()
                        .map(|path| path.display().to_string())
                        .collect(),
                    _ => Vec::new(),
                };

                serde_json::to_value(StatusMessage {
                    call_id: self.call_id.clone(),
                    status: self.status().to_string(),
                    message: self.message.clone(),
                    timestamp,
                    audio_files,
                })
            }
        }
    }
}
