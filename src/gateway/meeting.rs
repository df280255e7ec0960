use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;
use crate::error::JoinError;

/// Validated join target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingReference(String);

impl MeetingReference {
    /// Accepts opaque tokens and http(s) join URLs
    pub fn parse(raw: &str) -> Result<Self, JoinError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(JoinError::InvalidMeetingReference(
                "meeting reference is empty".to_string(),
            ));
        }

        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(JoinError::InvalidMeetingReference(format!(
                "meeting reference contains whitespace or control characters: {:?}",
                trimmed
            )));
        }

        if trimmed.contains("://") {
            let url = url::Url::parse(trimmed)
                .map_err(|e| JoinError::InvalidMeetingReference(format!("{}: {}", trimmed, e)))?;

            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(JoinError::InvalidMeetingReference(format!(
                    "unsupported join URL: {}",
                    trimmed
                )));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MeetingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity the agent joins under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum IdentityMode {
    /// The application's own identity. Keeps per-speaker audio available.
    Application,
    /// Guest with a display name. Platforms typically deliver mixed audio only.
    Guest { display_name: String },
}

impl IdentityMode {
    pub fn guest(display_name: impl Into<String>) -> Self {
        IdentityMode::Guest {
            display_name: display_name.into(),
        }
    }

    /// Caller-facing note about the audio trade-off of this mode
    pub fn audio_warning(&self) -> Option<String> {
        match self {
            IdentityMode::Application => None,
            IdentityMode::Guest { display_name } => Some(format!(
                "Joined as guest '{}': the platform may deliver only mixed audio, \
                 per-speaker capture may be unavailable",
                display_name
            )),
        }
    }
}

/// Direction of the local media session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaDirection {
    ReceiveOnly,
}

/// Local media session requested at join time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSessionDescriptor {
    pub direction: MediaDirection,
    /// Request per-speaker sub-buffers instead of one combined buffer
    pub unmixed_audio: bool,
    pub format: AudioFormat,
}

impl MediaSessionDescriptor {
    /// Receive-only audio with unmixed delivery requested.
    ///
    /// Guest joins still ask for unmixed audio; whether it is delivered is
    /// up to the platform.
    pub fn receive_only_unmixed() -> Self {
        Self {
            direction: MediaDirection::ReceiveOnly,
            unmixed_audio: true,
            format: AudioFormat::PCM_16KHZ_MONO,
        }
    }
}
