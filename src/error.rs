//! Error types shared across the session, capture and notification layers.
//!
//! Join and leave errors reach the caller. Capture and notification errors are
//! logged and dropped at the unit of work that produced them.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the Call Platform Gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("unknown call: {0}")]
    UnknownCall(String),

    #[error("request rejected by platform: {0}")]
    Rejected(String),

    #[error("platform error: {0}")]
    Platform(String),
}

/// Failure to join a call
#[derive(Error, Debug)]
pub enum JoinError {
    #[error("invalid meeting reference: {0}")]
    InvalidMeetingReference(String),

    #[error("gateway rejected join: {0}")]
    Gateway(#[from] GatewayError),

    #[error("session registry is not initialized")]
    NotInitialized,
}

/// Failure to leave a call
#[derive(Error, Debug)]
pub enum LeaveError {
    #[error("failed to terminate call {call_id}: {source}")]
    Termination {
        call_id: String,
        #[source]
        source: GatewayError,
    },
}

/// Per-frame capture failures. Never propagated to the gateway callback.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("call {0} is not open for capture")]
    CallClosed(String),

    #[error("failed to create capture file {path:?}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Webhook delivery failure. Swallowed inside the notifier.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("consumer unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("consumer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl NotifyError {
    /// Network-level failures are the expected steady state when no consumer listens.
    pub fn is_network(&self) -> bool {
        matches!(self, NotifyError::Unreachable(_))
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            NotifyError::Unreachable(e)
        } else {
            NotifyError::Request(e)
        }
    }
}

/// Fatal startup failures (the process cannot run without these resources)
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("cannot create capture root {path:?}: {source}")]
    CaptureRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no async runtime available: {0}")]
    Runtime(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
