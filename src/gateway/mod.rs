//! Boundary to the Call Platform Gateway
//!
//! The gateway establishes calls, delivers audio frames through a synchronous
//! callback that may run on any thread, pushes call-state changes, and
//! terminates calls on request. Everything platform-specific lives behind
//! these traits.

mod frame;
mod meeting;
pub mod simulated;

pub use frame::{AudioMediaFrame, FramePayload, ReleaseFn, UnmixedBuffer};
pub use meeting::{IdentityMode, MediaDirection, MediaSessionDescriptor, MeetingReference};
pub use simulated::SimulatedGateway;

use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::GatewayError;

/// Everything the gateway needs to place a call
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub meeting: MeetingReference,
    pub media: MediaSessionDescriptor,
    pub identity: IdentityMode,
    /// Correlation id for platform diagnostics
    pub scenario_id: Uuid,
}

/// Call-state notification pushed by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStateEvent {
    /// The platform confirmed the call
    Established,
    /// Any other platform state change, by platform state name
    StateChanged(String),
    /// The platform removed the call
    Removed { reason: Option<String> },
}

/// A call accepted by the gateway
pub struct EstablishedCall {
    /// Platform-assigned call id
    pub call_id: String,
    pub call: Box<dyn PlatformCall>,
    pub state_events: mpsc::UnboundedReceiver<CallStateEvent>,
}

/// Receives audio frames for one call
///
/// Called synchronously from gateway threads. Implementations must not block
/// for long and must never panic back into the gateway.
pub trait AudioFrameSink: Send + Sync {
    fn on_audio_frame(&self, frame: AudioMediaFrame);
}

/// Platform handle to an established call
#[async_trait::async_trait]
pub trait PlatformCall: Send + Sync {
    /// Start delivering audio frames to `sink`
    fn attach_audio_sink(&self, sink: Arc<dyn AudioFrameSink>);

    /// Ask the platform to hang up. `GatewayError::UnknownCall` means it is already gone.
    async fn terminate(&self) -> Result<(), GatewayError>;
}

/// Call Platform Gateway
#[async_trait::async_trait]
pub trait CallPlatformGateway: Send + Sync {
    async fn establish_call(&self, request: CallRequest) -> Result<EstablishedCall, GatewayError>;

    /// Gateway name for logging
    fn name(&self) -> &str;
}
