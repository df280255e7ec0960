pub mod audio;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod media;
pub mod notify;
pub mod session;

pub use audio::{AudioFormat, AudioWriterPool, CaptureArtifact, WriterHandle, WriterPoolConfig};
pub use config::Config;
pub use error::{CaptureError, GatewayError, JoinError, LeaveError, NotifyError, StartupError};
pub use gateway::{
    AudioFrameSink, AudioMediaFrame, CallPlatformGateway, CallStateEvent, IdentityMode,
    MeetingReference, SimulatedGateway, UnmixedBuffer,
};
pub use http::{create_router, AppState};
pub use media::MediaStreamRouter;
pub use notify::{EventSink, HttpNotifier, NotifierConfig, WebhookEvent};
pub use session::{SessionHandle, SessionRegistry, SessionState, SessionSummary};
