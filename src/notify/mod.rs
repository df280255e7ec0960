//! Best-effort event notification
//!
//! Events go to a downstream HTTP consumer: status-class events to one path,
//! capture-class events to another. Nothing upstream ever waits on delivery.

mod client;
mod events;
pub mod messages;

pub use client::{HttpNotifier, NotifierConfig};
pub use events::{EventKind, EventRoute, WebhookEvent};
pub use messages::{CaptureMessage, StatusMessage};

/// Destination for lifecycle and capture events
///
/// `notify` must return promptly and must not fail; delivery problems are
/// the sink's own business.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: WebhookEvent);
}
