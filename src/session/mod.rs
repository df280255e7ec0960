//! Call session management
//!
//! This module provides the `SessionRegistry`, which:
//! - Joins calls through the Call Platform Gateway
//! - Wires a media router and its capture writers to each call
//! - Follows platform call-state notifications
//! - Finalizes capture and reports artifacts when a call ends

mod registry;
mod session;

pub use registry::SessionRegistry;
pub use session::{CallSession, SessionHandle, SessionState, SessionSummary};
