use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::gateway::{IdentityMode, MeetingReference, PlatformCall};
use crate::media::MediaStreamRouter;

/// Lifecycle of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Joining,
    Active,
    Leaving,
    Terminated,
}

impl SessionState {
    /// Sessions in these states show up in `list_active`
    pub fn is_listed(&self) -> bool {
        matches!(self, SessionState::Joining | SessionState::Active)
    }
}

/// One joined call
pub struct CallSession {
    call_id: String,
    scenario_id: Uuid,
    meeting_reference: MeetingReference,
    identity: IdentityMode,
    joined_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    /// Set by whichever path (leave or platform removal) runs the finalize sequence
    finalizing: AtomicBool,
    router: Arc<MediaStreamRouter>,
    platform: Box<dyn PlatformCall>,
    state_task: Mutex<Option<JoinHandle<()>>>,
}

impl CallSession {
    pub(crate) fn new(
        call_id: String,
        scenario_id: Uuid,
        meeting_reference: MeetingReference,
        identity: IdentityMode,
        joined_at: DateTime<Utc>,
        router: Arc<MediaStreamRouter>,
        platform: Box<dyn PlatformCall>,
    ) -> Self {
        Self {
            call_id,
            scenario_id,
            meeting_reference,
            identity,
            joined_at,
            state: Mutex::new(SessionState::Joining),
            finalizing: AtomicBool::new(false),
            router,
            platform,
            state_task: Mutex::new(None),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn scenario_id(&self) -> Uuid {
        self.scenario_id
    }

    pub fn meeting_reference(&self) -> &MeetingReference {
        &self.meeting_reference
    }

    pub fn identity(&self) -> &IdentityMode {
        &self.identity
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn router(&self) -> &Arc<MediaStreamRouter> {
        &self.router
    }

    pub(crate) fn platform(&self) -> &dyn PlatformCall {
        self.platform.as_ref()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            call_id: self.call_id.clone(),
            scenario_id: self.scenario_id,
            meeting_reference: self.meeting_reference.to_string(),
            status: self.state(),
            joined_at: self.joined_at,
        }
    }

    /// Joining → Active. False if the session was not joining.
    pub(crate) fn mark_active(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == SessionState::Joining {
            *state = SessionState::Active;
            true
        } else {
            false
        }
    }

    /// Claim the finalize sequence and move to Leaving.
    ///
    /// Used by both explicit leave and platform removal. False if the other
    /// path already claimed it.
    pub(crate) fn begin_leaving(&self) -> bool {
        if !self.claim_finalize() {
            return false;
        }
        *lock(&self.state) = SessionState::Leaving;
        true
    }

    fn claim_finalize(&self) -> bool {
        self.finalizing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn mark_terminated(&self) {
        *lock(&self.state) = SessionState::Terminated;
    }

    pub(crate) fn set_state_task(&self, task: JoinHandle<()>) {
        *lock(&self.state_task) = Some(task);
    }

    pub(crate) fn abort_state_task(&self) {
        if let Some(task) = lock(&self.state_task).take() {
            task.abort();
        }
    }
}

/// Snapshot of a listed session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub call_id: String,
    pub scenario_id: Uuid,
    pub meeting_reference: String,
    pub status: SessionState,
    pub joined_at: DateTime<Utc>,
}

/// Result of a successful join
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub call_id: String,
    pub scenario_id: Uuid,
    pub status: SessionState,
    pub joined_at: DateTime<Utc>,
    /// Audio trade-off of the chosen identity, for the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
