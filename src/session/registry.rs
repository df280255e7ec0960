use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::session::{CallSession, SessionHandle, SessionSummary};
use crate::audio::{AudioWriterPool, CaptureArtifact};
use crate::error::{GatewayError, JoinError, LeaveError};
use crate::gateway::{
    CallPlatformGateway, CallRequest, CallStateEvent, EstablishedCall, IdentityMode,
    MediaSessionDescriptor, MeetingReference,
};
use crate::media::MediaStreamRouter;
use crate::notify::{EventSink, WebhookEvent};

/// Registry of active call sessions
///
/// Cheap to clone; all clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    gateway: OnceLock<Arc<dyn CallPlatformGateway>>,
    pool: Arc<AudioWriterPool>,
    events: Arc<dyn EventSink>,
    sessions: DashMap<String, Arc<CallSession>>,
}

impl SessionRegistry {
    pub fn new(pool: Arc<AudioWriterPool>, events: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                gateway: OnceLock::new(),
                pool,
                events,
                sessions: DashMap::new(),
            }),
        }
    }

    /// Attach the gateway. Joins fail with `NotInitialized` until this is called.
    pub fn initialize(&self, gateway: Arc<dyn CallPlatformGateway>) -> bool {
        let name = gateway.name().to_string();
        let attached = self.inner.gateway.set(gateway).is_ok();
        if attached {
            info!("Session registry initialized with {} gateway", name);
        } else {
            warn!("Session registry already initialized, ignoring {} gateway", name);
        }
        attached
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.gateway.get().is_some()
    }

    pub fn pool(&self) -> &Arc<AudioWriterPool> {
        &self.inner.pool
    }

    /// Join a call and start capturing its audio
    pub async fn join(
        &self,
        meeting_reference: &str,
        identity: IdentityMode,
    ) -> Result<SessionHandle, JoinError> {
        let gateway = self
            .inner
            .gateway
            .get()
            .cloned()
            .ok_or(JoinError::NotInitialized)?;
        let meeting = MeetingReference::parse(meeting_reference)?;
        let scenario_id = Uuid::new_v4();
        let joined_at = Utc::now();

        let warning = identity.audio_warning();
        if let Some(warning) = &warning {
            warn!("{}", warning);
        }

        info!("Joining {} (scenario {})", meeting, scenario_id);

        let request = CallRequest {
            meeting: meeting.clone(),
            media: MediaSessionDescriptor::receive_only_unmixed(),
            identity: identity.clone(),
            scenario_id,
        };

        let EstablishedCall {
            call_id,
            call,
            state_events,
        } = gateway.establish_call(request).await.map_err(|e| {
            error!("Gateway rejected join for {}: {}", meeting, e);
            e
        })?;

        if self.inner.sessions.contains_key(&call_id) {
            error!("Gateway returned call id {} that is already registered", call_id);
            if let Err(e) = call.terminate().await {
                warn!("Failed to terminate duplicate call {}: {}", call_id, e);
            }
            return Err(JoinError::Gateway(GatewayError::Platform(format!(
                "duplicate call id {}",
                call_id
            ))));
        }

        self.inner.pool.open_call(&call_id);
        let router = Arc::new(MediaStreamRouter::new(
            call_id.clone(),
            Arc::clone(&self.inner.pool),
            Arc::clone(&self.inner.events),
        ));
        call.attach_audio_sink(router.clone());

        let session = Arc::new(CallSession::new(
            call_id.clone(),
            scenario_id,
            meeting,
            identity,
            joined_at,
            router,
            call,
        ));
        self.inner
            .sessions
            .insert(call_id.clone(), Arc::clone(&session));

        let task = tokio::spawn(watch_call_state(
            Arc::downgrade(&self.inner),
            call_id.clone(),
            state_events,
        ));
        session.set_state_task(task);

        self.inner.events.notify(WebhookEvent::joined(
            &call_id,
            format!("Joined {}", session.meeting_reference()),
        ));

        info!("Session {} registered (scenario {})", call_id, scenario_id);

        Ok(SessionHandle {
            call_id,
            scenario_id,
            status: session.state(),
            joined_at,
            warning,
        })
    }

    /// Leave a call. `Ok(false)` if the call is unknown or already finishing.
    pub async fn leave(&self, call_id: &str) -> Result<bool, LeaveError> {
        Ok(self.leave_and_collect(call_id).await?.is_some())
    }

    /// Leave a call and return the files it produced
    pub async fn leave_and_collect(
        &self,
        call_id: &str,
    ) -> Result<Option<Vec<CaptureArtifact>>, LeaveError> {
        let Some(session) = self.session(call_id) else {
            debug!("Leave for unknown call {}", call_id);
            return Ok(None);
        };

        if !session.begin_leaving() {
            debug!("Call {} is already being finalized", call_id);
            return Ok(None);
        }

        info!("Leaving call {}", call_id);

        let termination_error = match session.platform().terminate().await {
            Ok(()) => None,
            Err(GatewayError::UnknownCall(_)) => {
                debug!("Platform no longer knows call {}", call_id);
                None
            }
            Err(e) => {
                error!("Failed to terminate call {}: {}", call_id, e);
                self.inner.events.notify(WebhookEvent::error(
                    call_id,
                    format!("Failed to terminate call: {}", e),
                ));
                Some(e)
            }
        };

        let artifacts = self.inner.finalize_session(&session, "Left call").await;
        session.abort_state_task();

        match termination_error {
            Some(source) => Err(LeaveError::Termination {
                call_id: call_id.to_string(),
                source,
            }),
            None => Ok(Some(artifacts)),
        }
    }

    /// Leave every listed session (shutdown path)
    pub async fn leave_all(&self) -> usize {
        let call_ids: Vec<String> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let results = futures::future::join_all(call_ids.iter().map(|id| self.leave(id))).await;

        results
            .into_iter()
            .zip(&call_ids)
            .filter(|(result, call_id)| match result {
                Ok(left) => *left,
                Err(e) => {
                    warn!("Leaving {} during shutdown: {}", call_id, e);
                    true
                }
            })
            .count()
    }

    /// Snapshot of every joining or active session, oldest first
    pub fn list_active(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.value().summary())
            .filter(|summary| summary.status.is_listed())
            .collect();
        sessions.sort_by_key(|summary| summary.joined_at);
        sessions
    }

    pub fn session(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.inner
            .sessions
            .get(call_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// React to a call-state notification from the gateway
    ///
    /// Returns true once the session is gone and no further events matter.
    pub async fn handle_call_state(&self, call_id: &str, event: CallStateEvent) -> bool {
        self.inner.handle_call_state(call_id, event).await
    }
}

impl RegistryInner {
    async fn handle_call_state(&self, call_id: &str, event: CallStateEvent) -> bool {
        let Some(session) = self
            .sessions
            .get(call_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            debug!("State event {:?} for unknown call {}", event, call_id);
            return true;
        };

        match event {
            CallStateEvent::Established => {
                if session.mark_active() {
                    info!("Call {} is active", call_id);
                    self.events
                        .notify(WebhookEvent::status_changed(call_id, "established"));
                }
                false
            }
            CallStateEvent::StateChanged(state) => {
                info!("Call {} state changed: {}", call_id, state);
                self.events.notify(WebhookEvent::status_changed(call_id, state));
                false
            }
            CallStateEvent::Removed { reason } => {
                if session.begin_leaving() {
                    let reason = reason.unwrap_or_else(|| "no reason given".to_string());
                    info!("Call {} removed by platform: {}", call_id, reason);
                    self.finalize_session(&session, &format!("Removed by platform: {}", reason))
                        .await;
                }
                true
            }
        }
    }

    /// Flush the session's writers, drop the record and report the artifacts
    async fn finalize_session(&self, session: &CallSession, message: &str) -> Vec<CaptureArtifact> {
        let call_id = session.call_id();
        let artifacts = session.router().finalize().await;

        session.mark_terminated();
        self.sessions.remove(call_id);

        let files = artifacts
            .iter()
            .map(|artifact| artifact.file_path.clone())
            .collect();
        self.events.notify(WebhookEvent::left(
            call_id,
            format!("{} ({} audio file(s))", message, artifacts.len()),
            files,
        ));

        info!(
            "Session {} terminated with {} capture file(s)",
            call_id,
            artifacts.len()
        );

        artifacts
    }
}

async fn watch_call_state(
    registry: Weak<RegistryInner>,
    call_id: String,
    mut state_events: mpsc::UnboundedReceiver<CallStateEvent>,
) {
    while let Some(event) = state_events.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        if registry.handle_call_state(&call_id, event).await {
            break;
        }
    }

    debug!("State watcher for call {} stopped", call_id);
}
