// In-process Call Platform Gateway
//
// Used by the binary when no real platform is wired in, and by tests to drive
// frames, state changes and platform-initiated removal deterministically.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{
    AudioFrameSink, AudioMediaFrame, CallPlatformGateway, CallRequest, CallStateEvent,
    EstablishedCall, PlatformCall, UnmixedBuffer,
};
use crate::error::GatewayError;

/// Synthetic per-speaker tones for demo runs
#[derive(Debug, Clone)]
pub struct ToneConfig {
    pub speakers: Vec<String>,
    pub frame_ms: u64,
}

struct SimulatedCall {
    call_id: String,
    sink: Mutex<Option<Arc<dyn AudioFrameSink>>>,
    state_tx: mpsc::UnboundedSender<CallStateEvent>,
    terminated: AtomicBool,
}

impl SimulatedCall {
    fn sink(&self) -> Option<Arc<dyn AudioFrameSink>> {
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Gateway double that keeps every call in memory
pub struct SimulatedGateway {
    calls: Arc<DashMap<String, Arc<SimulatedCall>>>,
    /// Frames handed to a sink and not yet released
    outstanding: Arc<AtomicU64>,
    requests: Mutex<Vec<CallRequest>>,
    reject_next: Mutex<Option<String>>,
    auto_establish: bool,
    tone: Option<ToneConfig>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
            outstanding: Arc::new(AtomicU64::new(0)),
            requests: Mutex::new(Vec::new()),
            reject_next: Mutex::new(None),
            auto_establish: true,
            tone: None,
        }
    }

    /// Generate a tone per speaker every `frame_ms` while a call is up
    pub fn with_tone(mut self, speakers: Vec<String>, frame_ms: u64) -> Self {
        if !speakers.is_empty() {
            self.tone = Some(ToneConfig {
                speakers,
                frame_ms: frame_ms.max(1),
            });
        }
        self
    }

    /// Do not confirm calls automatically; tests push `Established` themselves
    pub fn manual_establish(mut self) -> Self {
        self.auto_establish = false;
        self
    }

    /// Fail the next `establish_call` with `Rejected(reason)`
    pub fn reject_next_join(&self, reason: impl Into<String>) {
        *self
            .reject_next
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(reason.into());
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CallRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn active_calls(&self) -> Vec<String> {
        self.calls.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn outstanding_frames(&self) -> u64 {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Deliver a frame to the call's sink on the calling thread
    ///
    /// Returns false if the call is unknown or has no sink attached.
    pub fn deliver(&self, call_id: &str, frame: AudioMediaFrame) -> bool {
        let Some(call) = self.calls.get(call_id).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };
        deliver_to(&call, frame, &self.outstanding)
    }

    /// Push a state notification for a call
    pub fn push_state(&self, call_id: &str, event: CallStateEvent) -> bool {
        match self.calls.get(call_id) {
            Some(call) => call.state_tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Platform-initiated removal of a call
    pub fn remove_call(&self, call_id: &str, reason: impl Into<String>) -> bool {
        let Some((_, call)) = self.calls.remove(call_id) else {
            return false;
        };
        call.terminated.store(true, Ordering::SeqCst);
        let _ = call.state_tx.send(CallStateEvent::Removed {
            reason: Some(reason.into()),
        });
        true
    }

    fn spawn_tone(&self, call: Arc<SimulatedCall>, tone: ToneConfig) {
        let outstanding = Arc::clone(&self.outstanding);

        tokio::spawn(async move {
            let samples_per_frame = (16_000 * tone.frame_ms / 1000) as usize;
            let mut interval = tokio::time::interval(Duration::from_millis(tone.frame_ms));
            let mut position = 0usize;

            while !call.terminated.load(Ordering::SeqCst) {
                interval.tick().await;

                let buffers = tone
                    .speakers
                    .iter()
                    .enumerate()
                    .map(|(i, speaker)| {
                        let frequency = 220.0 * (i + 1) as f32;
                        UnmixedBuffer::new(
                            speaker.clone(),
                            sine_pcm(frequency, position, samples_per_frame),
                        )
                    })
                    .collect();
                position += samples_per_frame;

                let frame = AudioMediaFrame::unmixed(position as u64 * 1000 / 16_000, buffers);
                deliver_to(&call, frame, &outstanding);
            }

            debug!("Tone generator stopped for call {}", call.call_id);
        });
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CallPlatformGateway for SimulatedGateway {
    async fn establish_call(&self, request: CallRequest) -> Result<EstablishedCall, GatewayError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let rejection = self
            .reject_next
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reason) = rejection {
            return Err(GatewayError::Rejected(reason));
        }

        let call_id = uuid::Uuid::new_v4().to_string();
        let (state_tx, state_events) = mpsc::unbounded_channel();

        let call = Arc::new(SimulatedCall {
            call_id: call_id.clone(),
            sink: Mutex::new(None),
            state_tx,
            terminated: AtomicBool::new(false),
        });
        self.calls.insert(call_id.clone(), Arc::clone(&call));

        if self.auto_establish {
            let _ = call.state_tx.send(CallStateEvent::Established);
        }

        if let Some(tone) = self.tone.clone() {
            self.spawn_tone(Arc::clone(&call), tone);
        }

        info!(
            "Simulated call {} established for {} (scenario {})",
            call_id, request.meeting, request.scenario_id
        );

        Ok(EstablishedCall {
            call_id,
            call: Box::new(SimulatedCallHandle {
                call,
                calls: Arc::clone(&self.calls),
            }),
            state_events,
        })
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

struct SimulatedCallHandle {
    call: Arc<SimulatedCall>,
    calls: Arc<DashMap<String, Arc<SimulatedCall>>>,
}

#[async_trait::async_trait]
impl PlatformCall for SimulatedCallHandle {
    fn attach_audio_sink(&self, sink: Arc<dyn AudioFrameSink>) {
        *self
            .call
            .sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sink);
    }

    async fn terminate(&self) -> Result<(), GatewayError> {
        if self.calls.remove(&self.call.call_id).is_none() {
            return Err(GatewayError::UnknownCall(self.call.call_id.clone()));
        }

        self.call.terminated.store(true, Ordering::SeqCst);
        let _ = self.call.state_tx.send(CallStateEvent::Removed {
            reason: Some("terminated by request".to_string()),
        });

        Ok(())
    }
}

fn deliver_to(call: &SimulatedCall, frame: AudioMediaFrame, outstanding: &Arc<AtomicU64>) -> bool {
    let Some(sink) = call.sink() else {
        return false;
    };

    outstanding.fetch_add(1, Ordering::SeqCst);
    let counter = Arc::clone(outstanding);
    let frame = frame.on_release(move || {
        counter.fetch_sub(1, Ordering::SeqCst);
    });

    sink.on_audio_frame(frame);
    true
}

fn sine_pcm(frequency: f32, start: usize, count: usize) -> Vec<u8> {
    (start..start + count)
        .flat_map(|n| {
            let t = n as f32 / 16_000.0;
            let sample = (t * frequency * std::f32::consts::TAU).sin() * 3000.0;
            (sample as i16).to_le_bytes()
        })
        .collect()
}
