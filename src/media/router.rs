use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::audio::{AudioWriterPool, CaptureArtifact, MIXED_SOURCE_ID, UNKNOWN_LABEL};
use crate::error::CaptureError;
use crate::gateway::{AudioFrameSink, AudioMediaFrame, FramePayload};
use crate::notify::{EventSink, WebhookEvent};

/// Frame counters for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub buffers_routed: u64,
}

/// Routes one call's audio frames to per-source writers
///
/// Unmixed frames are split by speaker; combined frames go to the "mixed"
/// source. Silence is written like any other audio.
pub struct MediaStreamRouter {
    call_id: String,
    pool: Arc<AudioWriterPool>,
    events: Arc<dyn EventSink>,
    closed: AtomicBool,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    buffers_routed: AtomicU64,
    /// Sources whose writer could not be created (reported once)
    failed_sources: Mutex<HashSet<String>>,
}

impl MediaStreamRouter {
    pub fn new(call_id: impl Into<String>, pool: Arc<AudioWriterPool>, events: Arc<dyn EventSink>) -> Self {
        Self {
            call_id: call_id.into(),
            pool,
            events,
            closed: AtomicBool::new(false),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            buffers_routed: AtomicU64::new(0),
            failed_sources: Mutex::new(HashSet::new()),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            buffers_routed: self.buffers_routed.load(Ordering::Relaxed),
        }
    }

    /// Stop routing, flush every writer of the call and report the captured files
    pub async fn finalize(&self) -> Vec<CaptureArtifact> {
        self.closed.store(true, Ordering::SeqCst);

        let artifacts = self.pool.finalize(&self.call_id).await;
        for artifact in &artifacts {
            self.events.notify(WebhookEvent::audio_captured(artifact));
        }

        let stats = self.stats();
        info!(
            "Router for call {} finalized: {} frames received, {} dropped, {} file(s)",
            self.call_id,
            stats.frames_received,
            stats.frames_dropped,
            artifacts.len()
        );

        artifacts
    }

    fn route_frame(&self, mut frame: AudioMediaFrame) -> Result<(), CaptureError> {
        let format = frame.format;
        let is_silence = frame.is_silence;
        let payload = frame.take_payload();
        // Payload is ours now; the gateway gets its buffer back before any writes
        frame.release();

        if format != self.pool.format() {
            return Err(CaptureError::UnsupportedFormat(format.to_string()));
        }

        if self.is_closed() {
            debug!("Call {} finalized, dropping late frame", self.call_id);
            return Ok(());
        }

        if is_silence {
            debug!("Routing silent frame for call {}", self.call_id);
        }

        match payload {
            FramePayload {
                unmixed: Some(buffers),
                ..
            } if !buffers.is_empty() => {
                // One failing speaker must not cost the others their audio
                let mut first_error = None;
                for buffer in buffers {
                    let source_id = buffer
                        .speaker_id
                        .filter(|id| !id.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
                    let label = buffer.display_name.unwrap_or_else(|| source_id.clone());

                    if let Err(e) = self.forward(&source_id, &label, buffer.data) {
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
            FramePayload {
                combined: Some(data),
                ..
            } => self.forward(MIXED_SOURCE_ID, MIXED_SOURCE_ID, data),
            _ => Err(CaptureError::MalformedFrame(
                "frame carries neither unmixed nor combined audio".to_string(),
            )),
        }
    }

    fn forward(&self, source_id: &str, label: &str, data: Vec<u8>) -> Result<(), CaptureError> {
        let writer = match self.pool.get_or_create_writer(&self.call_id, source_id, label) {
            Ok(writer) => writer,
            Err(CaptureError::CallClosed(_)) => {
                debug!("Call {} closed, dropping audio for {}", self.call_id, source_id);
                return Ok(());
            }
            Err(e) => {
                self.report_writer_failure(source_id, &e);
                return Err(e);
            }
        };

        if self.pool.write(&writer, data) {
            self.buffers_routed.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("Writer for {} closed, dropping audio", source_id);
        }

        Ok(())
    }

    fn report_writer_failure(&self, source_id: &str, error: &CaptureError) {
        let first = self
            .failed_sources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(source_id.to_string());

        if first {
            self.events.notify(WebhookEvent::error(
                &self.call_id,
                format!("Cannot capture audio for {}: {}", source_id, error),
            ));
        }
    }
}

impl AudioFrameSink for MediaStreamRouter {
    fn on_audio_frame(&self, frame: AudioMediaFrame) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.route_frame(frame) {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Dropping frame for call {}: {}", self.call_id, e);
        }
    }
}
