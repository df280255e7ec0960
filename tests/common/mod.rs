// Shared helpers for integration tests

#![allow(dead_code)]

use anyhow::Result;
use loqa_callbot::audio::{AudioWriterPool, WriterPoolConfig};
use loqa_callbot::notify::{EventKind, EventSink, WebhookEvent};
use loqa_callbot::{SessionRegistry, SimulatedGateway};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Event sink that keeps everything it is given
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<WebhookEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<WebhookEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn left_events(&self) -> Vec<WebhookEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e.kind, EventKind::Left { .. }))
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&WebhookEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, event: WebhookEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Registry wired to a simulated gateway and a recording sink
pub struct Harness {
    pub dir: TempDir,
    pub pool: Arc<AudioWriterPool>,
    pub events: Arc<RecordingSink>,
    pub gateway: Arc<SimulatedGateway>,
    pub registry: SessionRegistry,
}

pub fn harness() -> Result<Harness> {
    harness_with(SimulatedGateway::new())
}

pub fn harness_with(gateway: SimulatedGateway) -> Result<Harness> {
    let dir = TempDir::new()?;
    let pool = Arc::new(AudioWriterPool::new(WriterPoolConfig::new(dir.path()))?);
    let events = Arc::new(RecordingSink::default());
    let gateway = Arc::new(gateway);

    let registry = SessionRegistry::new(pool.clone(), events.clone());
    registry.initialize(gateway.clone());

    Ok(Harness {
        dir,
        pool,
        events,
        gateway,
        registry,
    })
}

/// 16-bit little-endian PCM bytes
pub fn pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Read back a capture file
pub fn read_wav(path: &Path) -> Result<(hound::WavSpec, Vec<i16>)> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    Ok((spec, samples))
}

pub fn wav_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "wav"))
        .collect();
    files.sort();
    Ok(files)
}

/// Poll `condition` every 10ms until it holds or `timeout_ms` passes
pub async fn wait_until(timeout_ms: u64, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
