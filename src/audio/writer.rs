use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::format::AudioFormat;
use super::naming;
use crate::error::{CaptureError, StartupError};

/// Attempts at finding a free file name before giving up
const MAX_NAME_ATTEMPTS: usize = 100;

/// Writer pool configuration
#[derive(Debug, Clone)]
pub struct WriterPoolConfig {
    /// Directory all capture files are written under
    pub capture_root: PathBuf,
    /// Queued frames per source above which a backlog warning is logged.
    /// Frames are never dropped for backlog.
    pub backlog_warning: usize,
    /// Sample format of every capture file
    pub format: AudioFormat,
}

impl WriterPoolConfig {
    pub fn new(capture_root: impl Into<PathBuf>) -> Self {
        Self {
            capture_root: capture_root.into(),
            backlog_warning: 1024,
            format: AudioFormat::PCM_16KHZ_MONO,
        }
    }
}

/// A finished capture file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureArtifact {
    pub call_id: String,
    pub source_id: String,
    pub display_label: String,
    pub file_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub bytes_written: u64,
    pub duration_ms: u64,
}

/// Shared handle to the writer of one (call, source) pair
#[derive(Clone)]
pub struct WriterHandle {
    inner: Arc<SourceWriter>,
}

struct SourceWriter {
    call_id: String,
    source_id: String,
    display_label: String,
    file_path: PathBuf,
    started_at: DateTime<Utc>,
    format: AudioFormat,
    bytes_written: Arc<AtomicU64>,
    /// Frames queued and not yet written
    pending: Arc<AtomicUsize>,
    backlog_warning: usize,
    /// `None` once the writer has been closed; late frames are dropped
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WriterHandle {
    pub fn call_id(&self) -> &str {
        &self.inner.call_id
    }

    pub fn source_id(&self) -> &str {
        &self.inner.source_id
    }

    pub fn display_label(&self) -> &str {
        &self.inner.display_label
    }

    pub fn file_path(&self) -> &Path {
        &self.inner.file_path
    }

    /// Audio bytes flushed to the file so far
    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.tx).is_none()
    }

    /// Frames queued and not yet written to the file
    pub fn pending_frames(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Queue a payload. Returns false if the writer is already closed.
    fn enqueue(&self, payload: Vec<u8>) -> bool {
        let tx = lock(&self.inner.tx);
        let Some(tx) = tx.as_ref() else {
            return false;
        };

        let queued = self.inner.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if tx.send(payload).is_err() {
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }

        if queued == self.inner.backlog_warning {
            warn!(
                "Writer for {} is {} frames behind ({})",
                self.inner.source_id,
                queued,
                self.inner.file_path.display()
            );
        }

        true
    }

    /// Stop accepting frames, drain the queue and finalize the WAV header
    async fn close(&self) -> CaptureArtifact {
        // Dropping the only sender ends the writer task once the queue is drained
        drop(lock(&self.inner.tx).take());

        let task = lock(&self.inner.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(
                    "Writer task for {} panicked: {}",
                    self.inner.file_path.display(),
                    e
                );
            }
        }

        self.artifact()
    }

    fn artifact(&self) -> CaptureArtifact {
        let bytes_written = self.bytes_written();
        CaptureArtifact {
            call_id: self.inner.call_id.clone(),
            source_id: self.inner.source_id.clone(),
            display_label: self.inner.display_label.clone(),
            file_path: self.inner.file_path.clone(),
            started_at: self.inner.started_at,
            bytes_written,
            duration_ms: self.inner.format.duration_ms(bytes_written),
        }
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("call_id", &self.inner.call_id)
            .field("source_id", &self.inner.source_id)
            .field("file_path", &self.inner.file_path)
            .finish()
    }
}

#[derive(Default)]
struct CallWriters {
    /// Set by `finalize`; no writer is created afterwards
    closed: bool,
    sources: HashMap<String, WriterHandle>,
}

/// Pool of per-source WAV writers, keyed by call and then by source
///
/// Each writer is a single consumer on the blocking pool fed by an unbounded
/// queue, so frames for one source reach the file in the order they were
/// queued while different sources write independently. Disk I/O never runs
/// on the async workers or on the gateway's callback thread.
pub struct AudioWriterPool {
    config: WriterPoolConfig,
    runtime: Handle,
    calls: DashMap<String, Arc<Mutex<CallWriters>>>,
}

impl AudioWriterPool {
    /// Create the pool and its capture root. Must be called inside a tokio runtime.
    pub fn new(config: WriterPoolConfig) -> Result<Self, StartupError> {
        fs::create_dir_all(&config.capture_root).map_err(|source| StartupError::CaptureRoot {
            path: config.capture_root.clone(),
            source,
        })?;

        let runtime = Handle::try_current().map_err(|e| StartupError::Runtime(e.to_string()))?;

        info!(
            "Audio writer pool initialized: {} ({}, backlog warning at {} frames)",
            config.capture_root.display(),
            config.format,
            config.backlog_warning
        );

        Ok(Self {
            config,
            runtime,
            calls: DashMap::new(),
        })
    }

    pub fn capture_root(&self) -> &Path {
        &self.config.capture_root
    }

    pub fn format(&self) -> AudioFormat {
        self.config.format
    }

    /// Allow writers to be created for `call_id`. Returns false if already open.
    pub fn open_call(&self, call_id: &str) -> bool {
        let mut opened = false;
        self.calls.entry(call_id.to_string()).or_insert_with(|| {
            opened = true;
            Arc::new(Mutex::new(CallWriters::default()))
        });
        opened
    }

    pub fn is_open(&self, call_id: &str) -> bool {
        self.calls.contains_key(call_id)
    }

    /// Number of live writers for a call
    pub fn writer_count(&self, call_id: &str) -> usize {
        match self.call(call_id) {
            Some(call) => {
                let call = lock(&call);
                call.sources.len()
            }
            None => 0,
        }
    }

    /// Existing writer for (call, source), or a new one with a freshly created file
    ///
    /// Creation happens under the call's own lock, so concurrent first frames
    /// for the same source produce exactly one writer without holding up
    /// other calls.
    pub fn get_or_create_writer(
        &self,
        call_id: &str,
        source_id: &str,
        display_label: &str,
    ) -> Result<WriterHandle, CaptureError> {
        let call = self
            .call(call_id)
            .ok_or_else(|| CaptureError::CallClosed(call_id.to_string()))?;
        let mut call = lock(&call);

        if call.closed {
            return Err(CaptureError::CallClosed(call_id.to_string()));
        }
        if let Some(handle) = call.sources.get(source_id) {
            return Ok(handle.clone());
        }

        let handle = self.spawn_writer(call_id, source_id, display_label)?;
        call.sources.insert(source_id.to_string(), handle.clone());

        Ok(handle)
    }

    /// Queue `payload` for the handle's file
    ///
    /// Never blocks. Returns false when the writer has already been finalized;
    /// such frames are dropped.
    pub fn write(&self, handle: &WriterHandle, payload: Vec<u8>) -> bool {
        handle.enqueue(payload)
    }

    /// Flush and close every writer of `call_id` and forget the call
    ///
    /// Waits for queued frames to be written. Unknown or already finalized
    /// calls yield an empty list.
    pub async fn finalize(&self, call_id: &str) -> Vec<CaptureArtifact> {
        let Some((_, call)) = self.calls.remove(call_id) else {
            debug!("Finalize for {}: no writers", call_id);
            return Vec::new();
        };

        let sources = {
            let mut call = lock(&call);
            call.closed = true;
            std::mem::take(&mut call.sources)
        };

        let mut artifacts = Vec::with_capacity(sources.len());
        for handle in sources.values() {
            artifacts.push(handle.close().await);
        }
        artifacts.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        info!(
            "Finalized {} capture file(s) for call {}",
            artifacts.len(),
            call_id
        );

        artifacts
    }

    /// All WAV files currently under the capture root, sorted by name
    pub fn captured_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.config.capture_root)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "wav") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn call(&self, call_id: &str) -> Option<Arc<Mutex<CallWriters>>> {
        self.calls.get(call_id).map(|entry| Arc::clone(entry.value()))
    }

    fn spawn_writer(
        &self,
        call_id: &str,
        source_id: &str,
        display_label: &str,
    ) -> Result<WriterHandle, CaptureError> {
        let started_at = Utc::now();
        let base_name = naming::capture_file_name(started_at, call_id, source_id, display_label);
        let (file_path, file) = self.create_capture_file(&base_name)?;

        let writer = hound::WavWriter::new(BufWriter::new(file), self.config.format.wav_spec())?;

        let (tx, rx) = mpsc::unbounded_channel();
        let bytes_written = Arc::new(AtomicU64::new(0));
        let pending = Arc::new(AtomicUsize::new(0));

        let task = {
            let bytes_written = Arc::clone(&bytes_written);
            let pending = Arc::clone(&pending);
            let file_path = file_path.clone();
            self.runtime
                .spawn_blocking(move || run_writer(writer, rx, bytes_written, pending, file_path))
        };

        info!(
            "Capture started: call={} source={} file={}",
            call_id,
            source_id,
            file_path.display()
        );

        Ok(WriterHandle {
            inner: Arc::new(SourceWriter {
                call_id: call_id.to_string(),
                source_id: source_id.to_string(),
                display_label: display_label.to_string(),
                file_path,
                started_at,
                format: self.config.format,
                bytes_written,
                pending,
                backlog_warning: self.config.backlog_warning.max(1),
                tx: Mutex::new(Some(tx)),
                task: Mutex::new(Some(task)),
            }),
        })
    }

    fn create_capture_file(&self, base_name: &str) -> Result<(PathBuf, File), CaptureError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = match attempt {
                0 => base_name.to_string(),
                n => naming::with_suffix(base_name, n),
            };
            let path = self.config.capture_root.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(CaptureError::CreateFile { path, source }),
            }
        }

        Err(CaptureError::CreateFile {
            path: self.config.capture_root.join(base_name),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"),
        })
    }
}

/// Drains one source's queue into its WAV file, then finalizes the header.
/// Runs on the blocking pool.
fn run_writer<W: Write + Seek>(
    mut writer: hound::WavWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    bytes_written: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
    file_path: PathBuf,
) {
    let mut carry = None;
    let mut failures = 0u64;

    while let Some(payload) = rx.blocking_recv() {
        let result = write_pcm(&mut writer, &mut carry, &payload);
        pending.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(written) => {
                bytes_written.fetch_add(written, Ordering::Relaxed);
            }
            Err(e) => {
                failures += 1;
                if failures == 1 {
                    warn!("Failed to write frame to {}: {}", file_path.display(), e);
                } else {
                    debug!("Failed to write frame to {}: {}", file_path.display(), e);
                }
            }
        }
    }

    if carry.is_some() {
        debug!("Dropping unpaired trailing byte for {}", file_path.display());
    }

    if let Err(e) = writer.finalize() {
        error!("Failed to finalize WAV file {}: {}", file_path.display(), e);
    }
}

/// Write little-endian 16-bit PCM bytes, carrying an odd byte into the next call
fn write_pcm<W: Write + Seek>(
    writer: &mut hound::WavWriter<W>,
    carry: &mut Option<u8>,
    payload: &[u8],
) -> Result<u64, hound::Error> {
    let mut bytes = payload;
    let mut written = 0u64;

    if let Some(low) = carry.take() {
        match bytes.split_first() {
            Some((&high, rest)) => {
                writer.write_sample(i16::from_le_bytes([low, high]))?;
                written += 2;
                bytes = rest;
            }
            None => {
                *carry = Some(low);
                return Ok(0);
            }
        }
    }

    let mut pairs = bytes.chunks_exact(2);
    for pair in &mut pairs {
        writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        written += 2;
    }
    if let [last] = pairs.remainder() {
        *carry = Some(*last);
    }

    Ok(written)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
