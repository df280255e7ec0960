use crate::audio::AudioFormat;

/// Callback that returns a frame's memory to the gateway's buffer pool
pub type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// One speaker's audio inside an unmixed frame
#[derive(Debug, Clone)]
pub struct UnmixedBuffer {
    /// Speaker identity assigned by the platform, if any
    pub speaker_id: Option<String>,
    /// Display name resolved by the platform, if any
    pub display_name: Option<String>,
    /// Raw PCM bytes (little-endian)
    pub data: Vec<u8>,
}

impl UnmixedBuffer {
    pub fn new(speaker_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            speaker_id: Some(speaker_id.into()),
            display_name: None,
            data,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Audio payload carried by a frame
#[derive(Debug, Clone, Default)]
pub struct FramePayload {
    /// Combined buffer of all speakers
    pub combined: Option<Vec<u8>>,
    /// Per-speaker sub-buffers, when unmixed delivery is active
    pub unmixed: Option<Vec<UnmixedBuffer>>,
}

/// An audio frame delivered by the gateway
///
/// The frame's memory belongs to the gateway until released. The release
/// hook runs exactly once: through [`AudioMediaFrame::release`], or on drop.
pub struct AudioMediaFrame {
    pub format: AudioFormat,
    /// Platform timestamp in milliseconds
    pub timestamp_ms: u64,
    pub is_silence: bool,
    payload: FramePayload,
    release: Option<ReleaseFn>,
}

impl AudioMediaFrame {
    pub fn new(format: AudioFormat, timestamp_ms: u64, payload: FramePayload) -> Self {
        Self {
            format,
            timestamp_ms,
            is_silence: false,
            payload,
            release: None,
        }
    }

    pub fn mixed(timestamp_ms: u64, data: Vec<u8>) -> Self {
        Self::new(
            AudioFormat::PCM_16KHZ_MONO,
            timestamp_ms,
            FramePayload {
                combined: Some(data),
                unmixed: None,
            },
        )
    }

    pub fn unmixed(timestamp_ms: u64, buffers: Vec<UnmixedBuffer>) -> Self {
        Self::new(
            AudioFormat::PCM_16KHZ_MONO,
            timestamp_ms,
            FramePayload {
                combined: None,
                unmixed: Some(buffers),
            },
        )
    }

    pub fn silent(mut self) -> Self {
        self.is_silence = true;
        self
    }

    /// Attach the gateway's release hook
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn payload(&self) -> &FramePayload {
        &self.payload
    }

    /// Move the payload out, leaving the frame empty
    pub fn take_payload(&mut self) -> FramePayload {
        std::mem::take(&mut self.payload)
    }

    /// Hand the frame's memory back to the gateway
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for AudioMediaFrame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for AudioMediaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMediaFrame")
            .field("format", &self.format)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("is_silence", &self.is_silence)
            .field("payload", &self.payload)
            .field("released", &self.release.is_none())
            .finish()
    }
}
