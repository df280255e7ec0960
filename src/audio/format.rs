use serde::{Deserialize, Serialize};

/// PCM sample layout of captured audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample (signed integer PCM)
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// The gateway's native format. Capture never resamples.
    pub const PCM_16KHZ_MONO: AudioFormat = AudioFormat {
        sample_rate: 16000,
        channels: 1,
        bits_per_sample: 16,
    };

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * (self.bits_per_sample as u64 / 8)
    }

    /// Playback duration of `bytes` of audio in this format
    pub fn duration_ms(&self, bytes: u64) -> u64 {
        match self.bytes_per_second() {
            0 => 0,
            bps => bytes * 1000 / bps,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::PCM_16KHZ_MONO
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}
