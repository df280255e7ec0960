use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::WriterPoolConfig;
use crate::notify::NotifierConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub notifier: NotifierSettings,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-callbot".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9441,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture root directory
    pub root: String,
    /// Queued frames per source before a backlog warning is logged
    pub backlog_warning: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            root: "recordings".to_string(),
            backlog_warning: 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    /// Consumer base URL, e.g. "http://localhost:8001". Unset disables webhooks.
    pub base_url: Option<String>,
    pub status_path: String,
    pub capture_path: String,
    pub timeout_ms: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        let defaults = NotifierConfig::default();
        Self {
            base_url: defaults.base_url,
            status_path: defaults.status_path,
            capture_path: defaults.capture_path,
            timeout_ms: defaults.timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Speakers the simulated gateway generates audio for
    pub simulated_speakers: Vec<String>,
    pub frame_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            simulated_speakers: Vec::new(),
            frame_ms: 20,
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate knows, optional) overlaid
    /// with `LOQA_CALLBOT__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LOQA_CALLBOT").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn writer_pool(&self) -> WriterPoolConfig {
        WriterPoolConfig {
            backlog_warning: self.capture.backlog_warning,
            ..WriterPoolConfig::new(PathBuf::from(&self.capture.root))
        }
    }

    pub fn notifier(&self) -> NotifierConfig {
        NotifierConfig {
            base_url: self
                .notifier
                .base_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
            status_path: self.notifier.status_path.clone(),
            capture_path: self.notifier.capture_path.clone(),
            timeout: Duration::from_millis(self.notifier.timeout_ms),
        }
    }
}
