use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::events::{EventRoute, WebhookEvent};
use super::EventSink;
use crate::error::{NotifyError, StartupError};

/// Downstream consumer endpoints
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Consumer base URL. `None` disables delivery.
    pub base_url: Option<String>,
    pub status_path: String,
    pub capture_path: String,
    /// Upper bound on a single delivery attempt
    pub timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            status_path: "/api/arty/status".to_string(),
            capture_path: "/api/arty/transcription".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Fire-and-forget webhook delivery over HTTP
///
/// Each event gets exactly one POST on a background task. Failures are
/// logged and the event is dropped.
pub struct HttpNotifier {
    client: reqwest::Client,
    config: NotifierConfig,
    runtime: Handle,
}

impl HttpNotifier {
    /// Must be called inside a tokio runtime; deliveries are spawned onto it.
    pub fn new(config: NotifierConfig) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("loqa-callbot/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StartupError::HttpClient)?;

        let runtime = Handle::try_current().map_err(|e| StartupError::Runtime(e.to_string()))?;

        match &config.base_url {
            Some(url) => info!("Webhook notifier targeting {}", url),
            None => info!("Webhook notifier disabled (no consumer configured)"),
        }

        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    /// Full URL for a route, if a consumer is configured
    pub fn endpoint(&self, route: EventRoute) -> Option<String> {
        let base = self.config.base_url.as_deref()?.trim_end_matches('/');
        let path = match route {
            EventRoute::Status => &self.config.status_path,
            EventRoute::Capture => &self.config.capture_path,
        };

        if path.starts_with('/') {
            Some(format!("{}{}", base, path))
        } else {
            Some(format!("{}/{}", base, path))
        }
    }

    /// One delivery attempt, awaited. `notify` wraps this in a background task.
    pub async fn deliver(&self, event: &WebhookEvent) -> Result<(), NotifyError> {
        let Some(url) = self.endpoint(event.route()) else {
            return Ok(());
        };
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.status(), e);
                return Ok(());
            }
        };

        send_event(&self.client, &url, &payload).await
    }
}

impl EventSink for HttpNotifier {
    fn notify(&self, event: WebhookEvent) {
        let Some(url) = self.endpoint(event.route()) else {
            debug!(
                "No consumer configured, dropping {} event for {}",
                event.status(),
                event.call_id
            );
            return;
        };

        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.status(), e);
                return;
            }
        };

        let client = self.client.clone();
        let status = event.status().to_string();
        let call_id = event.call_id;

        self.runtime.spawn(async move {
            match send_event(&client, &url, &payload).await {
                Ok(()) => debug!("Delivered {} event for {} to {}", status, call_id, url),
                Err(e) if e.is_network() => {
                    debug!("Consumer unreachable, {} event for {} dropped: {}", status, call_id, e)
                }
                Err(e) => warn!("Webhook delivery of {} event for {} failed: {}", status, call_id, e),
            }
        });
    }
}

async fn send_event(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
) -> Result<(), NotifyError> {
    let resp = client.post(url).json(payload).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(NotifyError::Status {
            status: status.as_u16(),
            body: truncate(&body, 200).to_string(),
        });
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
