//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Configuration editor session: buffer, validation, save, reset, notices."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use culvert_proto::Config;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::ControlClient;
use crate::error::{ControlError, SaveError};

/// How long a success notice stays up before clearing itself.
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Default)]
struct EditorState {
    canonical: Option<Config>,
    canonical_text: String,
    buffer: String,
}

/// Editing session over the agent's configuration document.
///
/// The canonical text is the pretty-printed JSON of the last fetched config;
/// the buffer starts as a copy and takes free-form edits. `save` validates
/// locally before touching the wire and never discards the buffer on
/// failure.
pub struct ConfigSession {
    client: Arc<ControlClient>,
    state: Mutex<EditorState>,
    notice: watch::Sender<Option<String>>,
    notice_timer: Mutex<Option<JoinHandle<()>>>,
    notice_ttl: Duration,
}

impl ConfigSession {
    /// Create a session; call [`ConfigSession::load`] to populate it.
    pub fn new(client: Arc<ControlClient>) -> Self {
        Self {
            client,
            state: Mutex::new(EditorState::default()),
            notice: watch::channel(None).0,
            notice_timer: Mutex::new(None),
            notice_ttl: DEFAULT_NOTICE_TTL,
        }
    }

    /// Adjust how long success notices stay up.
    pub fn with_notice_ttl(mut self, ttl: Duration) -> Self {
        self.notice_ttl = ttl;
        self
    }

    /// Fetch the canonical config and reset both canonical text and buffer
    /// to its pretty-printed form.
    pub async fn load(&self) -> Result<(), ControlError> {
        let envelope = self.client.fetch_config().await?;
        if !envelope.success {
            return Err(ControlError::application(envelope.error_text()));
        }
        let config = envelope
            .data
            .ok_or_else(|| ControlError::application("config response carried no data"))?;
        let text = config
            .to_pretty_json()
            .map_err(|err| ControlError::application(format!("failed to render config: {err}")))?;

        let mut state = self.state.lock();
        state.canonical = Some(config);
        state.canonical_text = text.clone();
        state.buffer = text;
        Ok(())
    }

    /// Current edit buffer.
    pub fn buffer(&self) -> String {
        self.state.lock().buffer.clone()
    }

    /// Replace the edit buffer. Free-form; validation happens at save.
    pub fn set_buffer(&self, text: impl Into<String>) {
        self.state.lock().buffer = text.into();
    }

    /// Pretty-printed text of the last fetched config.
    pub fn canonical_text(&self) -> String {
        self.state.lock().canonical_text.clone()
    }

    /// The last fetched config document.
    pub fn canonical(&self) -> Option<Config> {
        self.state.lock().canonical.clone()
    }

    /// Validate and persist the buffer.
    ///
    /// A buffer that does not decode is rejected locally without any network
    /// call. A rejected or failed save leaves the buffer exactly as it was.
    /// A successful save refetches the canonical config (reconciling the
    /// buffer to server state) and raises a transient success notice.
    pub async fn save(&self) -> Result<(), SaveError> {
        let buffer = self.buffer();
        let parsed: Config = serde_json::from_str(&buffer).map_err(SaveError::Invalid)?;

        let envelope = self
            .client
            .update_config(&parsed)
            .await
            .map_err(ControlError::from)?;
        if !envelope.success {
            return Err(ControlError::application(envelope.error_text()).into());
        }

        info!("configuration saved");
        self.load().await.map_err(SaveError::Control)?;
        self.raise_notice(
            envelope
                .message
                .unwrap_or_else(|| "Configuration saved".to_string()),
        );
        Ok(())
    }

    /// Discard edits: restore the buffer to the canonical text and clear any
    /// notice.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.buffer = state.canonical_text.clone();
        }
        self.clear_notice();
    }

    /// Current success notice, if one is up.
    pub fn notice(&self) -> Option<String> {
        self.notice.borrow().clone()
    }

    /// Watch notice changes (raised and self-cleared).
    pub fn watch_notice(&self) -> watch::Receiver<Option<String>> {
        self.notice.subscribe()
    }

    fn raise_notice(&self, text: String) {
        let _ = self.notice.send(Some(text));
        let notice = self.notice.clone();
        let ttl = self.notice_ttl;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = notice.send(None);
        });
        // A fresh save gets a full window; stop the previous countdown.
        if let Some(previous) = self.notice_timer.lock().replace(timer) {
            previous.abort();
        }
    }

    fn clear_notice(&self) {
        if let Some(timer) = self.notice_timer.lock().take() {
            timer.abort();
        }
        let _ = self.notice.send(None);
    }
}
