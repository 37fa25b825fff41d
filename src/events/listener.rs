use super::{EmittedEvent, Notice, NOTICE_MESSAGE, REFRESH_CLASH_CONFIG, REFRESH_VERGE_CONFIG};
use crate::profile::ProfileStore;
use crate::session::WindowPolicy;
use crate::settings_manager::SettingsManager;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Status codes carried by `verge://notice-message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
  ConfigApplied,
  ConfigError,
  Other(String),
}

impl StatusCode {
  pub fn parse(code: &str) -> Self {
    match code {
      "set_config::ok" => StatusCode::ConfigApplied,
      "set_config::error" => StatusCode::ConfigError,
      other => StatusCode::Other(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      StatusCode::ConfigApplied => "set_config::ok",
      StatusCode::ConfigError => "set_config::error",
      StatusCode::Other(code) => code,
    }
  }
}

/// Pushed events the core reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
  RefreshClashConfig,
  RefreshSettings,
  Status(StatusCode, String),
  Unknown(String),
}

impl AppEvent {
  pub fn parse(event: &str, payload: &serde_json::Value) -> Self {
    match event {
      REFRESH_CLASH_CONFIG => AppEvent::RefreshClashConfig,
      REFRESH_VERGE_CONFIG => AppEvent::RefreshSettings,
      NOTICE_MESSAGE => {
        // payload is a [status, message] pair
        let code = payload.get(0).and_then(|v| v.as_str()).unwrap_or_default();
        let message = payload.get(1).and_then(|v| v.as_str()).unwrap_or_default();
        AppEvent::Status(StatusCode::parse(code), message.to_string())
      }
      other => AppEvent::Unknown(other.to_string()),
    }
  }
}

/// Routes pushed events to the store, the notifier and the window policy.
pub struct EventRouter {
  store: Arc<ProfileStore>,
  notice: Arc<dyn Notice>,
  settings: Arc<SettingsManager>,
  window: Arc<WindowPolicy>,
}

impl EventRouter {
  pub fn new(
    store: Arc<ProfileStore>,
    notice: Arc<dyn Notice>,
    settings: Arc<SettingsManager>,
    window: Arc<WindowPolicy>,
  ) -> Self {
    Self {
      store,
      notice,
      settings,
      window,
    }
  }

  pub async fn handle(&self, event: AppEvent) {
    match event {
      AppEvent::RefreshClashConfig => {
        if let Err(e) = self.store.invalidate().await {
          log::warn!("Failed to refresh profiles after config change: {e}");
        }
      }
      AppEvent::RefreshSettings => match self.settings.load_settings() {
        Ok(settings) => self.window.set_keep_ui_active(settings.enable_keep_ui_active),
        Err(e) => log::warn!("Failed to reload settings: {e}"),
      },
      AppEvent::Status(StatusCode::ConfigApplied, _) => {
        self.notice.success("Clash Config Updated");
      }
      AppEvent::Status(StatusCode::ConfigError, message) => {
        self.notice.error(&message);
      }
      AppEvent::Status(StatusCode::Other(code), _) => {
        log::debug!("Ignoring status notification {code}");
      }
      AppEvent::Unknown(name) => {
        log::trace!("Ignoring event {name}");
      }
    }
  }

  /// Handles events from `rx` until the channel closes.
  pub fn listen(self: Arc<Self>, mut rx: broadcast::Receiver<EmittedEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(emitted) => {
            let event = AppEvent::parse(&emitted.event_type, &emitted.payload);
            self.handle(event).await;
          }
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            log::warn!("Event listener lagged, skipped {skipped} events");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }
}
