use super::{EventEmitter, NOTICE};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
  Success,
  Error,
  Info,
}

/// User-visible toast notifications.
pub trait Notice: Send + Sync {
  fn show(&self, kind: NoticeKind, message: &str);

  fn success(&self, message: &str) {
    self.show(NoticeKind::Success, message);
  }

  fn error(&self, message: &str) {
    self.show(NoticeKind::Error, message);
  }

  fn info(&self, message: &str) {
    self.show(NoticeKind::Info, message);
  }
}

#[derive(Serialize)]
struct NoticePayload<'a> {
  kind: NoticeKind,
  message: &'a str,
}

/// Forwards notices to an [`EventEmitter`] as `notice` events.
#[derive(Clone)]
pub struct EmitterNotice {
  emitter: Arc<dyn EventEmitter>,
}

impl EmitterNotice {
  pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
    Self { emitter }
  }
}

impl Notice for EmitterNotice {
  fn show(&self, kind: NoticeKind, message: &str) {
    let payload = match serde_json::to_value(NoticePayload { kind, message }) {
      Ok(value) => value,
      Err(e) => {
        log::error!("Failed to serialize notice: {e}");
        return;
      }
    };
    if let Err(e) = self.emitter.emit_value(NOTICE, payload) {
      log::warn!("Failed to emit notice: {e}");
    }
  }
}

/// Writes notices to the log; used by the CLI.
#[derive(Clone, Default)]
pub struct LogNotice;

impl Notice for LogNotice {
  fn show(&self, kind: NoticeKind, message: &str) {
    match kind {
      NoticeKind::Error => log::error!("{message}"),
      NoticeKind::Success | NoticeKind::Info => log::info!("{message}"),
    }
  }
}
