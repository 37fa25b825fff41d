use tokio::sync::broadcast;

pub mod listener;
pub mod notice;

pub use listener::{AppEvent, EventRouter, StatusCode};
pub use notice::{EmitterNotice, LogNotice, Notice, NoticeKind};

pub const REFRESH_CLASH_CONFIG: &str = "verge://refresh-clash-config";
pub const REFRESH_VERGE_CONFIG: &str = "verge://refresh-verge-config";
pub const NOTICE_MESSAGE: &str = "verge://notice-message";
pub const NOTICE: &str = "notice";

/// Trait for pushing events out of the core, either to a native shell or
/// to in-process subscribers.
///
/// Payloads are `serde_json::Value` so the trait stays dyn-compatible.
pub trait EventEmitter: Send + Sync {
  /// Emit an event with a JSON value payload.
  fn emit_value(&self, event: &str, payload: serde_json::Value) -> Result<(), String>;
}

/// Event message sent through the broadcast channel.
#[derive(Clone, Debug)]
pub struct EmittedEvent {
  pub event_type: String,
  pub payload: serde_json::Value,
}

/// Broadcasts events to every in-process subscriber.
#[derive(Clone)]
pub struct BroadcastEmitter {
  tx: broadcast::Sender<EmittedEvent>,
}

impl BroadcastEmitter {
  pub fn new(tx: broadcast::Sender<EmittedEvent>) -> Self {
    Self { tx }
  }

  /// Create a new emitter with a default channel capacity.
  pub fn with_capacity(capacity: usize) -> (Self, broadcast::Receiver<EmittedEvent>) {
    let (tx, rx) = broadcast::channel(capacity);
    (Self { tx }, rx)
  }

  pub fn subscribe(&self) -> broadcast::Receiver<EmittedEvent> {
    self.tx.subscribe()
  }
}

impl EventEmitter for BroadcastEmitter {
  fn emit_value(&self, event: &str, payload: serde_json::Value) -> Result<(), String> {
    let emitted = EmittedEvent {
      event_type: event.to_string(),
      payload,
    };
    // Ignore send errors (no receivers connected)
    let _ = self.tx.send(emitted);
    Ok(())
  }
}

/// No-op emitter for testing or when events are not needed.
#[derive(Clone, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
  fn emit_value(&self, _event: &str, _payload: serde_json::Value) -> Result<(), String> {
    Ok(())
  }
}
