//! File-backed implementation of the profile command layer.

pub mod local;
pub mod opener;
pub mod subscription;

pub use local::LocalBackend;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  #[error("Profile not found: {0}")]
  NotFound(String),

  #[error("Invalid operation: {0}")]
  Invalid(String),

  #[error("Invalid profile: {0}")]
  InvalidProfile(String),

  #[error("Failed to fetch subscription: HTTP {0}")]
  Status(u16),

  #[error("{0}")]
  Http(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BackendError {
  fn from(e: reqwest::Error) -> Self {
    // reqwest keeps the cause out of Display; surface the whole chain.
    BackendError::Http(error_chain(&e))
  }
}

/// `error: cause: root cause`.
pub fn error_chain(e: &dyn std::error::Error) -> String {
  let mut message = e.to_string();
  let mut source = e.source();
  while let Some(cause) = source {
    let text = cause.to_string();
    if !message.contains(&text) {
      message.push_str(": ");
      message.push_str(&text);
    }
    source = cause.source();
  }
  message
}
