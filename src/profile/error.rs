/// Failures surfaced by the profile core.
///
/// Every variant carries text that can be shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
  #[error("Profile not found: {0}")]
  NotFound(String),

  #[error("{0}")]
  Transport(String),

  #[error("Invalid operation: {0}")]
  Validation(String),
}

impl ProfileError {
  pub fn transport(message: impl Into<String>) -> Self {
    ProfileError::Transport(message.into())
  }

  pub fn validation(message: impl Into<String>) -> Self {
    ProfileError::Validation(message.into())
  }
}

impl From<String> for ProfileError {
  fn from(message: String) -> Self {
    ProfileError::Transport(message)
  }
}

pub type ProfileResult<T> = Result<T, ProfileError>;
