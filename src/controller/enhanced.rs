//! Rules specific to enhanced (script/merge) profiles: the enabled chain,
//! its runtime logs and when it may be reordered.

use crate::profile::{ProfileError, ProfileResult, ProfileSnapshot, ProfileStore};
use crate::profile::store::move_item;
use crate::reactivation::Reactivator;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const EXCEPTION_LEVEL: &str = "exception";

/// One line an enhanced profile wrote while the configuration was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
  pub level: String,
  pub message: String,
}

impl LogEntry {
  pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      level: level.into(),
      message: message.into(),
    }
  }

  pub fn is_exception(&self) -> bool {
    self.level == EXCEPTION_LEVEL
  }
}

/// Runtime logs keyed by profile uid.
pub type RuntimeLogs = HashMap<String, Vec<LogEntry>>;

pub fn has_error(entries: &[LogEntry]) -> bool {
  entries.iter().any(LogEntry::is_exception)
}

/// Reordering is offered only with more than one enabled item and no errors.
pub fn can_move(enabled_count: usize, any_errored: bool) -> bool {
  enabled_count > 1 && !any_errored
}

/// The enabled enhanced profiles and which of them last errored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainView {
  pub enabled: Vec<String>,
  errored: HashSet<String>,
}

impl ChainView {
  pub fn new(snapshot: &ProfileSnapshot, logs: &RuntimeLogs) -> Self {
    let enabled: Vec<String> = snapshot
      .chain
      .iter()
      .filter(|uid| {
        snapshot
          .find(uid)
          .is_some_and(|record| record.kind.is_enhanced())
      })
      .cloned()
      .collect();
    let errored = enabled
      .iter()
      .filter(|uid| logs.get(*uid).is_some_and(|entries| has_error(entries)))
      .cloned()
      .collect();
    Self { enabled, errored }
  }

  pub fn is_enabled(&self, uid: &str) -> bool {
    self.enabled.iter().any(|e| e == uid)
  }

  pub fn has_error(&self, uid: &str) -> bool {
    self.errored.contains(uid)
  }

  /// One errored item blocks moving the whole set, so the failing item
  /// stays where it was.
  pub fn can_move(&self) -> bool {
    can_move(self.enabled.len(), !self.errored.is_empty())
  }
}

/// Moves an enabled enhanced profile within the chain and re-applies the
/// configuration, since chain order changes the result.
pub async fn reorder_chain(
  store: &ProfileStore,
  reactivator: &Reactivator,
  logs: &RuntimeLogs,
  from: usize,
  to: usize,
) -> ProfileResult<Vec<String>> {
  let view = ChainView::new(&*store.current_snapshot().await?, logs);
  if !view.can_move() {
    return Err(ProfileError::validation(
      "enhanced profiles cannot be reordered right now",
    ));
  }

  let order = move_item(&view.enabled, from, to)?;
  if order == view.enabled {
    return Ok(order);
  }

  store
    .commands()
    .set_chain(&order)
    .await
    .map_err(ProfileError::Transport)?;
  store.invalidate().await?;
  reactivator.reactivate().await?;
  Ok(order)
}
