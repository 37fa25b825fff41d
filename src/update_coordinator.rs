//! Guarded profile updates.
//!
//! At most one update per uid is in flight. A second request while the
//! first is outstanding is dropped, not queued.

use crate::events::Notice;
use crate::profile::{ProfileError, ProfileRecord, ProfileStore, RoutingOption};
use crate::reactivation::Reactivator;
use regex_lite::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// How the caller wants the subscription fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
  /// Never use a proxy for the fetch.
  Direct,
  /// Whatever the profile's stored routing option says.
  AsConfigured,
  /// Use a proxy if at all possible: the profile's own proxy if it asks
  /// for it, the system proxy otherwise.
  PreferProxy,
}

impl UpdateMode {
  /// Concrete routing override for `record`. `None` means no override.
  pub fn resolve(&self, record: &ProfileRecord) -> Option<RoutingOption> {
    match self {
      UpdateMode::Direct => Some(RoutingOption::NO_PROXY),
      UpdateMode::AsConfigured => None,
      UpdateMode::PreferProxy => {
        if record.routing().self_proxy {
          Some(RoutingOption::SELF_PROXY)
        } else {
          Some(RoutingOption::SYSTEM_PROXY)
        }
      }
    }
  }
}

impl std::str::FromStr for UpdateMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "direct" => Ok(UpdateMode::Direct),
      "configured" | "as-configured" => Ok(UpdateMode::AsConfigured),
      "proxy" | "prefer-proxy" => Ok(UpdateMode::PreferProxy),
      other => Err(format!("unknown update mode '{other}'")),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
  Updated,
  /// Another update for the same uid was already in flight; nothing was sent.
  Suppressed,
  Failed(ProfileError),
}

/// Set of uids with an update in flight.
#[derive(Default)]
pub struct UpdateLocks {
  in_flight: Mutex<HashSet<String>>,
}

impl UpdateLocks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Takes the lock for `uid`, or `None` if it is already held.
  pub fn try_acquire(self: &Arc<Self>, uid: &str) -> Option<UpdateLockGuard> {
    let mut in_flight = self.lock_set();
    if !in_flight.insert(uid.to_string()) {
      return None;
    }
    Some(UpdateLockGuard {
      locks: Arc::clone(self),
      uid: uid.to_string(),
    })
  }

  pub fn is_locked(&self, uid: &str) -> bool {
    self.lock_set().contains(uid)
  }

  /// `uid -> updating` for every uid in `uids`; anything not in flight is false.
  pub fn flags<'a>(&self, uids: impl IntoIterator<Item = &'a str>) -> HashMap<String, bool> {
    let in_flight = self.lock_set();
    uids
      .into_iter()
      .map(|uid| (uid.to_string(), in_flight.contains(uid)))
      .collect()
  }

  pub fn in_flight_count(&self) -> usize {
    self.lock_set().len()
  }

  fn release(&self, uid: &str) {
    self.lock_set().remove(uid);
  }

  fn lock_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
    // A poisoned set still holds valid uids.
    self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Releases the update lock when dropped, including when the update future
/// is dropped before it completes.
pub struct UpdateLockGuard {
  locks: Arc<UpdateLocks>,
  uid: String,
}

impl Drop for UpdateLockGuard {
  fn drop(&mut self) {
    self.locks.release(&self.uid);
  }
}

lazy_static::lazy_static! {
  static ref TRANSPORT_PREFIX: Option<Regex> =
    Regex::new(r"error sending request for url \(?\S+?\)?: ").ok();
}

/// Strips the HTTP client's "error sending request for url ...: " wrapper so
/// the user sees the underlying cause.
pub fn sanitize_error_message(message: &str) -> String {
  match TRANSPORT_PREFIX.as_ref() {
    Some(re) => re.replace(message, "").into_owned(),
    None => message.to_string(),
  }
}

pub struct UpdateCoordinator {
  store: Arc<ProfileStore>,
  locks: Arc<UpdateLocks>,
  notice: Arc<dyn Notice>,
  reactivator: Arc<Reactivator>,
}

impl UpdateCoordinator {
  pub fn new(
    store: Arc<ProfileStore>,
    notice: Arc<dyn Notice>,
    reactivator: Arc<Reactivator>,
  ) -> Self {
    Self {
      store,
      locks: Arc::new(UpdateLocks::new()),
      notice,
      reactivator,
    }
  }

  pub fn locks(&self) -> &Arc<UpdateLocks> {
    &self.locks
  }

  pub fn is_updating(&self, uid: &str) -> bool {
    self.locks.is_locked(uid)
  }

  /// Updates `uid` with the routing `mode` resolves to.
  ///
  /// Never returns an error: failures are shown through the notifier and
  /// reported in the outcome.
  pub async fn update(&self, uid: &str, mode: UpdateMode) -> UpdateOutcome {
    let Some(_guard) = self.locks.try_acquire(uid) else {
      log::debug!("Update for profile {uid} already in flight, ignoring");
      return UpdateOutcome::Suppressed;
    };

    let outcome = self.run_update(uid, mode).await;
    if let UpdateOutcome::Failed(e) = &outcome {
      let message = sanitize_error_message(&e.to_string());
      log::warn!("Failed to update profile {uid}: {message}");
      self.notice.error(&message);
    }
    outcome
  }

  async fn run_update(&self, uid: &str, mode: UpdateMode) -> UpdateOutcome {
    let record = match self.store.find(uid).await {
      Ok(record) => record,
      Err(e) => return UpdateOutcome::Failed(e),
    };

    let option = mode.resolve(&record);
    log::info!("Updating profile {uid} ({mode:?}, option {option:?})");

    if let Err(e) = self.store.commands().update_profile(uid, option).await {
      return UpdateOutcome::Failed(ProfileError::Transport(e));
    }

    if let Err(e) = self.store.invalidate().await {
      log::warn!("Profile {uid} updated but the list could not be refreshed: {e}");
    }

    if let Err(e) = self.reactivator.reactivate_if_active(uid).await {
      log::warn!("Reactivation after updating {uid} failed: {e}");
    }

    UpdateOutcome::Updated
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::commands::mock::MockCommands;
  use crate::events::notice::mock::RecordingNotice;
  use crate::profile::{ProfileKind, ProfileRecord};

  fn remote(uid: &str) -> ProfileRecord {
    ProfileRecord::new(uid, uid, ProfileKind::Remote).with_url("https://example.com/sub")
  }

  fn setup(
    items: Vec<ProfileRecord>,
    current: Option<&str>,
  ) -> (
    Arc<MockCommands>,
    Arc<ProfileStore>,
    Arc<RecordingNotice>,
    Arc<UpdateCoordinator>,
  ) {
    let mock = MockCommands::with_items(items, current);
    let store = Arc::new(ProfileStore::new(mock.clone()));
    let notice = Arc::new(RecordingNotice::default());
    let reactivator = Arc::new(Reactivator::new(store.clone(), notice.clone()));
    let coordinator = Arc::new(UpdateCoordinator::new(
      store.clone(),
      notice.clone(),
      reactivator,
    ));
    (mock, store, notice, coordinator)
  }

  #[test]
  fn test_resolve_modes() {
    let mut record = remote("a");
    assert_eq!(
      UpdateMode::Direct.resolve(&record),
      Some(RoutingOption::NO_PROXY)
    );
    assert_eq!(UpdateMode::AsConfigured.resolve(&record), None);
    assert_eq!(
      UpdateMode::PreferProxy.resolve(&record),
      Some(RoutingOption::SYSTEM_PROXY)
    );

    record.option = Some(RoutingOption::SELF_PROXY);
    assert_eq!(
      UpdateMode::PreferProxy.resolve(&record),
      Some(RoutingOption::SELF_PROXY)
    );
  }

  #[test]
  fn test_resolve_never_sets_both_flags() {
    let stored = [
      None,
      Some(RoutingOption::NO_PROXY),
      Some(RoutingOption::SYSTEM_PROXY),
      Some(RoutingOption::SELF_PROXY),
      Some(RoutingOption {
        with_proxy: true,
        self_proxy: true,
      }),
    ];
    for option in stored {
      let mut record = remote("a");
      record.option = option;
      for mode in [
        UpdateMode::Direct,
        UpdateMode::AsConfigured,
        UpdateMode::PreferProxy,
      ] {
        if let Some(resolved) = mode.resolve(&record) {
          assert!(!(resolved.with_proxy && resolved.self_proxy));
        }
      }
    }
  }

  #[test]
  fn test_sanitize_error_message() {
    assert_eq!(
      sanitize_error_message(
        "error sending request for url (https://sub.example.com/x?token=1): connection refused"
      ),
      "connection refused"
    );
    assert_eq!(
      sanitize_error_message("error sending request for url https://a.b/c: timed out"),
      "timed out"
    );
    assert_eq!(sanitize_error_message("invalid yaml"), "invalid yaml");
  }

  #[test]
  fn test_lock_guard_releases_on_drop() {
    let locks = Arc::new(UpdateLocks::new());
    let guard = locks.try_acquire("a").unwrap();
    assert!(locks.is_locked("a"));
    assert!(locks.try_acquire("a").is_none());
    drop(guard);
    assert!(!locks.is_locked("a"));
    assert_eq!(locks.in_flight_count(), 0);
  }

  #[tokio::test]
  async fn test_direct_update_succeeds_and_revalidates() {
    let (mock, store, notice, coordinator) = setup(vec![remote("A")], None);
    let before = store.find("A").await.unwrap().updated;

    let outcome = coordinator.update("A", UpdateMode::Direct).await;

    assert_eq!(outcome, UpdateOutcome::Updated);
    assert!(!coordinator.is_updating("A"));
    assert_eq!(
      mock.update_options.lock().unwrap()[0],
      ("A".to_string(), Some(RoutingOption::NO_PROXY))
    );
    let after = store.find("A").await.unwrap().updated;
    assert!(after > before);
    assert!(notice.errors().is_empty());
  }

  #[tokio::test]
  async fn test_concurrent_update_is_suppressed() {
    let (mock, _store, _notice, coordinator) = setup(vec![remote("A")], None);
    let gate = mock.hold_updates();

    let first = tokio::spawn({
      let coordinator = coordinator.clone();
      async move { coordinator.update("A", UpdateMode::AsConfigured).await }
    });
    while mock.count("update_profile") == 0 {
      tokio::task::yield_now().await;
    }
    assert!(coordinator.is_updating("A"));

    let second = coordinator.update("A", UpdateMode::Direct).await;
    assert_eq!(second, UpdateOutcome::Suppressed);
    assert_eq!(mock.count("update_profile"), 1);

    gate.notify_one();
    assert_eq!(first.await.unwrap(), UpdateOutcome::Updated);
    assert!(!coordinator.is_updating("A"));

    *mock.update_gate.lock().unwrap() = None;
    let third = coordinator.update("A", UpdateMode::Direct).await;
    assert_eq!(third, UpdateOutcome::Updated);
    assert_eq!(mock.count("update_profile"), 2);
  }

  #[tokio::test]
  async fn test_different_uids_update_concurrently() {
    let (mock, _store, _notice, coordinator) = setup(vec![remote("A"), remote("B")], None);
    let gate = mock.hold_updates();

    let a = tokio::spawn({
      let coordinator = coordinator.clone();
      async move { coordinator.update("A", UpdateMode::Direct).await }
    });
    let b = tokio::spawn({
      let coordinator = coordinator.clone();
      async move { coordinator.update("B", UpdateMode::Direct).await }
    });
    while mock.count("update_profile") < 2 {
      tokio::task::yield_now().await;
    }
    assert_eq!(coordinator.locks().in_flight_count(), 2);

    gate.notify_one();
    gate.notify_one();
    assert_eq!(a.await.unwrap(), UpdateOutcome::Updated);
    assert_eq!(b.await.unwrap(), UpdateOutcome::Updated);
  }

  #[tokio::test]
  async fn test_failed_update_releases_lock_and_notifies() {
    let (mock, store, notice, coordinator) = setup(vec![remote("A")], None);
    let before = store.find("A").await.unwrap();
    *mock.fail_update.lock().unwrap() = Some(
      "error sending request for url (https://example.com/sub): dns error".to_string(),
    );

    let outcome = coordinator.update("A", UpdateMode::PreferProxy).await;

    assert!(matches!(outcome, UpdateOutcome::Failed(ProfileError::Transport(_))));
    assert!(!coordinator.is_updating("A"));
    assert_eq!(notice.errors(), vec!["dns error".to_string()]);
    assert_eq!(store.find("A").await.unwrap(), before);
  }

  #[tokio::test]
  async fn test_unknown_uid_is_not_found() {
    let (mock, _store, notice, coordinator) = setup(vec![remote("A")], None);

    let outcome = coordinator.update("missing", UpdateMode::Direct).await;

    assert_eq!(
      outcome,
      UpdateOutcome::Failed(ProfileError::NotFound("missing".to_string()))
    );
    assert_eq!(mock.count("update_profile"), 0);
    assert_eq!(notice.errors().len(), 1);
    assert!(!coordinator.is_updating("missing"));
  }

  #[tokio::test]
  async fn test_updating_active_profile_reactivates() {
    let (mock, _store, _notice, coordinator) = setup(vec![remote("A"), remote("B")], Some("A"));

    coordinator.update("B", UpdateMode::Direct).await;
    assert_eq!(mock.count("reactivate_configuration"), 0);

    coordinator.update("A", UpdateMode::Direct).await;
    assert_eq!(mock.count("reactivate_configuration"), 1);
  }

  #[tokio::test]
  async fn test_dropped_update_future_releases_lock() {
    let (mock, _store, _notice, coordinator) = setup(vec![remote("A")], None);
    let _gate = mock.hold_updates();

    let task = tokio::spawn({
      let coordinator = coordinator.clone();
      async move { coordinator.update("A", UpdateMode::Direct).await }
    });
    while mock.count("update_profile") == 0 {
      tokio::task::yield_now().await;
    }
    task.abort();
    let _ = task.await;

    assert!(!coordinator.is_updating("A"));
  }
}
