use crate::commands::ProfileCommands;
use crate::controller::ProfileItemController;
use crate::events::{EventRouter, Notice};
use crate::profile::{ProfileError, ProfileResult, ProfileStore};
use crate::reactivation::{ReactivateOutcome, Reactivator};
use crate::settings_manager::SettingsManager;
use crate::update_coordinator::UpdateCoordinator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
  /// Keep the process and the core running, only hide the window.
  Hide,
  Close,
}

/// Owns the keep-UI-active flag. Written from settings reloads only.
#[derive(Debug, Default)]
pub struct WindowPolicy {
  keep_ui_active: AtomicBool,
}

impl WindowPolicy {
  pub fn new(keep_ui_active: bool) -> Self {
    Self {
      keep_ui_active: AtomicBool::new(keep_ui_active),
    }
  }

  pub fn keep_ui_active(&self) -> bool {
    self.keep_ui_active.load(Ordering::SeqCst)
  }

  pub fn set_keep_ui_active(&self, keep: bool) {
    let previous = self.keep_ui_active.swap(keep, Ordering::SeqCst);
    if previous != keep {
      log::debug!("Keep UI active set to {keep}");
    }
  }

  pub fn close_action(&self) -> CloseAction {
    if self.keep_ui_active() {
      CloseAction::Hide
    } else {
      CloseAction::Close
    }
  }
}

/// Everything one running client shares: the profile store (which owns the
/// active uid), the update locks, the reactivation trigger and the window
/// policy.
pub struct AppSession {
  store: Arc<ProfileStore>,
  reactivator: Arc<Reactivator>,
  coordinator: Arc<UpdateCoordinator>,
  notice: Arc<dyn Notice>,
  settings: Arc<SettingsManager>,
  window: Arc<WindowPolicy>,
}

impl AppSession {
  pub fn new(
    commands: Arc<dyn ProfileCommands>,
    notice: Arc<dyn Notice>,
    settings: Arc<SettingsManager>,
  ) -> Self {
    let keep_ui_active = match settings.load_settings() {
      Ok(settings) => settings.enable_keep_ui_active,
      Err(e) => {
        log::warn!("Failed to load settings, quitting on close: {e}");
        false
      }
    };

    let store = Arc::new(ProfileStore::new(commands));
    let reactivator = Arc::new(Reactivator::new(store.clone(), notice.clone()));
    let coordinator = Arc::new(UpdateCoordinator::new(
      store.clone(),
      notice.clone(),
      reactivator.clone(),
    ));

    Self {
      store,
      reactivator,
      coordinator,
      notice,
      settings,
      window: Arc::new(WindowPolicy::new(keep_ui_active)),
    }
  }

  pub fn store(&self) -> &Arc<ProfileStore> {
    &self.store
  }

  pub fn reactivator(&self) -> &Arc<Reactivator> {
    &self.reactivator
  }

  pub fn coordinator(&self) -> &Arc<UpdateCoordinator> {
    &self.coordinator
  }

  pub fn notice(&self) -> &Arc<dyn Notice> {
    &self.notice
  }

  pub fn settings(&self) -> &Arc<SettingsManager> {
    &self.settings
  }

  pub fn window(&self) -> &Arc<WindowPolicy> {
    &self.window
  }

  pub fn item(self: &Arc<Self>, uid: &str) -> ProfileItemController {
    ProfileItemController::new(Arc::clone(self), uid)
  }

  pub fn event_router(&self) -> Arc<EventRouter> {
    Arc::new(EventRouter::new(
      self.store.clone(),
      self.notice.clone(),
      self.settings.clone(),
      self.window.clone(),
    ))
  }

  /// Makes `uid` the current profile. Without `force`, selecting the profile
  /// that is already current does nothing.
  pub async fn select(&self, uid: &str, force: bool) -> ProfileResult<()> {
    let snapshot = self.store.current_snapshot().await?;
    let record = snapshot
      .find(uid)
      .ok_or_else(|| ProfileError::NotFound(uid.to_string()))?;
    if record.kind.is_enhanced() {
      return Err(ProfileError::validation(format!(
        "{uid} is an enhanced profile and cannot be selected"
      )));
    }
    if !force && snapshot.current.as_deref() == Some(uid) {
      return Ok(());
    }

    if let Err(e) = self.store.commands().select_profile(uid).await {
      log::error!("Failed to select profile {uid}: {e}");
      self.notice.error(&e);
      return Err(ProfileError::Transport(e));
    }
    log::info!("Selected profile {uid}");
    self.store.invalidate().await?;
    self.reactivator.reactivate().await?;
    Ok(())
  }

  /// Explicit "reactivate" from the user.
  pub async fn reactivate(&self) -> ProfileResult<ReactivateOutcome> {
    self.reactivator.reactivate().await
  }
}
