use super::menu::{menu_for, MenuAction};
use crate::profile::display::{now_secs, ProfileCard};
use crate::profile::{ProfileError, ProfileInfoPatch, ProfileRecord, ProfileResult};
use crate::session::AppSession;
use crate::update_coordinator::{UpdateMode, UpdateOutcome};
use std::sync::{Arc, Mutex, MutexGuard};

pub const DELETE_CONFIRM_TITLE: &str = "Confirm deletion";
pub const DELETE_CONFIRM_MESSAGE: &str = "This operation is not reversible";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKind {
  Info,
  File,
}

/// What a card is doing, as far as other actions are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
  Idle,
  /// An update for this uid holds the lock.
  Updating,
  PendingDelete,
  Editing(EditorKind),
}

/// Result of an item action the host has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
  Select { uid: String, force: bool },
  /// Open this url in the system browser.
  OpenHome(String),
  EditorOpened(EditorKind),
  /// Show the delete confirmation dialog.
  ConfirmDelete {
    title: &'static str,
    message: &'static str,
  },
  Deleted,
  FileOpened,
  Update(UpdateOutcome),
  Toggled { enabled: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
  Idle,
  PendingDelete,
  Editing { kind: EditorKind, saved: bool },
}

#[derive(Debug)]
struct ItemFlags {
  mode: Mode,
  dragging: bool,
  menu_open: bool,
  toggling: bool,
}

/// Clears the toggling flag on drop, including when the toggle future is
/// dropped mid-call.
struct TogglingGuard<'a> {
  flags: &'a Mutex<ItemFlags>,
}

impl<'a> TogglingGuard<'a> {
  fn new(flags: &'a Mutex<ItemFlags>) -> Self {
    flags.lock().unwrap_or_else(|e| e.into_inner()).toggling = true;
    Self { flags }
  }
}

impl Drop for TogglingGuard<'_> {
  fn drop(&mut self) {
    self.flags.lock().unwrap_or_else(|e| e.into_inner()).toggling = false;
  }
}

/// Binds one profile to the actions its card offers.
///
/// Local state is only touched under a std mutex that is released before
/// any await; the update lock lives in the shared coordinator.
pub struct ProfileItemController {
  session: Arc<AppSession>,
  uid: String,
  flags: Mutex<ItemFlags>,
}

impl ProfileItemController {
  pub fn new(session: Arc<AppSession>, uid: impl Into<String>) -> Self {
    Self {
      session,
      uid: uid.into(),
      flags: Mutex::new(ItemFlags {
        mode: Mode::Idle,
        dragging: false,
        menu_open: false,
        toggling: false,
      }),
    }
  }

  pub fn uid(&self) -> &str {
    &self.uid
  }

  pub fn state(&self) -> ItemState {
    if self.session.coordinator().is_updating(&self.uid) {
      return ItemState::Updating;
    }
    match self.lock_flags().mode {
      Mode::Idle => ItemState::Idle,
      Mode::PendingDelete => ItemState::PendingDelete,
      Mode::Editing { kind, .. } => ItemState::Editing(kind),
    }
  }

  pub fn is_dragging(&self) -> bool {
    self.lock_flags().dragging
  }

  pub fn set_dragging(&self, dragging: bool) {
    self.lock_flags().dragging = dragging;
  }

  pub fn is_menu_open(&self) -> bool {
    self.lock_flags().menu_open
  }

  pub fn set_menu_open(&self, open: bool) {
    self.lock_flags().menu_open = open;
  }

  /// An enable/disable is in flight.
  pub fn is_toggling(&self) -> bool {
    self.lock_flags().toggling
  }

  pub async fn record(&self) -> ProfileResult<ProfileRecord> {
    self.session.store().find(&self.uid).await
  }

  pub async fn card(&self) -> ProfileResult<ProfileCard> {
    Ok(ProfileCard::build(&self.record().await?, now_secs()))
  }

  pub async fn menu(&self) -> ProfileResult<Vec<MenuAction>> {
    let snapshot = self.session.store().current_snapshot().await?;
    let record = snapshot
      .find(&self.uid)
      .ok_or_else(|| ProfileError::NotFound(self.uid.clone()))?;
    let enabled = snapshot.chain.iter().any(|uid| uid == &self.uid);
    Ok(menu_for(record, enabled))
  }

  /// Runs a menu entry. The menu closes first, whatever the action does.
  pub async fn dispatch(&self, action: MenuAction) -> ProfileResult<ItemEvent> {
    self.set_menu_open(false);
    match action {
      MenuAction::Home => self.open_home().await,
      MenuAction::Select => self.select(true),
      MenuAction::EditInfo => self.open_editor(EditorKind::Info),
      MenuAction::EditFile => self.open_editor(EditorKind::File),
      MenuAction::OpenFile => self.open_file().await,
      MenuAction::UpdateDirect => self.update(UpdateMode::Direct).await,
      MenuAction::UpdateProxy => self.update(UpdateMode::PreferProxy).await,
      MenuAction::Delete => self.request_delete(),
      MenuAction::Enable => self.set_enabled(true).await,
      MenuAction::Disable => self.set_enabled(false).await,
    }
  }

  /// Clicking the card selects without force; the menu entry forces.
  /// A running update does not block selection.
  pub fn select(&self, force: bool) -> ProfileResult<ItemEvent> {
    match self.state() {
      ItemState::Idle | ItemState::Updating => {}
      other => {
        return Err(ProfileError::validation(format!(
          "cannot select {} while {other:?}",
          self.uid
        )));
      }
    }
    Ok(ItemEvent::Select {
      uid: self.uid.clone(),
      force,
    })
  }

  pub async fn open_home(&self) -> ProfileResult<ItemEvent> {
    let record = self.record().await?;
    if !record.has_home() {
      return Err(ProfileError::validation(format!(
        "{} has no home page",
        self.uid
      )));
    }
    Ok(ItemEvent::OpenHome(record.home.unwrap_or_default()))
  }

  /// Settles back to idle on its own; a second call while one is running
  /// reports `Suppressed`.
  pub async fn update(&self, mode: UpdateMode) -> ProfileResult<ItemEvent> {
    let mode_now = self.lock_flags().mode;
    if mode_now != Mode::Idle {
      return Err(ProfileError::validation(format!(
        "cannot update {} while {mode_now:?}",
        self.uid
      )));
    }
    let outcome = self.session.coordinator().update(&self.uid, mode).await;
    Ok(ItemEvent::Update(outcome))
  }

  pub async fn open_file(&self) -> ProfileResult<ItemEvent> {
    match self.session.store().commands().view_profile_file(&self.uid).await {
      Ok(()) => Ok(ItemEvent::FileOpened),
      Err(e) => {
        log::warn!("Failed to open profile file {}: {e}", self.uid);
        self.session.notice().error(&e);
        Err(ProfileError::Transport(e))
      }
    }
  }

  pub fn request_delete(&self) -> ProfileResult<ItemEvent> {
    self.transition("delete", Mode::PendingDelete)?;
    Ok(ItemEvent::ConfirmDelete {
      title: DELETE_CONFIRM_TITLE,
      message: DELETE_CONFIRM_MESSAGE,
    })
  }

  pub fn cancel_delete(&self) -> ProfileResult<()> {
    let mut flags = self.lock_flags();
    if flags.mode != Mode::PendingDelete {
      return Err(ProfileError::validation("no delete is pending"));
    }
    flags.mode = Mode::Idle;
    Ok(())
  }

  /// The dialog closes before the call, so a second confirm is rejected.
  /// A failed delete leaves the record in the list.
  pub async fn confirm_delete(&self) -> ProfileResult<ItemEvent> {
    {
      let mut flags = self.lock_flags();
      if flags.mode != Mode::PendingDelete {
        return Err(ProfileError::validation("no delete is pending"));
      }
      flags.mode = Mode::Idle;
    }

    if let Err(e) = self.session.store().commands().delete_profile(&self.uid).await {
      log::error!("Failed to delete profile {}: {e}", self.uid);
      self.session.notice().error(&e);
      return Err(ProfileError::Transport(e));
    }
    log::info!("Deleted profile {}", self.uid);
    self.session.store().invalidate().await?;
    Ok(ItemEvent::Deleted)
  }

  pub fn open_editor(&self, kind: EditorKind) -> ProfileResult<ItemEvent> {
    self.transition("edit", Mode::Editing { kind, saved: false })?;
    Ok(ItemEvent::EditorOpened(kind))
  }

  pub async fn read_file(&self) -> ProfileResult<String> {
    self
      .session
      .store()
      .commands()
      .read_profile_file(&self.uid)
      .await
      .map_err(ProfileError::Transport)
  }

  /// Writes the file editor's content. The reactivation waits until the
  /// editor closes.
  pub async fn save_file(&self, content: &str) -> ProfileResult<()> {
    self.require_editing(EditorKind::File)?;
    if let Err(e) = self
      .session
      .store()
      .commands()
      .save_profile_file(&self.uid, content)
      .await
    {
      self.session.notice().error(&e);
      return Err(ProfileError::Transport(e));
    }
    if let Mode::Editing { saved, .. } = &mut self.lock_flags().mode {
      *saved = true;
    }
    Ok(())
  }

  pub async fn save_info(&self, patch: ProfileInfoPatch) -> ProfileResult<()> {
    self.require_editing(EditorKind::Info)?;
    if let Err(e) = self
      .session
      .store()
      .commands()
      .patch_profile_info(&self.uid, patch)
      .await
    {
      self.session.notice().error(&e);
      return Err(ProfileError::Transport(e));
    }
    self.session.store().invalidate().await
  }

  /// Back to idle. A saved file edit of an active profile reactivates.
  pub async fn close_editor(&self) -> ProfileResult<()> {
    let kind_saved = {
      let mut flags = self.lock_flags();
      let Mode::Editing { kind, saved } = flags.mode else {
        return Err(ProfileError::validation("no editor is open"));
      };
      flags.mode = Mode::Idle;
      (kind, saved)
    };

    if kind_saved == (EditorKind::File, true) {
      self
        .session
        .reactivator()
        .reactivate_if_active(&self.uid)
        .await?;
    }
    Ok(())
  }

  /// Adds or removes an enhanced profile from the chain.
  pub async fn set_enabled(&self, enable: bool) -> ProfileResult<ItemEvent> {
    self.require_idle("toggle")?;
    let store = self.session.store();
    let snapshot = store.current_snapshot().await?;
    let record = snapshot
      .find(&self.uid)
      .ok_or_else(|| ProfileError::NotFound(self.uid.clone()))?;
    if !record.kind.is_enhanced() {
      return Err(ProfileError::validation(format!(
        "{} is not an enhanced profile",
        self.uid
      )));
    }

    let is_enabled = snapshot.chain.iter().any(|uid| uid == &self.uid);
    if is_enabled == enable {
      return Ok(ItemEvent::Toggled { enabled: enable });
    }
    let chain: Vec<String> = if enable {
      let mut chain = snapshot.chain.clone();
      chain.push(self.uid.clone());
      chain
    } else {
      snapshot
        .chain
        .iter()
        .filter(|uid| *uid != &self.uid)
        .cloned()
        .collect()
    };

    let toggling = TogglingGuard::new(&self.flags);
    let result = store.commands().set_chain(&chain).await;
    drop(toggling);

    if let Err(e) = result {
      self.session.notice().error(&e);
      return Err(ProfileError::Transport(e));
    }
    store.invalidate().await?;
    self.session.reactivator().reactivate().await?;
    Ok(ItemEvent::Toggled { enabled: enable })
  }

  fn require_idle(&self, action: &str) -> ProfileResult<()> {
    match self.state() {
      ItemState::Idle => Ok(()),
      other => Err(ProfileError::validation(format!(
        "cannot {action} {} while {other:?}",
        self.uid
      ))),
    }
  }

  fn require_editing(&self, expected: EditorKind) -> ProfileResult<()> {
    match self.lock_flags().mode {
      Mode::Editing { kind, .. } if kind == expected => Ok(()),
      _ => Err(ProfileError::validation(format!(
        "the {expected:?} editor is not open"
      ))),
    }
  }

  fn transition(&self, action: &str, to: Mode) -> ProfileResult<()> {
    let updating = self.session.coordinator().is_updating(&self.uid);
    let mut flags = self.lock_flags();
    if updating || flags.mode != Mode::Idle {
      let state = if updating {
        "updating".to_string()
      } else {
        format!("{:?}", flags.mode)
      };
      return Err(ProfileError::validation(format!(
        "cannot {action} {} while {state}",
        self.uid
      )));
    }
    flags.mode = to;
    Ok(())
  }

  fn lock_flags(&self) -> MutexGuard<'_, ItemFlags> {
    self.flags.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::commands::mock::MockCommands;
  use crate::events::notice::mock::RecordingNotice;
  use crate::profile::ProfileKind;
  use crate::settings_manager::SettingsManager;
  use tempfile::TempDir;

  struct Fixture {
    mock: Arc<MockCommands>,
    notice: Arc<RecordingNotice>,
    session: Arc<AppSession>,
    _dir: TempDir,
  }

  fn fixture(current: Option<&str>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let mock = MockCommands::with_items(
      vec![
        ProfileRecord::new("R", "Remote", ProfileKind::Remote).with_url("https://e.com/sub"),
        ProfileRecord::new("B", "B", ProfileKind::Local),
        ProfileRecord::new("C", "C", ProfileKind::Local),
        ProfileRecord::new("M", "M", ProfileKind::Merge),
      ],
      current,
    );
    let notice = Arc::new(RecordingNotice::default());
    let session = Arc::new(AppSession::new(
      mock.clone(),
      notice.clone(),
      Arc::new(SettingsManager::with_dir(dir.path().to_path_buf())),
    ));
    Fixture {
      mock,
      notice,
      session,
      _dir: dir,
    }
  }

  #[tokio::test]
  async fn test_delete_flow() {
    let f = fixture(None);
    let item = f.session.item("C");

    assert_eq!(
      item.request_delete().unwrap(),
      ItemEvent::ConfirmDelete {
        title: "Confirm deletion",
        message: "This operation is not reversible"
      }
    );
    assert_eq!(item.state(), ItemState::PendingDelete);
    assert!(item.open_editor(EditorKind::File).is_err());

    item.cancel_delete().unwrap();
    assert_eq!(item.state(), ItemState::Idle);
    assert_eq!(f.mock.count("delete_profile"), 0);

    item.request_delete().unwrap();
    assert_eq!(item.confirm_delete().await.unwrap(), ItemEvent::Deleted);
    assert!(item.confirm_delete().await.is_err());
    assert_eq!(f.mock.count("delete_profile"), 1);

    let uids = f.session.store().current_snapshot().await.unwrap().uids();
    assert_eq!(uids, vec!["R", "B", "M"]);
  }

  #[tokio::test]
  async fn test_failed_delete_keeps_record() {
    let f = fixture(None);
    *f.mock.fail_delete.lock().unwrap() = Some("permission denied".to_string());
    let item = f.session.item("B");

    item.request_delete().unwrap();
    assert!(item.confirm_delete().await.is_err());

    assert_eq!(f.notice.errors(), vec!["permission denied".to_string()]);
    assert_eq!(item.state(), ItemState::Idle);
    assert!(item.record().await.is_ok());
  }

  #[tokio::test]
  async fn test_saving_active_file_reactivates_once() {
    let f = fixture(Some("B"));

    let active = f.session.item("B");
    active.open_editor(EditorKind::File).unwrap();
    active.save_file("proxies: []").await.unwrap();
    active.save_file("proxies: [a]").await.unwrap();
    active.close_editor().await.unwrap();
    assert_eq!(f.mock.count("reactivate_configuration"), 1);

    let other = f.session.item("C");
    other.open_editor(EditorKind::File).unwrap();
    other.save_file("proxies: []").await.unwrap();
    other.close_editor().await.unwrap();
    assert_eq!(f.mock.count("reactivate_configuration"), 1);
  }

  #[tokio::test]
  async fn test_closing_without_saving_does_not_reactivate() {
    let f = fixture(Some("B"));
    let item = f.session.item("B");

    item.open_editor(EditorKind::File).unwrap();
    assert_eq!(item.state(), ItemState::Editing(EditorKind::File));
    item.close_editor().await.unwrap();

    assert_eq!(f.mock.count("reactivate_configuration"), 0);
    assert!(item.close_editor().await.is_err());
  }

  #[tokio::test]
  async fn test_save_requires_matching_editor() {
    let f = fixture(None);
    let item = f.session.item("B");

    assert!(item.save_file("x").await.is_err());
    item.open_editor(EditorKind::Info).unwrap();
    assert!(item.save_file("x").await.is_err());
    item
      .save_info(ProfileInfoPatch {
        name: Some("Renamed".to_string()),
        ..Default::default()
      })
      .await
      .unwrap();
    item.close_editor().await.unwrap();

    assert_eq!(item.record().await.unwrap().name, "Renamed");
  }

  #[tokio::test]
  async fn test_dispatch_update_and_menu() {
    let f = fixture(None);
    let item = f.session.item("R");
    item.set_menu_open(true);

    let menu = item.menu().await.unwrap();
    assert!(menu.contains(&MenuAction::UpdateProxy));

    let event = item.dispatch(MenuAction::UpdateProxy).await.unwrap();
    assert_eq!(event, ItemEvent::Update(UpdateOutcome::Updated));
    assert!(!item.is_menu_open());
    assert_eq!(item.state(), ItemState::Idle);
    assert_eq!(f.mock.count("update_profile"), 1);
  }

  #[tokio::test]
  async fn test_select_and_dragging_overlay() {
    let f = fixture(None);
    let item = f.session.item("B");

    item.set_dragging(true);
    assert_eq!(item.state(), ItemState::Idle);
    assert_eq!(
      item.select(false).unwrap(),
      ItemEvent::Select {
        uid: "B".to_string(),
        force: false
      }
    );
    assert_eq!(
      item.dispatch(MenuAction::Select).await.unwrap(),
      ItemEvent::Select {
        uid: "B".to_string(),
        force: true
      }
    );
    assert!(item.is_dragging());
  }

  #[tokio::test]
  async fn test_enable_disable_enhanced() {
    let f = fixture(Some("B"));
    let item = f.session.item("M");

    assert_eq!(item.menu().await.unwrap()[0], MenuAction::Enable);
    assert_eq!(
      item.dispatch(MenuAction::Enable).await.unwrap(),
      ItemEvent::Toggled { enabled: true }
    );
    assert_eq!(f.mock.list.lock().unwrap().chain, vec!["M".to_string()]);
    assert_eq!(item.menu().await.unwrap()[0], MenuAction::Disable);

    item.set_enabled(false).await.unwrap();
    assert!(f.mock.list.lock().unwrap().chain.is_empty());
    assert_eq!(f.mock.count("reactivate_configuration"), 2);
    assert!(!item.is_toggling());

    let local = f.session.item("B");
    assert!(matches!(
      local.set_enabled(true).await,
      Err(ProfileError::Validation(_))
    ));
  }

  #[tokio::test]
  async fn test_select_while_updating() {
    let f = fixture(None);
    let item = f.session.item("R");
    let gate = f.mock.hold_updates();

    let update = tokio::spawn({
      let session = f.session.clone();
      async move { session.coordinator().update("R", UpdateMode::Direct).await }
    });
    while f.mock.count("update_profile") == 0 {
      tokio::task::yield_now().await;
    }
    assert_eq!(item.state(), ItemState::Updating);
    assert_eq!(
      item.select(false).unwrap(),
      ItemEvent::Select {
        uid: "R".to_string(),
        force: false
      }
    );

    gate.notify_one();
    assert_eq!(update.await.unwrap(), UpdateOutcome::Updated);

    item.request_delete().unwrap();
    assert!(matches!(item.select(false), Err(ProfileError::Validation(_))));
  }

  #[tokio::test]
  async fn test_dropped_toggle_clears_flag() {
    let f = fixture(Some("B"));
    let item = f.session.item("M");
    let _gate = f.mock.hold_chain_writes();

    let timed_out = tokio::time::timeout(
      std::time::Duration::from_millis(50),
      item.set_enabled(true),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(f.mock.count("set_chain"), 1);
    assert!(!item.is_toggling());
  }

  #[tokio::test]
  async fn test_toggle_requires_idle() {
    let f = fixture(Some("B"));
    let item = f.session.item("M");

    item.request_delete().unwrap();
    assert!(matches!(
      item.set_enabled(true).await,
      Err(ProfileError::Validation(_))
    ));
    assert_eq!(f.mock.count("set_chain"), 0);
  }

  #[tokio::test]
  async fn test_open_file_failure_is_shown() {
    let f = fixture(None);
    let item = f.session.item("B");
    assert_eq!(item.open_file().await.unwrap(), ItemEvent::FileOpened);
    assert!(f.notice.errors().is_empty());

    assert!(matches!(
      item.open_home().await,
      Err(ProfileError::Validation(_))
    ));
  }
}
