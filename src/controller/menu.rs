use crate::profile::{ProfileKind, ProfileRecord};

/// Every context-menu entry a profile card can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
  Home,
  Select,
  EditInfo,
  EditFile,
  OpenFile,
  UpdateDirect,
  UpdateProxy,
  Delete,
  Enable,
  Disable,
}

impl MenuAction {
  pub fn label(&self) -> &'static str {
    match self {
      MenuAction::Home => "Home",
      MenuAction::Select => "Select",
      MenuAction::EditInfo => "Edit Info",
      MenuAction::EditFile => "Edit File",
      MenuAction::OpenFile => "Open File",
      MenuAction::UpdateDirect => "Update",
      MenuAction::UpdateProxy => "Update(Proxy)",
      MenuAction::Delete => "Delete",
      MenuAction::Enable => "Enable",
      MenuAction::Disable => "Disable",
    }
  }

  /// Rendered in the error colour.
  pub fn is_destructive(&self) -> bool {
    matches!(self, MenuAction::Delete)
  }

  /// Disabled while an update for the same profile is in flight.
  pub fn needs_update_lock(&self) -> bool {
    matches!(self, MenuAction::UpdateDirect | MenuAction::UpdateProxy)
  }
}

/// Menu for `record`. `enabled` is whether an enhanced profile is in the
/// chain; ordinary profiles ignore it.
pub fn menu_for(record: &ProfileRecord, enabled: bool) -> Vec<MenuAction> {
  use MenuAction::*;

  match record.kind {
    ProfileKind::Remote if record.has_url() => {
      let mut actions = Vec::with_capacity(8);
      if record.has_home() {
        actions.push(Home);
      }
      actions.extend([
        Select,
        EditInfo,
        EditFile,
        OpenFile,
        UpdateDirect,
        UpdateProxy,
        Delete,
      ]);
      actions
    }
    ProfileKind::Remote | ProfileKind::Local => {
      vec![Select, EditInfo, EditFile, OpenFile, Delete]
    }
    ProfileKind::Script | ProfileKind::Merge => {
      let toggle = if enabled { Disable } else { Enable };
      vec![toggle, EditInfo, EditFile, OpenFile, Delete]
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_remote_menu_with_home() {
    let mut record = ProfileRecord::new("r", "r", ProfileKind::Remote).with_url("https://e.com/s");
    assert_eq!(menu_for(&record, false).len(), 7);
    assert!(!menu_for(&record, false).contains(&MenuAction::Home));

    record.home = Some("https://e.com".to_string());
    let menu = menu_for(&record, false);
    assert_eq!(menu[0], MenuAction::Home);
    assert_eq!(
      menu.iter().map(|a| a.label()).collect::<Vec<_>>(),
      vec![
        "Home",
        "Select",
        "Edit Info",
        "Edit File",
        "Open File",
        "Update",
        "Update(Proxy)",
        "Delete"
      ]
    );
  }

  #[test]
  fn test_local_menu_has_no_remote_items() {
    let mut record = ProfileRecord::new("l", "l", ProfileKind::Local);
    record.home = Some("https://e.com".to_string());
    let menu = menu_for(&record, false);
    assert!(!menu.contains(&MenuAction::Home));
    assert!(!menu.iter().any(|a| a.needs_update_lock()));
    assert_eq!(menu[0], MenuAction::Select);
  }

  #[test]
  fn test_enhanced_menu_toggles() {
    let record = ProfileRecord::new("m", "m", ProfileKind::Merge);
    assert_eq!(menu_for(&record, false)[0], MenuAction::Enable);
    assert_eq!(menu_for(&record, true)[0], MenuAction::Disable);
    assert!(!menu_for(&record, true).contains(&MenuAction::Select));
  }

  #[test]
  fn test_only_delete_is_destructive() {
    let record = ProfileRecord::new("r", "r", ProfileKind::Remote).with_url("https://e.com/s");
    let destructive: Vec<_> = menu_for(&record, false)
      .into_iter()
      .filter(|a| a.is_destructive())
      .collect();
    assert_eq!(destructive, vec![MenuAction::Delete]);
  }
}
