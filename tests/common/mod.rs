#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;
use verge_profiles_lib::events::{Notice, NoticeKind};
use verge_profiles_lib::profile::{ProfileInfoPatch, ProfileList, ProfileRecord, RoutingOption};
use verge_profiles_lib::settings_manager::SettingsManager;
use verge_profiles_lib::{AppSession, CommandResult, ProfileCommands};

/// In-memory command layer for driving a whole session.
#[derive(Default)]
pub struct InMemoryCommands {
  pub list: Mutex<ProfileList>,
  pub calls: Mutex<HashMap<&'static str, usize>>,
  pub update_options: Mutex<Vec<Option<RoutingOption>>>,
  pub update_error: Mutex<Option<String>>,
  pub update_gate: Mutex<Option<Arc<Notify>>>,
  pub clock: AtomicU64,
}

impl InMemoryCommands {
  pub fn new(items: Vec<ProfileRecord>, current: Option<&str>, chain: &[&str]) -> Arc<Self> {
    let commands = Self::default();
    *commands.list.lock().unwrap() = ProfileList {
      current: current.map(str::to_string),
      chain: chain.iter().map(|uid| uid.to_string()).collect(),
      items,
    };
    commands.clock.store(1_700_000_000, Ordering::SeqCst);
    Arc::new(commands)
  }

  pub fn count(&self, name: &str) -> usize {
    self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
  }

  pub fn hold_updates(&self) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    *self.update_gate.lock().unwrap() = Some(gate.clone());
    gate
  }

  fn record(&self, name: &'static str) {
    *self.calls.lock().unwrap().entry(name).or_insert(0) += 1;
  }
}

#[async_trait]
impl ProfileCommands for InMemoryCommands {
  async fn fetch_profile_list(&self) -> CommandResult<ProfileList> {
    self.record("fetch_profile_list");
    Ok(self.list.lock().unwrap().clone())
  }

  async fn update_profile(&self, uid: &str, option: Option<RoutingOption>) -> CommandResult<()> {
    self.record("update_profile");
    self.update_options.lock().unwrap().push(option);
    let gate = self.update_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.notified().await;
    }
    if let Some(message) = self.update_error.lock().unwrap().clone() {
      return Err(message);
    }
    let now = self.clock.fetch_add(3600, Ordering::SeqCst) + 3600;
    let mut list = self.list.lock().unwrap();
    let record = list.find_mut(uid).ok_or_else(|| format!("{uid} missing"))?;
    record.updated = now;
    Ok(())
  }

  async fn delete_profile(&self, uid: &str) -> CommandResult<()> {
    self.record("delete_profile");
    let mut list = self.list.lock().unwrap();
    list.items.retain(|item| item.uid != uid);
    list.chain.retain(|item| item != uid);
    Ok(())
  }

  async fn view_profile_file(&self, _uid: &str) -> CommandResult<()> {
    self.record("view_profile_file");
    Ok(())
  }

  async fn reactivate_configuration(&self) -> CommandResult<()> {
    self.record("reactivate_configuration");
    Ok(())
  }

  async fn reorder_profiles(&self, ordered_uids: &[String]) -> CommandResult<()> {
    self.record("reorder_profiles");
    let mut list = self.list.lock().unwrap();
    let mut items = Vec::new();
    for uid in ordered_uids {
      items.push(list.find(uid).cloned().ok_or_else(|| format!("{uid} missing"))?);
    }
    list.items = items;
    Ok(())
  }

  async fn select_profile(&self, uid: &str) -> CommandResult<()> {
    self.record("select_profile");
    self.list.lock().unwrap().current = Some(uid.to_string());
    Ok(())
  }

  async fn set_chain(&self, uids: &[String]) -> CommandResult<()> {
    self.record("set_chain");
    self.list.lock().unwrap().chain = uids.to_vec();
    Ok(())
  }

  async fn read_profile_file(&self, _uid: &str) -> CommandResult<String> {
    self.record("read_profile_file");
    Ok(String::new())
  }

  async fn save_profile_file(&self, _uid: &str, _content: &str) -> CommandResult<()> {
    self.record("save_profile_file");
    Ok(())
  }

  async fn patch_profile_info(&self, _uid: &str, _patch: ProfileInfoPatch) -> CommandResult<()> {
    self.record("patch_profile_info");
    Ok(())
  }
}

#[derive(Default)]
pub struct RecordingNotice {
  pub shown: Mutex<Vec<(NoticeKind, String)>>,
}

impl RecordingNotice {
  pub fn errors(&self) -> Vec<String> {
    self
      .shown
      .lock()
      .unwrap()
      .iter()
      .filter(|(kind, _)| *kind == NoticeKind::Error)
      .map(|(_, message)| message.clone())
      .collect()
  }
}

impl Notice for RecordingNotice {
  fn show(&self, kind: NoticeKind, message: &str) {
    self.shown.lock().unwrap().push((kind, message.to_string()));
  }
}

pub struct TestSession {
  pub session: Arc<AppSession>,
  pub notice: Arc<RecordingNotice>,
  pub settings: Arc<SettingsManager>,
  pub temp_dir: TempDir,
}

pub fn session_over(commands: Arc<dyn ProfileCommands>) -> TestSession {
  let temp_dir = TempDir::new().expect("Failed to create temp directory");
  let settings = Arc::new(SettingsManager::with_dir(temp_dir.path().join("settings")));
  let notice = Arc::new(RecordingNotice::default());
  let session = Arc::new(AppSession::new(commands, notice.clone(), settings.clone()));
  TestSession {
    session,
    notice,
    settings,
    temp_dir,
  }
}
