use super::opener::open_path;
use super::subscription::{
  parse_filename, parse_userinfo, validate_merge_yaml, validate_profile_yaml, DISPOSITION_HEADER,
  HOME_HEADER, USERINFO_HEADER,
};
use super::BackendError;
use crate::commands::{CommandResult, ProfileCommands};
use crate::events::{EventEmitter, NOTICE_MESSAGE, REFRESH_CLASH_CONFIG};
use crate::profile::display::now_secs;
use crate::profile::types::default_profile_name;
use crate::profile::{
  ProfileExtra, ProfileInfoPatch, ProfileKind, ProfileList, ProfileRecord, RoutingOption,
};
use crate::settings_manager::{AppSettings, SettingsManager};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::fs::{self, create_dir_all};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// What a subscription fetch produced, already validated.
#[derive(Debug, Clone)]
struct Fetched {
  content: String,
  extra: Option<ProfileExtra>,
  home: Option<String>,
  filename: Option<String>,
}

/// Keeps profiles in a data directory:
///
/// ```text
/// <data_dir>/profiles.json       index: order, current, chain
/// <data_dir>/profiles/<uid>.yaml  profile files (.js for scripts)
/// ```
pub struct LocalBackend {
  data_dir: PathBuf,
  settings: Arc<SettingsManager>,
  emitter: Arc<dyn EventEmitter>,
  // Serializes read-modify-write of the index.
  index_lock: Mutex<()>,
}

impl LocalBackend {
  pub fn new(
    data_dir: PathBuf,
    settings: Arc<SettingsManager>,
    emitter: Arc<dyn EventEmitter>,
  ) -> Self {
    Self {
      data_dir,
      settings,
      emitter,
      index_lock: Mutex::new(()),
    }
  }

  pub fn with_default_dirs(settings: Arc<SettingsManager>, emitter: Arc<dyn EventEmitter>) -> Self {
    Self::new(crate::app_dirs::data_dir(), settings, emitter)
  }

  pub fn profiles_dir(&self) -> PathBuf {
    self.data_dir.join("profiles")
  }

  pub fn index_path(&self) -> PathBuf {
    self.data_dir.join("profiles.json")
  }

  pub fn file_path(&self, record: &ProfileRecord) -> PathBuf {
    self.profiles_dir().join(record.file_name())
  }

  pub fn load_list(&self) -> Result<ProfileList, BackendError> {
    let path = self.index_path();
    if !path.exists() {
      return Ok(ProfileList::default());
    }
    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
  }

  fn save_list(&self, list: &ProfileList) -> Result<(), BackendError> {
    create_dir_all(&self.data_dir)?;
    let json = serde_json::to_string_pretty(list)?;
    fs::write(self.index_path(), json)?;
    Ok(())
  }

  fn write_profile_file(&self, record: &ProfileRecord, content: &str) -> Result<(), BackendError> {
    create_dir_all(self.profiles_dir())?;
    fs::write(self.file_path(record), content)?;
    Ok(())
  }

  fn find_record(&self, uid: &str) -> Result<ProfileRecord, BackendError> {
    self
      .load_list()?
      .find(uid)
      .cloned()
      .ok_or_else(|| BackendError::NotFound(uid.to_string()))
  }

  fn current_settings(&self) -> AppSettings {
    match self.settings.load_settings() {
      Ok(settings) => settings,
      Err(e) => {
        log::warn!("Failed to load settings, using defaults: {e}");
        AppSettings::default()
      }
    }
  }

  fn build_client(&self, option: RoutingOption) -> Result<Client, BackendError> {
    let settings = self.current_settings();
    let mut builder = Client::builder()
      .user_agent(settings.user_agent.clone())
      .timeout(Duration::from_secs(settings.fetch_timeout_secs));

    let option = option.normalized();
    if option.self_proxy {
      let proxy = reqwest::Proxy::all(format!("http://127.0.0.1:{}", settings.mixed_port))?;
      builder = builder.proxy(proxy);
    } else if !option.with_proxy {
      builder = builder.no_proxy();
    }
    // with_proxy alone keeps reqwest's system proxy detection

    Ok(builder.build()?)
  }

  async fn fetch(&self, url: &str, option: RoutingOption) -> Result<Fetched, BackendError> {
    let client = self.build_client(option)?;
    log::debug!("Fetching subscription {url} with {option:?}");

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(BackendError::Status(status.as_u16()));
    }

    let headers = response.headers();
    let extra = header_str(headers, USERINFO_HEADER).and_then(parse_userinfo);
    let home = header_str(headers, HOME_HEADER).map(str::to_string);
    let filename = header_str(headers, DISPOSITION_HEADER).and_then(parse_filename);

    let content = response.text().await?;
    validate_profile_yaml(&content)?;

    Ok(Fetched {
      content,
      extra,
      home,
      filename,
    })
  }

  /// Fetches `url` and adds it as a new remote profile. The first ordinary
  /// profile becomes current.
  pub async fn import_remote(
    &self,
    url: &str,
    name: Option<String>,
    option: Option<RoutingOption>,
  ) -> Result<ProfileRecord, BackendError> {
    let parsed =
      url::Url::parse(url).map_err(|e| BackendError::Invalid(format!("invalid url {url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
      return Err(BackendError::Invalid(format!(
        "unsupported url scheme {}",
        parsed.scheme()
      )));
    }

    let fetched = self.fetch(url, option.unwrap_or_default()).await?;

    let mut record = ProfileRecord::new(
      new_uid(ProfileKind::Remote),
      name
        .or(fetched.filename)
        .unwrap_or_else(default_profile_name),
      ProfileKind::Remote,
    )
    .with_url(url);
    record.home = fetched.home;
    record.extra = fetched.extra;
    record.updated = now_secs();
    record.option = option;

    self.insert(record, &fetched.content).await
  }

  /// Creates a local, merge or script profile from `content`.
  pub async fn create_local(
    &self,
    kind: ProfileKind,
    name: &str,
    content: &str,
  ) -> Result<ProfileRecord, BackendError> {
    match kind {
      ProfileKind::Remote => {
        return Err(BackendError::Invalid(
          "remote profiles are created by importing a url".to_string(),
        ))
      }
      ProfileKind::Local => validate_profile_yaml(content)?,
      ProfileKind::Merge => validate_merge_yaml(content)?,
      ProfileKind::Script => {}
    }

    let mut record = ProfileRecord::new(new_uid(kind), name, kind);
    record.updated = now_secs();
    self.insert(record, content).await
  }

  async fn insert(&self, record: ProfileRecord, content: &str) -> Result<ProfileRecord, BackendError> {
    let _guard = self.index_lock.lock().await;
    let mut list = self.load_list()?;
    self.write_profile_file(&record, content)?;
    if list.current.is_none() && !record.kind.is_enhanced() {
      list.current = Some(record.uid.clone());
    }
    list.items.push(record.clone());
    self.save_list(&list)?;
    log::info!("Created {:?} profile {} ({})", record.kind, record.uid, record.name);
    Ok(record)
  }

  async fn update_remote(&self, uid: &str, option: Option<RoutingOption>) -> Result<(), BackendError> {
    let record = self.find_record(uid)?;
    let url = match (&record.kind, &record.url) {
      (ProfileKind::Remote, Some(url)) if !url.is_empty() => url.clone(),
      _ => {
        return Err(BackendError::Invalid(format!(
          "only remote profiles can be updated, {uid} is {:?}",
          record.kind
        )))
      }
    };
    // The override applies to this fetch only; the stored option stays.
    let routing = option.unwrap_or_else(|| record.routing()).normalized();

    let fetched = self.fetch(&url, routing).await?;

    let _guard = self.index_lock.lock().await;
    let mut list = self.load_list()?;
    let Some(stored) = list.find_mut(uid) else {
      return Err(BackendError::NotFound(uid.to_string()));
    };
    stored.extra = fetched.extra;
    if fetched.home.is_some() {
      stored.home = fetched.home;
    }
    stored.updated = now_secs();
    let stored = stored.clone();

    self.write_profile_file(&stored, &fetched.content)?;
    self.save_list(&list)?;
    log::info!("Updated profile {uid} from {url}");
    Ok(())
  }

  async fn delete(&self, uid: &str) -> Result<(), BackendError> {
    let _guard = self.index_lock.lock().await;
    let mut list = self.load_list()?;
    let position = list
      .position(uid)
      .ok_or_else(|| BackendError::NotFound(uid.to_string()))?;
    let record = list.items.remove(position);
    list.chain.retain(|c| c != uid);
    if list.current.as_deref() == Some(uid) {
      list.current = list
        .items
        .iter()
        .find(|item| !item.kind.is_enhanced())
        .map(|item| item.uid.clone());
    }
    self.save_list(&list)?;

    match fs::remove_file(self.file_path(&record)) {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => log::warn!("Deleted profile {uid} but could not remove its file: {e}"),
    }
    log::info!("Deleted profile {uid}");
    Ok(())
  }

  async fn reorder(&self, ordered_uids: &[String]) -> Result<(), BackendError> {
    let _guard = self.index_lock.lock().await;
    let mut list = self.load_list()?;

    let existing: HashSet<&str> = list.items.iter().map(|item| item.uid.as_str()).collect();
    let requested: HashSet<&str> = ordered_uids.iter().map(String::as_str).collect();
    if ordered_uids.len() != list.items.len() || requested != existing {
      return Err(BackendError::Invalid(
        "new order is not a permutation of the profile list".to_string(),
      ));
    }

    let rank: HashMap<&str, usize> = ordered_uids
      .iter()
      .enumerate()
      .map(|(i, uid)| (uid.as_str(), i))
      .collect();
    list
      .items
      .sort_by_key(|item| rank.get(item.uid.as_str()).copied().unwrap_or(usize::MAX));
    self.save_list(&list)
  }

  async fn select(&self, uid: &str) -> Result<(), BackendError> {
    let _guard = self.index_lock.lock().await;
    let mut list = self.load_list()?;
    let record = list
      .find(uid)
      .ok_or_else(|| BackendError::NotFound(uid.to_string()))?;
    if record.kind.is_enhanced() {
      return Err(BackendError::Invalid(format!(
        "{uid} is an enhanced profile and cannot be current"
      )));
    }
    list.current = Some(uid.to_string());
    self.save_list(&list)
  }

  async fn replace_chain(&self, uids: &[String]) -> Result<(), BackendError> {
    let _guard = self.index_lock.lock().await;
    let mut list = self.load_list()?;
    let mut seen = HashSet::new();
    for uid in uids {
      let record = list
        .find(uid)
        .ok_or_else(|| BackendError::NotFound(uid.to_string()))?;
      if !record.kind.is_enhanced() {
        return Err(BackendError::Invalid(format!(
          "{uid} is not an enhanced profile"
        )));
      }
      if !seen.insert(uid.as_str()) {
        return Err(BackendError::Invalid(format!("{uid} appears twice in the chain")));
      }
    }
    list.chain = uids.to_vec();
    self.save_list(&list)
  }

  async fn patch_info(&self, uid: &str, patch: ProfileInfoPatch) -> Result<(), BackendError> {
    let _guard = self.index_lock.lock().await;
    let mut list = self.load_list()?;
    let record = list
      .find_mut(uid)
      .ok_or_else(|| BackendError::NotFound(uid.to_string()))?;

    if let Some(name) = patch.name {
      if name.trim().is_empty() {
        return Err(BackendError::Invalid("name cannot be empty".to_string()));
      }
      record.name = name;
    }
    if let Some(desc) = patch.desc {
      record.desc = (!desc.is_empty()).then_some(desc);
    }
    if let Some(url) = patch.url {
      if record.kind != ProfileKind::Remote {
        return Err(BackendError::Invalid(format!("{uid} has no subscription url")));
      }
      url::Url::parse(&url).map_err(|e| BackendError::Invalid(format!("invalid url {url}: {e}")))?;
      record.url = Some(url);
    }
    if let Some(option) = patch.option {
      record.option = Some(option.normalized());
    }
    self.save_list(&list)
  }

  /// Checks that the current profile and every enabled enhanced profile
  /// can be composed.
  fn check_active_configuration(&self) -> Result<(), BackendError> {
    let list = self.load_list()?;

    match list.current.as_deref().and_then(|uid| list.find(uid)) {
      Some(current) => validate_profile_yaml(&fs::read_to_string(self.file_path(current))?)?,
      None => log::debug!("No current profile, nothing to validate"),
    }

    for uid in &list.chain {
      let Some(record) = list.find(uid) else {
        log::warn!("Chain refers to missing profile {uid}, skipping");
        continue;
      };
      let content = fs::read_to_string(self.file_path(record))?;
      if record.kind == ProfileKind::Merge {
        validate_merge_yaml(&content)?;
      }
    }
    Ok(())
  }

  fn emit_status(&self, code: &str, message: &str) {
    if let Err(e) = self
      .emitter
      .emit_value(NOTICE_MESSAGE, serde_json::json!([code, message]))
    {
      log::warn!("Failed to emit {code}: {e}");
    }
  }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers.get(name).and_then(|value| value.to_str().ok())
}

fn new_uid(kind: ProfileKind) -> String {
  let prefix = match kind {
    ProfileKind::Remote => 'r',
    ProfileKind::Local => 'l',
    ProfileKind::Merge => 'm',
    ProfileKind::Script => 's',
  };
  let id = Uuid::new_v4().simple().to_string();
  format!("{prefix}{}", &id[..12])
}

#[async_trait]
impl ProfileCommands for LocalBackend {
  async fn fetch_profile_list(&self) -> CommandResult<ProfileList> {
    self.load_list().map_err(|e| e.to_string())
  }

  async fn update_profile(&self, uid: &str, option: Option<RoutingOption>) -> CommandResult<()> {
    self
      .update_remote(uid, option)
      .await
      .map_err(|e| e.to_string())
  }

  async fn delete_profile(&self, uid: &str) -> CommandResult<()> {
    self.delete(uid).await.map_err(|e| e.to_string())
  }

  async fn view_profile_file(&self, uid: &str) -> CommandResult<()> {
    let record = self.find_record(uid).map_err(|e| e.to_string())?;
    let path = self.file_path(&record);
    if !path.exists() {
      return Err(format!("Profile file not found: {}", path.display()));
    }
    open_path(&path).map_err(|e| format!("Failed to open {}: {e}", path.display()))
  }

  async fn reactivate_configuration(&self) -> CommandResult<()> {
    match self.check_active_configuration() {
      Ok(()) => {
        self.emit_status("set_config::ok", "");
        if let Err(e) = self
          .emitter
          .emit_value(REFRESH_CLASH_CONFIG, serde_json::Value::Null)
        {
          log::warn!("Failed to emit config refresh: {e}");
        }
        Ok(())
      }
      Err(e) => {
        let message = e.to_string();
        self.emit_status("set_config::error", &message);
        Err(message)
      }
    }
  }

  async fn reorder_profiles(&self, ordered_uids: &[String]) -> CommandResult<()> {
    self.reorder(ordered_uids).await.map_err(|e| e.to_string())
  }

  async fn select_profile(&self, uid: &str) -> CommandResult<()> {
    self.select(uid).await.map_err(|e| e.to_string())
  }

  async fn set_chain(&self, uids: &[String]) -> CommandResult<()> {
    self.replace_chain(uids).await.map_err(|e| e.to_string())
  }

  async fn read_profile_file(&self, uid: &str) -> CommandResult<String> {
    let record = self.find_record(uid).map_err(|e| e.to_string())?;
    fs::read_to_string(self.file_path(&record)).map_err(|e| format!("Failed to read profile {uid}: {e}"))
  }

  async fn save_profile_file(&self, uid: &str, content: &str) -> CommandResult<()> {
    let record = self.find_record(uid).map_err(|e| e.to_string())?;
    self
      .write_profile_file(&record, content)
      .map_err(|e| e.to_string())
  }

  async fn patch_profile_info(&self, uid: &str, patch: ProfileInfoPatch) -> CommandResult<()> {
    self.patch_info(uid, patch).await.map_err(|e| e.to_string())
  }
}
