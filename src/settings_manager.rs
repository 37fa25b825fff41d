use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
  #[serde(default)]
  pub enable_keep_ui_active: bool, // hide the window on close instead of quitting
  #[serde(default)]
  pub language: Option<String>,
  #[serde(default)]
  pub start_page: Option<String>,
  #[serde(default = "default_mixed_port")]
  pub mixed_port: u16, // local proxy port used for self-proxied subscription fetches
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
  #[serde(default = "default_fetch_timeout_secs")]
  pub fetch_timeout_secs: u64,
}

fn default_mixed_port() -> u16 {
  7897
}

fn default_user_agent() -> String {
  format!("verge-profiles/{}", env!("CARGO_PKG_VERSION"))
}

fn default_fetch_timeout_secs() -> u64 {
  30
}

impl Default for AppSettings {
  fn default() -> Self {
    Self {
      enable_keep_ui_active: false,
      language: None,
      start_page: None,
      mixed_port: default_mixed_port(),
      user_agent: default_user_agent(),
      fetch_timeout_secs: default_fetch_timeout_secs(),
    }
  }
}

/// Partial update applied by `patch_settings`; `None` leaves a field alone.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SettingsPatch {
  #[serde(default)]
  pub enable_keep_ui_active: Option<bool>,
  #[serde(default)]
  pub language: Option<String>,
  #[serde(default)]
  pub start_page: Option<String>,
  #[serde(default)]
  pub mixed_port: Option<u16>,
  #[serde(default)]
  pub user_agent: Option<String>,
  #[serde(default)]
  pub fetch_timeout_secs: Option<u64>,
}

impl SettingsPatch {
  fn apply(self, settings: &mut AppSettings) {
    if let Some(keep) = self.enable_keep_ui_active {
      settings.enable_keep_ui_active = keep;
    }
    if let Some(language) = self.language {
      settings.language = Some(language);
    }
    if let Some(start_page) = self.start_page {
      settings.start_page = Some(start_page);
    }
    if let Some(port) = self.mixed_port {
      settings.mixed_port = port;
    }
    if let Some(user_agent) = self.user_agent {
      settings.user_agent = user_agent;
    }
    if let Some(timeout) = self.fetch_timeout_secs {
      settings.fetch_timeout_secs = timeout;
    }
  }
}

pub struct SettingsManager {
  settings_dir: PathBuf,
  // Serializes read-modify-write in patch_settings.
  write_lock: Mutex<()>,
}

impl Default for SettingsManager {
  fn default() -> Self {
    Self::new()
  }
}

impl SettingsManager {
  pub fn new() -> Self {
    Self::with_dir(crate::app_dirs::settings_dir())
  }

  pub fn with_dir(settings_dir: PathBuf) -> Self {
    Self {
      settings_dir,
      write_lock: Mutex::new(()),
    }
  }

  pub fn get_settings_dir(&self) -> PathBuf {
    self.settings_dir.clone()
  }

  pub fn get_settings_file(&self) -> PathBuf {
    self.settings_dir.join("app_settings.json")
  }

  pub fn load_settings(&self) -> Result<AppSettings, Box<dyn std::error::Error>> {
    let settings_file = self.get_settings_file();

    if !settings_file.exists() {
      return Ok(AppSettings::default());
    }

    let content = fs::read_to_string(&settings_file)?;

    // serde fills missing fields with their defaults
    match serde_json::from_str::<AppSettings>(&content) {
      Ok(settings) => {
        // Write back so the file lists every field
        if let Err(e) = self.save_settings(&settings) {
          log::warn!("Failed to update settings file with defaults: {e}");
        }
        Ok(settings)
      }
      Err(e) => {
        log::warn!("Failed to parse settings file, using defaults: {e}");
        let default_settings = AppSettings::default();

        if let Err(save_error) = self.save_settings(&default_settings) {
          log::warn!("Failed to save default settings: {save_error}");
        }

        Ok(default_settings)
      }
    }
  }

  pub fn save_settings(&self, settings: &AppSettings) -> Result<(), Box<dyn std::error::Error>> {
    create_dir_all(&self.settings_dir)?;

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(self.get_settings_file(), json)?;

    Ok(())
  }

  /// Applies `patch` on top of the stored settings and saves the result.
  pub fn patch_settings(
    &self,
    patch: SettingsPatch,
  ) -> Result<AppSettings, Box<dyn std::error::Error>> {
    let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
    let mut settings = self.load_settings()?;
    patch.apply(&mut settings);
    self.save_settings(&settings)?;
    log::info!("Settings updated");
    Ok(settings)
  }
}
