use directories::BaseDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

static BASE_DIRS: OnceLock<Option<BaseDirs>> = OnceLock::new();

fn base_dirs() -> Option<&'static BaseDirs> {
  BASE_DIRS.get_or_init(BaseDirs::new).as_ref()
}

pub fn app_name() -> &'static str {
  if cfg!(debug_assertions) {
    "VergeProfilesDev"
  } else {
    "VergeProfiles"
  }
}

pub fn data_dir() -> PathBuf {
  #[cfg(test)]
  {
    if let Some(dir) = TEST_DATA_DIR.with(|cell| cell.borrow().clone()) {
      return dir;
    }
  }

  if let Ok(dir) = std::env::var("VERGE_PROFILES_DATA_DIR") {
    return PathBuf::from(dir);
  }

  match base_dirs() {
    Some(dirs) => dirs.data_local_dir().join(app_name()),
    None => PathBuf::from(".").join(app_name()),
  }
}

pub fn profiles_dir() -> PathBuf {
  data_dir().join("profiles")
}

pub fn profiles_index() -> PathBuf {
  data_dir().join("profiles.json")
}

pub fn settings_dir() -> PathBuf {
  data_dir().join("settings")
}

#[cfg(test)]
thread_local! {
  static TEST_DATA_DIR: std::cell::RefCell<Option<PathBuf>> = const { std::cell::RefCell::new(None) };
}

#[cfg(test)]
pub struct TestDirGuard;

#[cfg(test)]
impl Drop for TestDirGuard {
  fn drop(&mut self) {
    TEST_DATA_DIR.with(|cell| *cell.borrow_mut() = None);
  }
}

#[cfg(test)]
pub fn set_test_data_dir(dir: PathBuf) -> TestDirGuard {
  TEST_DATA_DIR.with(|cell| *cell.borrow_mut() = Some(dir));
  TestDirGuard
}
