use std::path::Path;
use std::process::Command;

/// Opens `path` with the desktop's default application.
pub fn open_path(path: &Path) -> std::io::Result<()> {
  #[cfg(target_os = "macos")]
  let mut cmd = {
    let mut cmd = Command::new("open");
    cmd.arg(path);
    cmd
  };

  #[cfg(target_os = "windows")]
  let mut cmd = {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]).arg(path);
    cmd
  };

  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  let mut cmd = {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(path);
    cmd
  };

  log::debug!("Opening {} with {:?}", path.display(), cmd.get_program());
  // The opener returns immediately; the viewer is not our child to wait on.
  cmd.spawn().map(|_| ())
}
