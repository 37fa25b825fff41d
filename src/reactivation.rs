use crate::events::Notice;
use crate::profile::{ProfileError, ProfileResult, ProfileStore};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactivateOutcome {
  Applied,
  /// A reactivation was already running; it will run once more when done,
  /// whether or not the running pass succeeds.
  Coalesced,
  /// The profile that changed is not part of the running configuration.
  Skipped,
}

#[derive(Default)]
struct ReactivateState {
  running: bool,
  rerun: bool,
}

/// Re-applies the active configuration after anything that feeds it changed.
///
/// Calls that arrive while one is in flight collapse into a single re-run,
/// so the engine always ends up with the latest files. The caller that owns
/// the loop gets the result of the last pass.
pub struct Reactivator {
  store: Arc<ProfileStore>,
  notice: Arc<dyn Notice>,
  state: Mutex<ReactivateState>,
}

struct RunningGuard<'a> {
  state: &'a Mutex<ReactivateState>,
  armed: bool,
}

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    if self.armed {
      let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
      state.running = false;
      state.rerun = false;
    }
  }
}

impl Reactivator {
  pub fn new(store: Arc<ProfileStore>, notice: Arc<dyn Notice>) -> Self {
    Self {
      store,
      notice,
      state: Mutex::new(ReactivateState::default()),
    }
  }

  pub fn is_running(&self) -> bool {
    self.lock_state().running
  }

  pub async fn reactivate(&self) -> ProfileResult<ReactivateOutcome> {
    {
      let mut state = self.lock_state();
      if state.running {
        state.rerun = true;
        log::debug!("Reactivation already running, scheduling one more pass");
        return Ok(ReactivateOutcome::Coalesced);
      }
      state.running = true;
    }
    let mut guard = RunningGuard {
      state: &self.state,
      armed: true,
    };

    loop {
      let result = self.store.commands().reactivate_configuration().await;

      let again = {
        let mut state = self.lock_state();
        if state.rerun {
          state.rerun = false;
          if let Err(e) = &result {
            log::warn!("Reactivation failed, retrying with newer changes: {e}");
          }
          true
        } else {
          state.running = false;
          state.rerun = false;
          guard.armed = false;
          false
        }
      };
      if again {
        continue;
      }

      return match result {
        Ok(()) => {
          log::info!("Active configuration reactivated");
          self.notice.success("Profile Reactivated");
          Ok(ReactivateOutcome::Applied)
        }
        Err(e) => {
          log::error!("Failed to reactivate configuration: {e}");
          self.notice.error(&e);
          Err(ProfileError::Transport(e))
        }
      };
    }
  }

  /// Reactivates only if `uid` is the current profile or an enabled
  /// enhanced profile. The active set is read from the store at call time.
  pub async fn reactivate_if_active(&self, uid: &str) -> ProfileResult<ReactivateOutcome> {
    let snapshot = self.store.current_snapshot().await?;
    if !snapshot.is_active(uid) {
      return Ok(ReactivateOutcome::Skipped);
    }
    self.reactivate().await
  }

  fn lock_state(&self) -> std::sync::MutexGuard<'_, ReactivateState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}
