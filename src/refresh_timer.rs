use crate::profile::display::now_secs;
use crate::profile::ProfileRecord;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;
const FRESH_INTERVAL: Duration = Duration::from_secs(50);
const STALE_INTERVAL: Duration = Duration::from_secs(500);

/// Delay before the "updated x ago" label must be recomputed, given how long
/// ago the last update happened. `None` once it is a day old.
pub fn refresh_delay(elapsed_secs: u64) -> Option<Duration> {
  if elapsed_secs >= DAY {
    None
  } else if elapsed_secs >= HOUR {
    Some(STALE_INTERVAL)
  } else {
    Some(FRESH_INTERVAL)
  }
}

pub fn next_refresh_delay(now: u64, updated: u64) -> Option<Duration> {
  refresh_delay(now.saturating_sub(updated))
}

/// Sends the profile uid on `ticks` whenever its relative update time should
/// be re-rendered. Only reads the record it was created from.
///
/// The task stops on its own after the 24 hour mark, when the receiver goes
/// away, or when the ticker is dropped.
pub struct RefreshTicker {
  handle: JoinHandle<()>,
}

impl RefreshTicker {
  /// `None` for profiles without a url or that were never fetched.
  pub fn spawn(record: &ProfileRecord, ticks: mpsc::UnboundedSender<String>) -> Option<Self> {
    if !record.has_url() || record.updated == 0 {
      return None;
    }
    let base = now_secs().saturating_sub(record.updated);
    Some(Self::spawn_with_elapsed(record.uid.clone(), base, ticks))
  }

  fn spawn_with_elapsed(uid: String, base: u64, ticks: mpsc::UnboundedSender<String>) -> Self {
    let started = Instant::now();
    let handle = tokio::spawn(async move {
      loop {
        let elapsed = base + started.elapsed().as_secs();
        let Some(delay) = refresh_delay(elapsed) else {
          log::debug!("Profile {uid} last updated over a day ago, refresh timer disarmed");
          break;
        };
        tokio::time::sleep(delay).await;
        if ticks.send(uid.clone()).is_err() {
          break;
        }
      }
    });
    Self { handle }
  }

  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }
}

impl Drop for RefreshTicker {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
