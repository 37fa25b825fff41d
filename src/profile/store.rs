use super::error::{ProfileError, ProfileResult};
use super::types::{ProfileList, ProfileRecord};
use crate::commands::ProfileCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// One complete copy of the command layer's profile list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSnapshot {
  /// Revalidation that produced this snapshot; 0 before the first load.
  pub generation: u64,
  pub current: Option<String>,
  pub chain: Vec<String>,
  pub items: Vec<ProfileRecord>,
}

impl ProfileSnapshot {
  fn from_list(generation: u64, list: ProfileList) -> Self {
    Self {
      generation,
      current: list.current,
      chain: list.chain,
      items: list.items,
    }
  }

  pub fn find(&self, uid: &str) -> Option<&ProfileRecord> {
    self.items.iter().find(|item| item.uid == uid)
  }

  pub fn uids(&self) -> Vec<String> {
    self.items.iter().map(|item| item.uid.clone()).collect()
  }

  pub fn is_active(&self, uid: &str) -> bool {
    self.current.as_deref() == Some(uid) || self.chain.iter().any(|c| c == uid)
  }
}

/// Process-wide cache of the profile list.
///
/// Revalidation always swaps in a whole snapshot. Each revalidation takes a
/// generation number when it starts, and a snapshot is only installed if no
/// later revalidation has already landed.
///
/// `invalidate` raises the generation readers require to the next one to
/// start, so a fetch already in flight when a mutation completes never
/// satisfies a read that follows it.
pub struct ProfileStore {
  commands: Arc<dyn ProfileCommands>,
  tx: watch::Sender<Arc<ProfileSnapshot>>,
  required_generation: AtomicU64,
  next_generation: AtomicU64,
}

impl ProfileStore {
  pub fn new(commands: Arc<dyn ProfileCommands>) -> Self {
    let (tx, _) = watch::channel(Arc::new(ProfileSnapshot::default()));
    Self {
      commands,
      tx,
      required_generation: AtomicU64::new(1),
      next_generation: AtomicU64::new(0),
    }
  }

  pub fn commands(&self) -> &Arc<dyn ProfileCommands> {
    &self.commands
  }

  /// The cached snapshot without triggering a fetch.
  pub fn snapshot(&self) -> Arc<ProfileSnapshot> {
    self.tx.borrow().clone()
  }

  /// True until a snapshot fetched after the last `invalidate` is installed.
  pub fn is_stale(&self) -> bool {
    self.snapshot().generation < self.required_generation.load(Ordering::SeqCst)
  }

  /// Live view of the store; while any receiver exists, `invalidate`
  /// re-fetches eagerly instead of waiting for the next read.
  pub fn subscribe(&self) -> watch::Receiver<Arc<ProfileSnapshot>> {
    self.tx.subscribe()
  }

  /// Ordered records, re-fetched first if the cache is stale.
  pub async fn get_all(&self) -> ProfileResult<Vec<ProfileRecord>> {
    Ok(self.current_snapshot().await?.items.clone())
  }

  pub async fn current_snapshot(&self) -> ProfileResult<Arc<ProfileSnapshot>> {
    if self.is_stale() {
      self.revalidate().await?;
    }
    Ok(self.snapshot())
  }

  pub async fn find(&self, uid: &str) -> ProfileResult<ProfileRecord> {
    self
      .current_snapshot()
      .await?
      .find(uid)
      .cloned()
      .ok_or_else(|| ProfileError::NotFound(uid.to_string()))
  }

  /// Active ordinary profile as of the last snapshot.
  pub fn active_uid(&self) -> Option<String> {
    self.snapshot().current.clone()
  }

  pub fn chain(&self) -> Vec<String> {
    self.snapshot().chain.clone()
  }

  /// Called after every mutation.
  pub async fn invalidate(&self) -> ProfileResult<()> {
    let required = self.next_generation.load(Ordering::SeqCst) + 1;
    self
      .required_generation
      .fetch_max(required, Ordering::SeqCst);
    if self.tx.receiver_count() > 0 {
      self.revalidate().await?;
    } else {
      log::debug!("Profile store marked stale, no live subscribers");
    }
    Ok(())
  }

  /// Fetches the full list and installs it unless a newer revalidation
  /// already completed. Returns whether this call's snapshot was installed.
  pub async fn revalidate(&self) -> ProfileResult<bool> {
    let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;

    let list = match self.commands.fetch_profile_list().await {
      Ok(list) => list,
      Err(e) => {
        log::error!("Failed to fetch profile list: {e}");
        return Err(ProfileError::Transport(e));
      }
    };

    let snapshot = ProfileSnapshot::from_list(generation, list);
    let count = snapshot.items.len();
    let installed = self.tx.send_if_modified(|current| {
      if generation > current.generation {
        *current = Arc::new(snapshot);
        true
      } else {
        false
      }
    });

    if installed {
      log::debug!("Installed profile snapshot {generation} with {count} profiles");
    } else {
      log::debug!("Dropped superseded profile snapshot {generation}");
    }
    Ok(installed)
  }

  /// Moves the item at `from` to `to`, persists the new order and
  /// revalidates. Out-of-range indexes are rejected before any call.
  pub async fn reorder(&self, from: usize, to: usize) -> ProfileResult<Vec<String>> {
    let uids = self.current_snapshot().await?.uids();
    let order = move_item(&uids, from, to)?;
    if order == uids {
      return Ok(order);
    }
    self
      .commands
      .reorder_profiles(&order)
      .await
      .map_err(ProfileError::Transport)?;
    self.invalidate().await?;
    Ok(order)
  }

  /// `reorder` addressed by uid instead of by source index.
  pub async fn move_to(&self, uid: &str, new_index: usize) -> ProfileResult<Vec<String>> {
    let from = self
      .current_snapshot()
      .await?
      .items
      .iter()
      .position(|item| item.uid == uid)
      .ok_or_else(|| ProfileError::NotFound(uid.to_string()))?;
    self.reorder(from, new_index).await
  }
}

/// Permutation produced by dragging the item at `from` onto `to`.
pub fn move_item(uids: &[String], from: usize, to: usize) -> ProfileResult<Vec<String>> {
  if from >= uids.len() || to >= uids.len() {
    return Err(ProfileError::validation(format!(
      "cannot move index {from} to {to} in a list of {}",
      uids.len()
    )));
  }
  let mut order = uids.to_vec();
  let item = order.remove(from);
  order.insert(to, item);
  Ok(order)
}
