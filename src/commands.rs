use crate::profile::{ProfileInfoPatch, ProfileList, RoutingOption};
use async_trait::async_trait;

/// Command-layer results carry a plain message on failure, the same shape
/// the native shell hands back to the UI.
pub type CommandResult<T> = Result<T, String>;

/// The native command boundary the profile core drives.
///
/// Implementations perform the real fetches and persistence; the core only
/// sequences calls and reacts to their outcome.
#[async_trait]
pub trait ProfileCommands: Send + Sync {
  /// Full ordered profile list with the current and enabled-chain markers.
  async fn fetch_profile_list(&self) -> CommandResult<ProfileList>;

  /// Re-fetch a remote profile. `None` keeps the stored routing option.
  async fn update_profile(&self, uid: &str, option: Option<RoutingOption>) -> CommandResult<()>;

  async fn delete_profile(&self, uid: &str) -> CommandResult<()>;

  /// Open the raw profile file in an external viewer.
  async fn view_profile_file(&self, uid: &str) -> CommandResult<()>;

  /// Re-apply the composed active configuration to the running engine.
  async fn reactivate_configuration(&self) -> CommandResult<()>;

  /// Persist a new permutation of the profile list.
  async fn reorder_profiles(&self, ordered_uids: &[String]) -> CommandResult<()>;

  async fn select_profile(&self, uid: &str) -> CommandResult<()>;

  /// Replace the ordered set of enabled enhanced profiles.
  async fn set_chain(&self, uids: &[String]) -> CommandResult<()>;

  async fn read_profile_file(&self, uid: &str) -> CommandResult<String>;

  async fn save_profile_file(&self, uid: &str, content: &str) -> CommandResult<()>;

  async fn patch_profile_info(&self, uid: &str, patch: ProfileInfoPatch) -> CommandResult<()>;
}
