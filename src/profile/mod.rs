pub mod display;
pub mod error;
pub mod store;
pub mod types;

pub use display::{expire_date, format_traffic, from_now, progress_percent, ProfileCard};
pub use error::{ProfileError, ProfileResult};
pub use store::{ProfileSnapshot, ProfileStore};
pub use types::{
  ProfileExtra, ProfileInfoPatch, ProfileKind, ProfileList, ProfileRecord, RoutingOption,
};
