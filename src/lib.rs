//! Profile lifecycle core of a desktop proxy client: the profile list cache,
//! guarded subscription updates, reactivation of the running configuration
//! and the per-card controller, plus a file-backed command layer.

pub mod app_dirs;
pub mod backend;
pub mod commands;
pub mod controller;
pub mod events;
pub mod profile;
pub mod reactivation;
pub mod refresh_timer;
pub mod session;
pub mod settings_manager;
pub mod update_coordinator;

pub use commands::{CommandResult, ProfileCommands};
pub use session::AppSession;
