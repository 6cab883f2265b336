//! # pomosync-settings
//!
//! Layered configuration for the hub: compiled defaults, then
//! `~/.pomosync/settings.json` (deep-merged), then `POMOSYNC_*` env vars.
//!
//! ```no_run
//! let settings = pomosync_settings::load_settings().unwrap();
//! println!("port = {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{IdentityBackend, IdentitySettings, LoggingSettings, PomoSettings, ServerSettings};
