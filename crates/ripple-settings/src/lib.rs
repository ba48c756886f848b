//! Layered configuration for the Ripple sync engine.
//!
//! Settings come from three layers, later overriding earlier:
//! compiled defaults, an optional JSON settings file (deep-merged), and
//! `RIPPLE_*` environment variables with strict parsing.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{CacheSettings, RealtimeSettings, RippleSettings};
