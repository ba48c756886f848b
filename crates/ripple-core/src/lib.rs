//! Foundation types for the Ripple realtime sync engine.
//!
//! This crate has no opinion about transports or caches; it provides the
//! vocabulary shared by the realtime and cache layers:
//!
//! - [`ids`]: branded ID newtypes
//! - [`change`]: row-change events and their wire form
//! - [`status`]: connection state machine states and status snapshots
//! - [`errors`]: the error taxonomy
//! - [`backoff`]: exponential backoff math
//! - [`logging`]: tracing subscriber setup
//! - [`strategy`]: conflict strategy selection
//! - [`identity`]: the injected local-identity collaborator

pub mod backoff;
pub mod change;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod status;
pub mod strategy;

pub use change::{ChangeAction, ChangeEvent, RawChange};
pub use errors::{ErrorSeverity, SyncError};
pub use identity::{IdentityProvider, StaticIdentity};
pub use ids::{ChannelId, EntityId, UserId};
pub use status::{ConnectionState, ConnectionStatus};
pub use strategy::ConflictStrategy;
