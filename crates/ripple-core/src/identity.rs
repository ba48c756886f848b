//! Local session identity.
//!
//! The identity provider is an injected collaborator, not an ambient
//! global: the user-wins conflict strategy and the like/comment adapters
//! both ask it who the local user is, and tests swap in a fixed identity.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::ids::UserId;

/// Source of the current session's user id.
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` when logged out.
    fn current_user_id(&self) -> Option<UserId>;
}

/// An [`IdentityProvider`] holding a swappable fixed identity.
///
/// The embedding app updates it on sign-in/sign-out; tests construct it
/// directly.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: RwLock<Option<UserId>>,
}

impl StaticIdentity {
    /// A provider already signed in as `user`.
    #[must_use]
    pub fn signed_in(user: impl Into<UserId>) -> Arc<Self> {
        Arc::new(Self {
            user: RwLock::new(Some(user.into())),
        })
    }

    /// A signed-out provider.
    #[must_use]
    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the current identity.
    pub fn set(&self, user: Option<UserId>) {
        *self.user.write() = user;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.user.read().clone()
    }
}
