//! Branded ID newtypes for type safety.
//!
//! Every identifier in the sync layer has a distinct newtype wrapper around
//! `String`. This prevents accidentally passing a channel id where an entity
//! id is expected.
//!
//! Backend-assigned ids arrive as opaque strings (or numbers stringified at
//! the wire boundary). Client-generated ids for optimistic inserts use UUID
//! v7 so they sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a new client-side ID (UUID v7, time-ordered).
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id! {
    /// Identifier of one logical change-feed channel (e.g. `posts`).
    ChannelId
}

string_id! {
    /// Identifier of a mirrored backend entity (post, comment, ...).
    EntityId
}

string_id! {
    /// Identifier of a user account.
    UserId
}
