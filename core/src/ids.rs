//! Typed identifiers and the actors that appear in inbound events.
//!
//! Every identifier handed out by the chat platform is an opaque string. Wrapping each kind in
//! its own newtype keeps a `UserId` from being passed where a `RoleId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw platform identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a ticket context (the conversation thread a ticket lives in).
    TicketId
);
string_id!(
    /// Identifier of a platform user.
    UserId
);
string_id!(
    /// Identifier of an authorization group (a platform role).
    RoleId
);
string_id!(
    /// Identifier of a message inside a context or a direct conversation.
    MessageId
);
string_id!(
    /// Identifier of a location (parent category) that contexts are grouped under.
    LocationId
);
string_id!(
    /// Key of an intake category definition. Also the action id of its picker button.
    CategoryKey
);

/// Display data for a user, as resolved from the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Platform id.
    pub id: UserId,
    /// Unique handle, e.g. `alice#0001` or `alice`.
    pub tag: String,
    /// Bare username used in context names.
    pub username: String,
}

impl UserProfile {
    /// Build a profile.
    #[must_use]
    pub fn new(id: impl Into<UserId>, tag: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            username: username.into(),
        }
    }
}

/// Something an access entry can be attached to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    /// A single user.
    User(UserId),
    /// An authorization group.
    Role(RoleId),
    /// The workspace-wide default entry.
    Everyone,
}

/// The user behind an inbound event together with the groups they hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    /// Who acted.
    pub profile: UserProfile,
    /// Authorization groups held in the workspace.
    pub roles: Vec<RoleId>,
}

impl Actor {
    /// Build an actor.
    #[must_use]
    pub const fn new(profile: UserProfile, roles: Vec<RoleId>) -> Self {
        Self { profile, roles }
    }

    /// Shorthand for the actor's user id.
    #[must_use]
    pub const fn id(&self) -> &UserId {
        &self.profile.id
    }

    /// Whether the actor holds at least one of `roles`.
    #[must_use]
    pub fn has_any_role(&self, roles: &[RoleId]) -> bool {
        self.roles.iter().any(|held| roles.contains(held))
    }
}
