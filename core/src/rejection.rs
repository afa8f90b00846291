//! Named reasons a transition can be refused.
//!
//! Rejections are ordinary values. The engine never formats user-facing text; the router maps
//! each reason to a reply.

use crate::ids::UserId;
use std::fmt;
use thiserror::Error;

/// Authority an actor lacked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authority {
    /// Membership in one of the staff groups.
    Staff,
    /// Being the current claimant.
    Claimant(UserId),
    /// Membership in one of the category's creator groups.
    CategoryCreator,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staff => f.write_str("staff"),
            Self::Claimant(id) => write!(f, "claimant {id}"),
            Self::CategoryCreator => f.write_str("category creator"),
        }
    }
}

/// The state a ticket was already in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketCondition {
    /// Status is `Open`.
    Open,
    /// Status is `Closed`.
    Closed,
    /// Claimed by the given user.
    Claimed(UserId),
    /// Nobody holds the claim.
    Unclaimed,
    /// A purge is already scheduled.
    PendingDeletion,
    /// Already filed under the named category.
    InCategory(String),
}

impl fmt::Display for TicketCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
            Self::Claimed(by) => write!(f, "claimed by {by}"),
            Self::Unclaimed => f.write_str("unclaimed"),
            Self::PendingDeletion => f.write_str("pending deletion"),
            Self::InCategory(name) => write!(f, "in category {name}"),
        }
    }
}

/// Why a transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The context has no ticket record.
    #[error("not a ticket")]
    NotATicket,

    /// The actor lacks the named authority.
    #[error("not authorized: requires {required}")]
    NotAuthorized {
        /// What was missing.
        required: Authority,
    },

    /// The ticket is already in the requested (or an incompatible) state.
    #[error("ticket is already {0}")]
    AlreadyInState(TicketCondition),

    /// The actor already has `max` open tickets.
    #[error("open ticket quota of {max} reached")]
    QuotaExceeded {
        /// Configured quota.
        max: usize,
    },

    /// The requested category does not exist.
    #[error("invalid category; available: {}", available.join(", "))]
    InvalidCategory {
        /// Names that would have been accepted.
        available: Vec<String>,
    },

    /// The transition would change nothing (e.g. transfer to the current owner).
    #[error("no-op transition")]
    SelfNoop,

    /// The feature behind the action is switched off.
    #[error("feature disabled")]
    FeatureDisabled,

    /// The principal to remove has no access entry on the ticket.
    #[error("target is not present in the ticket")]
    TargetNotPresent,
}

impl RejectReason {
    /// Short stable label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotATicket => "not_a_ticket",
            Self::NotAuthorized { .. } => "not_authorized",
            Self::AlreadyInState(_) => "already_in_state",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::InvalidCategory { .. } => "invalid_category",
            Self::SelfNoop => "self_noop",
            Self::FeatureDisabled => "feature_disabled",
            Self::TargetNotPresent => "target_not_present",
        }
    }
}
