//! The persisted ticket record and the names of the global ledger entries.

use crate::ids::{CategoryKey, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted status of a ticket. Deleted tickets are removed from the store instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Accepting messages from the owner.
    Open,
    /// Frozen; can be reopened or deleted.
    Closed,
}

/// One ticket, keyed by its context id in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    /// User who opened the ticket, or the last transfer target.
    pub owner_id: UserId,
    /// Display label of the category the ticket currently sits in. Changed by Move.
    pub ticket_type: String,
    /// Category definition the ticket was opened from. Governs role templates; never changes.
    pub originating_button_id: CategoryKey,
    /// Open or Closed.
    pub status: TicketStatus,
    /// Current claimant. `Some` is the only representation of "claimed".
    pub claimant: Option<UserId>,
    /// Staff member who last closed the ticket. Kept across reopen.
    pub close_user_id: Option<UserId>,
    /// The intake message posted at creation.
    pub msg_id: MessageId,
    /// The close notice, present while the ticket is closed.
    pub close_msg_id: Option<MessageId>,
    /// Optimistic-concurrency version, bumped on every committed write.
    pub version: u64,
    /// When the ticket was opened.
    pub opened_at: DateTime<Utc>,
    /// When the ticket was last closed, cleared on reopen.
    pub closed_at: Option<DateTime<Utc>>,
    /// Set once a Delete has been accepted and the purge is scheduled.
    pub pending_deletion: bool,
}

impl TicketRecord {
    /// A freshly opened, unclaimed ticket.
    #[must_use]
    pub const fn open(
        owner_id: UserId,
        ticket_type: String,
        originating_button_id: CategoryKey,
        msg_id: MessageId,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id,
            ticket_type,
            originating_button_id,
            status: TicketStatus::Open,
            claimant: None,
            close_user_id: None,
            msg_id,
            close_msg_id: None,
            version: 0,
            opened_at,
            closed_at: None,
            pending_deletion: false,
        }
    }

    /// Whether somebody holds the claim.
    #[must_use]
    pub const fn is_claimed(&self) -> bool {
        self.claimant.is_some()
    }

    /// Whether the status is `Open`.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    /// Whether `user` is the current claimant.
    #[must_use]
    pub fn is_claimed_by(&self, user: &UserId) -> bool {
        self.claimant.as_ref() == Some(user)
    }
}

/// Global scalar counters kept next to the records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counter {
    /// Tickets ever opened; also the source of sequence-numbered names.
    TotalTickets,
    /// Claims currently held (decremented on unclaim).
    TotalClaims,
    /// Feedback forms submitted.
    TotalReviews,
}

impl Counter {
    /// Storage key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::TotalTickets => "totalTickets",
            Self::TotalClaims => "totalClaims",
            Self::TotalReviews => "totalReviews",
        }
    }
}

/// Global lists kept next to the records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListName {
    /// Ids of every ticket whose status is `Open`.
    OpenTickets,
    /// Submitted star ratings.
    Ratings,
    /// Blacklisted user and role ids.
    Blacklist,
}

impl ListName {
    /// Storage key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::OpenTickets => "openTickets",
            Self::Ratings => "ratings",
            Self::Blacklist => "blacklistedUsers",
        }
    }
}
