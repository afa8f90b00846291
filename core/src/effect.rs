//! Effect descriptions returned by the lifecycle reducer.
//!
//! Effects are values, not execution. The runtime commits ledger operations right after the
//! record write and hands everything else to the dispatcher, in order.

use crate::ids::{LocationId, MessageId, Principal, TicketId, UserId, UserProfile};
use crate::record::Counter;
use crate::template::Notice;
use std::time::Duration;

/// Change to one of the global ledger entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ledger {
    /// Push the id onto the open-ticket index.
    IndexAdd(TicketId),
    /// Pull the id from the open-ticket index.
    IndexRemove(TicketId),
    /// Add one to a counter.
    Increment(Counter),
    /// Subtract one from a counter (never below zero).
    Decrement(Counter),
}

/// What a principal may do in a ticket context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    /// View and write.
    Full,
    /// View only.
    ReadOnly,
    /// No view.
    Hidden,
}

/// Access-control change on the ticket context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessEdit {
    /// Create or overwrite the principal's entry.
    Set(Principal, AccessLevel),
    /// Delete the principal's entry.
    Remove(Principal),
    /// Make every user entry except the bot read-only.
    FreezeMembers,
}

/// Maps the posted close notice back into a follow-up action.
pub type OnPosted<A> = Box<dyn FnOnce(MessageId) -> A + Send>;

/// A side effect to be executed by the dispatcher.
pub enum Effect<A> {
    /// No-op.
    None,

    /// Run the nested effects in order.
    Sequential(Vec<Effect<A>>),

    /// Ledger write, committed with the record.
    Ledger(Ledger),

    /// Access-control edit on the ticket context.
    Access(AccessEdit),

    /// Post a rendered notice into the ticket context.
    Announce(Notice),

    /// Post the close notice with its controls and feed the new message id back.
    PostCloseNotice {
        /// Notice to render.
        notice: Notice,
        /// Builds the follow-up action from the posted message id.
        on_posted: OnPosted<A>,
    },

    /// Rewrite the claim field and control row of the intake message.
    RefreshIntake {
        /// The intake message.
        message_id: MessageId,
        /// New claimant, `None` after an unclaim.
        claimant: Option<UserProfile>,
    },

    /// Delete a message in the ticket context.
    DeleteMessage(MessageId),

    /// Move the context under another location.
    Relocate(LocationId),

    /// Rename the context.
    Rename(String),

    /// Replace the context topic.
    SetTopic(String),

    /// Capture a transcript; later `Audit`/`Notify` effects may attach it.
    CaptureTranscript,

    /// Write an audit entry.
    Audit {
        /// Notice to render.
        notice: Notice,
        /// Attach the captured transcript, if any.
        attach_transcript: bool,
    },

    /// Direct message to a user, degrading to an audit entry on failure.
    Notify {
        /// Recipient.
        recipient: UserId,
        /// Notice to render.
        notice: Notice,
        /// Attach the captured transcript, if any.
        attach_transcript: bool,
        /// Follow-up rating prompt carrying the star menu.
        rating_prompt: Option<Notice>,
    },

    /// Delete the ticket context itself.
    RemoveContext,

    /// Feed `action` back into the reducer after `duration`.
    Delay {
        /// How long to wait.
        duration: Duration,
        /// Action to dispatch after the delay.
        action: Box<A>,
    },
}

impl<A> Effect<A> {
    /// Chain effects to run sequentially.
    #[must_use]
    pub const fn chain(effects: Vec<Self>) -> Self {
        Self::Sequential(effects)
    }

    /// Ledger operation carried by this effect, if it is one.
    #[must_use]
    pub const fn ledger(&self) -> Option<&Ledger> {
        match self {
            Self::Ledger(op) => Some(op),
            _ => None,
        }
    }

    /// Flatten nested `Sequential` effects and drop `None`.
    #[must_use]
    pub fn flatten(effects: impl IntoIterator<Item = Self>) -> Vec<Self> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                Self::None => {}
                Self::Sequential(inner) => out.extend(Self::flatten(inner)),
                other => out.push(other),
            }
        }
        out
    }
}

// Manual Debug implementation since the close-notice callback doesn't implement Debug
impl<A> std::fmt::Debug for Effect<A>
where
    A: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Sequential(effects) => f.debug_tuple("Effect::Sequential").field(effects).finish(),
            Self::Ledger(op) => f.debug_tuple("Effect::Ledger").field(op).finish(),
            Self::Access(edit) => f.debug_tuple("Effect::Access").field(edit).finish(),
            Self::Announce(notice) => f.debug_tuple("Effect::Announce").field(notice).finish(),
            Self::PostCloseNotice { notice, .. } => f
                .debug_struct("Effect::PostCloseNotice")
                .field("notice", notice)
                .finish_non_exhaustive(),
            Self::RefreshIntake {
                message_id,
                claimant,
            } => f
                .debug_struct("Effect::RefreshIntake")
                .field("message_id", message_id)
                .field("claimant", claimant)
                .finish(),
            Self::DeleteMessage(id) => f.debug_tuple("Effect::DeleteMessage").field(id).finish(),
            Self::Relocate(location) => f.debug_tuple("Effect::Relocate").field(location).finish(),
            Self::Rename(name) => f.debug_tuple("Effect::Rename").field(name).finish(),
            Self::SetTopic(topic) => f.debug_tuple("Effect::SetTopic").field(topic).finish(),
            Self::CaptureTranscript => write!(f, "Effect::CaptureTranscript"),
            Self::Audit {
                notice,
                attach_transcript,
            } => f
                .debug_struct("Effect::Audit")
                .field("notice", notice)
                .field("attach_transcript", attach_transcript)
                .finish(),
            Self::Notify {
                recipient,
                notice,
                attach_transcript,
                rating_prompt,
            } => f
                .debug_struct("Effect::Notify")
                .field("recipient", recipient)
                .field("notice", notice)
                .field("attach_transcript", attach_transcript)
                .field("rating_prompt", rating_prompt)
                .finish(),
            Self::RemoveContext => write!(f, "Effect::RemoveContext"),
            Self::Delay { duration, action } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
        }
    }
}
