//! Inbound interactions as the router sees them.

use chrono::{DateTime, Utc};
use ticketdesk_core::catalog::CommandName;
use ticketdesk_core::ids::{Actor, MessageId, RoleId, TicketId, UserProfile};
use uuid::Uuid;

/// A typed command with its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Take the claim.
    Claim,
    /// Release the claim.
    Unclaim,
    /// Close the ticket.
    Close,
    /// Reopen the ticket.
    Reopen,
    /// Delete the ticket.
    Delete,
    /// File the ticket under another category.
    Move {
        /// Category display name.
        category: String,
    },
    /// Remove a user or a group from the ticket. Exactly one must be given.
    Remove {
        /// User to remove.
        user: Option<UserProfile>,
        /// Group to remove, with its display name.
        role: Option<(RoleId, String)>,
    },
    /// Rename the context.
    Rename {
        /// New name.
        name: String,
    },
    /// Hand the ticket to another user.
    Transfer {
        /// New owner.
        user: UserProfile,
    },
    /// Report latency.
    Ping,
}

impl Command {
    /// The command's catalog name.
    #[must_use]
    pub const fn name(&self) -> CommandName {
        match self {
            Self::Claim => CommandName::Claim,
            Self::Unclaim => CommandName::Unclaim,
            Self::Close => CommandName::Close,
            Self::Reopen => CommandName::Reopen,
            Self::Delete => CommandName::Delete,
            Self::Move { .. } => CommandName::Move,
            Self::Remove { .. } => CommandName::Remove,
            Self::Rename { .. } => CommandName::Rename,
            Self::Transfer { .. } => CommandName::Transfer,
            Self::Ping => CommandName::Ping,
        }
    }
}

/// What kind of interaction arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A typed command.
    Command(Command),
    /// A button press.
    Button {
        /// Action id of the button.
        id: String,
    },
    /// A selection from a menu.
    Menu {
        /// Action id of the menu.
        id: String,
        /// Selected values.
        values: Vec<String>,
        /// The message carrying the menu, for menus sent by direct message.
        message: Option<MessageId>,
    },
    /// A submitted form.
    Form {
        /// Action id of the form.
        id: String,
        /// `(field id, answer)` pairs in form order.
        fields: Vec<(String, String)>,
        /// The message the form was opened from, for forms opened from direct messages.
        message: Option<MessageId>,
    },
}

/// One interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    /// Id carried through every log line of this event.
    pub correlation_id: Uuid,
    /// Who interacted.
    pub actor: Actor,
    /// The context the interaction happened in; `None` in direct messages.
    pub context: Option<TicketId>,
    /// When the platform received it.
    pub created_at: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

impl InboundEvent {
    fn new(actor: Actor, context: Option<TicketId>, kind: EventKind) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            actor,
            context,
            created_at: Utc::now(),
            kind,
        }
    }

    /// A typed command in `context`.
    #[must_use]
    pub fn command(actor: Actor, context: Option<TicketId>, command: Command) -> Self {
        Self::new(actor, context, EventKind::Command(command))
    }

    /// A button press in `context`.
    #[must_use]
    pub fn button(actor: Actor, context: Option<TicketId>, id: impl Into<String>) -> Self {
        Self::new(actor, context, EventKind::Button { id: id.into() })
    }

    /// A menu selection.
    #[must_use]
    pub fn menu(
        actor: Actor,
        context: Option<TicketId>,
        id: impl Into<String>,
        values: Vec<String>,
        message: Option<MessageId>,
    ) -> Self {
        Self::new(
            actor,
            context,
            EventKind::Menu {
                id: id.into(),
                values,
                message,
            },
        )
    }

    /// A form submission.
    #[must_use]
    pub fn form(
        actor: Actor,
        context: Option<TicketId>,
        id: impl Into<String>,
        fields: Vec<(String, String)>,
        message: Option<MessageId>,
    ) -> Self {
        Self::new(
            actor,
            context,
            EventKind::Form {
                id: id.into(),
                fields,
                message,
            },
        )
    }

    /// Override the receive time.
    #[must_use]
    pub const fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.kind {
            EventKind::Command(command) => format!("command:{}", command.name()),
            EventKind::Button { id } => format!("button:{id}"),
            EventKind::Menu { id, .. } => format!("menu:{id}"),
            EventKind::Form { id, .. } => format!("form:{id}"),
        }
    }
}
