//! What the router answers to the actor who triggered an event.

use ticketdesk_core::category::{Question, QuestionStyle};
use ticketdesk_core::markup;
use ticketdesk_core::rejection::{Authority, RejectReason, TicketCondition};
use ticketdesk_core::template::{FormattedMessage, Substitutions, TemplateName};
use ticketdesk_runtime::dispatcher::EffectDispatcher;

use crate::config::Messages;

/// One input of a form prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormFieldSpec {
    /// Field id reported back on submission.
    pub id: String,
    /// Label.
    pub label: String,
    /// Hint.
    pub placeholder: String,
    /// Single or multi-line.
    pub style: QuestionStyle,
    /// Mandatory.
    pub required: bool,
    /// Minimum answer length.
    pub min_length: u16,
    /// Maximum answer length.
    pub max_length: Option<u16>,
}

impl FormFieldSpec {
    /// Field `id` asking `question`.
    #[must_use]
    pub fn from_question(id: impl Into<String>, question: &Question) -> Self {
        Self {
            id: id.into(),
            label: question.label.clone(),
            placeholder: question.placeholder.clone(),
            style: question.style,
            required: question.required,
            min_length: question.min_length,
            max_length: question.max_length(),
        }
    }
}

/// A form to present instead of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormPrompt {
    /// Action id the submission will carry.
    pub id: String,
    /// Form title.
    pub title: String,
    /// Inputs in order.
    pub fields: Vec<FormFieldSpec>,
}

/// The answer to one inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to say.
    None,
    /// Plain text.
    Text {
        /// Text.
        content: String,
        /// Only visible to the actor.
        ephemeral: bool,
    },
    /// A rich message.
    Embed {
        /// Body.
        message: FormattedMessage,
        /// Only visible to the actor.
        ephemeral: bool,
    },
    /// A form to fill in.
    Form(FormPrompt),
}

impl Reply {
    /// Text only the actor sees.
    #[must_use]
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            ephemeral: true,
        }
    }

    /// Text everybody in the context sees.
    #[must_use]
    pub fn public(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            ephemeral: false,
        }
    }

    /// Rich message only the actor sees.
    #[must_use]
    pub const fn ephemeral_embed(message: FormattedMessage) -> Self {
        Self::Embed {
            message,
            ephemeral: true,
        }
    }

    /// Rich message everybody in the context sees.
    #[must_use]
    pub const fn public_embed(message: FormattedMessage) -> Self {
        Self::Embed {
            message,
            ephemeral: false,
        }
    }

    /// The plain text, if this is a text reply.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { content, .. } => Some(content),
            _ => None,
        }
    }

    /// The rich body, if this is an embed reply.
    #[must_use]
    pub const fn embed(&self) -> Option<&FormattedMessage> {
        match self {
            Self::Embed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The form, if this is a form prompt.
    #[must_use]
    pub const fn form(&self) -> Option<&FormPrompt> {
        match self {
            Self::Form(prompt) => Some(prompt),
            _ => None,
        }
    }

    /// Title of the rich body, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.embed().and_then(|m| m.title.as_deref())
    }

    /// Whether only the actor sees the reply.
    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        match self {
            Self::Text { ephemeral, .. } | Self::Embed { ephemeral, .. } => *ephemeral,
            Self::None | Self::Form(_) => true,
        }
    }
}

/// The reply for a refused transition. `action` is the refused action's name.
#[must_use]
pub fn rejection(
    reason: &RejectReason,
    action: &str,
    messages: &Messages,
    dispatcher: &EffectDispatcher,
) -> Reply {
    let text = match reason {
        RejectReason::NotATicket => messages.not_in_a_ticket.clone(),
        RejectReason::NotAuthorized { required } => match required {
            Authority::Staff => messages.not_allowed.clone(),
            Authority::Claimant(id) => format!(
                "You did not claim this ticket, only the user that claimed this ticket can unclaim it! ({})",
                markup::user_mention(id)
            ),
            Authority::CategoryCreator => {
                "You are not allowed to create tickets in this category.".to_owned()
            }
        },
        RejectReason::AlreadyInState(condition) => match condition {
            TicketCondition::Open => "This ticket is already open!".to_owned(),
            TicketCondition::Closed => "This ticket is already closed!".to_owned(),
            TicketCondition::Claimed(by) => format!(
                "This ticket has already been claimed by {}!",
                markup::user_mention(by)
            ),
            TicketCondition::Unclaimed => "This ticket has not been claimed!".to_owned(),
            TicketCondition::PendingDeletion => "This ticket is already being deleted!".to_owned(),
            TicketCondition::InCategory(name) => {
                format!("This ticket is already in the **{name}** category.")
            }
        },
        RejectReason::QuotaExceeded { max } => {
            return Reply::ephemeral_embed(dispatcher.render_with(
                TemplateName::MaxOpenTickets,
                &Substitutions::new().with("max", max.to_string()),
            ));
        }
        RejectReason::InvalidCategory { available } => format!(
            "Invalid option. Available options are: {}",
            available.join(", ")
        ),
        RejectReason::SelfNoop => match action {
            "rename" => "The ticket already has that name.".to_owned(),
            _ => "That user already owns this ticket.".to_owned(),
        },
        RejectReason::FeatureDisabled => "This feature is disabled.".to_owned(),
        RejectReason::TargetNotPresent => "That user or role is not in this ticket.".to_owned(),
    };
    Reply::ephemeral(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ticketdesk_core::ids::UserId;
    use ticketdesk_testing::ports::{
        PlainTemplates, RecordingAuditLog, RecordingPlatform, StubTranscripts,
    };

    fn dispatcher() -> EffectDispatcher {
        EffectDispatcher::new(
            Arc::new(RecordingPlatform::new()),
            Arc::new(PlainTemplates),
            Arc::new(StubTranscripts::new()),
            Arc::new(RecordingAuditLog::new()),
        )
    }

    #[test]
    fn staff_refusal_uses_configured_text() {
        let messages = Messages::default();
        let reply = rejection(
            &RejectReason::NotAuthorized {
                required: Authority::Staff,
            },
            "close",
            &messages,
            &dispatcher(),
        );
        assert_eq!(reply.text(), Some(messages.not_allowed.as_str()));
        assert!(reply.is_ephemeral());
    }

    #[test]
    fn claimant_refusal_mentions_claimant() {
        let reply = rejection(
            &RejectReason::NotAuthorized {
                required: Authority::Claimant(UserId::new("sam-id")),
            },
            "unclaim",
            &Messages::default(),
            &dispatcher(),
        );
        assert!(reply.text().is_some_and(|t| t.ends_with("(<@sam-id>)")));
    }

    #[test]
    fn quota_renders_template() {
        let reply = rejection(
            &RejectReason::QuotaExceeded { max: 2 },
            "open",
            &Messages::default(),
            &dispatcher(),
        );
        assert_eq!(reply.title(), Some("maxOpenTicketsEmbed"));
        assert_eq!(reply.embed().and_then(|m| m.field_value("max")), Some("2"));
    }

    #[test]
    fn no_op_wording_depends_on_action() {
        let messages = Messages::default();
        let rename = rejection(&RejectReason::SelfNoop, "rename", &messages, &dispatcher());
        let transfer = rejection(&RejectReason::SelfNoop, "transfer", &messages, &dispatcher());
        assert_eq!(rename.text(), Some("The ticket already has that name."));
        assert_eq!(transfer.text(), Some("That user already owns this ticket."));
    }

    #[test]
    fn invalid_category_lists_names() {
        let reply = rejection(
            &RejectReason::InvalidCategory {
                available: vec!["Support".into(), "Billing".into()],
            },
            "move",
            &Messages::default(),
            &dispatcher(),
        );
        assert_eq!(
            reply.text(),
            Some("Invalid option. Available options are: Support, Billing")
        );
    }
}
