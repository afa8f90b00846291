//! Default message texts and the registry that merges configured overrides over them.

use std::collections::{BTreeMap, HashMap};
use ticketdesk_core::template::{FormattedMessage, MessageTemplate, Substitutions, TemplateName};
use ticketdesk_runtime::ports::Templating;

const SUCCESS: &str = "#2FF200";
const WARNING: &str = "#FF2400";
const ERROR: &str = "#FF0000";

/// Every template the system renders, keyed by name.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<TemplateName, MessageTemplate>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}

impl TemplateRegistry {
    /// The built-in texts.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            templates: TemplateName::ALL
                .iter()
                .map(|&name| (name, default_template(name)))
                .collect(),
        }
    }

    /// Replace built-in texts with `overrides`.
    #[must_use]
    pub fn with_overrides(mut self, overrides: BTreeMap<TemplateName, MessageTemplate>) -> Self {
        self.templates.extend(overrides);
        self
    }

    /// The template registered for `name`.
    #[must_use]
    pub fn get(&self, name: TemplateName) -> Option<&MessageTemplate> {
        self.templates.get(&name)
    }
}

impl Templating for TemplateRegistry {
    fn render(&self, name: TemplateName, substitutions: &Substitutions) -> FormattedMessage {
        self.templates.get(&name).map_or_else(
            || default_template(name).render(substitutions),
            |template| template.render(substitutions),
        )
    }
}

fn log(title: &str, color: &str) -> MessageTemplate {
    MessageTemplate::new(color, &format!("Ticket Logs | {title}"), "")
        .field("• Executor", "{user}\n{user.tag}")
        .field("• Ticket", "{ticketName}\n{ticketType}")
}

fn default_template(name: TemplateName) -> MessageTemplate {
    match name {
        TemplateName::Claimed => MessageTemplate::new(
            SUCCESS,
            "",
            "This ticket has been claimed by\n{user}\nThey will be assisting you shortly!",
        ),
        TemplateName::Unclaimed => MessageTemplate::new(
            WARNING,
            "",
            "This ticket has been unclaimed by\n{user}",
        ),
        TemplateName::Closed => MessageTemplate::new(
            WARNING,
            "Ticket Closed",
            "This ticket was closed by **{user} ({user.tag})**",
        ),
        TemplateName::Reopened => MessageTemplate::new(
            SUCCESS,
            "Ticket Re-Opened",
            "This ticket was re-opened by **{user} ({user.tag})**",
        ),
        TemplateName::Deleting => {
            MessageTemplate::new(ERROR, "", "Deleting ticket in {time} seconds")
        }
        TemplateName::Moved => MessageTemplate::new(
            SUCCESS,
            "",
            "This ticket has been moved to the **{category}** category by {user}.",
        ),
        TemplateName::Renamed => MessageTemplate::new(
            SUCCESS,
            "",
            "This ticket has been renamed to **{name}** by {user}.",
        ),
        TemplateName::Transferred => MessageTemplate::new(
            SUCCESS,
            "",
            "This ticket has been transferred to {user}.",
        ),
        TemplateName::Removed => MessageTemplate::new(
            WARNING,
            "",
            "Removed **{target} ({target.tag})** from the ticket.",
        ),
        TemplateName::NewTicket => MessageTemplate::new(
            SUCCESS,
            "{ticketType} Ticket",
            "Welcome {user}! Staff will be with you shortly.",
        )
        .footer("{server}"),
        TemplateName::TicketCreated => MessageTemplate::new(
            SUCCESS,
            "Ticket Created!",
            "Your new ticket ({channel}) has been created, **{user.username}**!",
        ),
        TemplateName::Transcript => MessageTemplate::new(
            SUCCESS,
            "",
            "The transcript of {channel} has been saved by {user}.",
        ),
        TemplateName::CloseDm => MessageTemplate::new(
            WARNING,
            "Ticket Closed",
            "Your ticket **{ticketName}** in **{server}** has been closed by **{user.tag}**.",
        ),
        TemplateName::ReopenDm => MessageTemplate::new(
            SUCCESS,
            "Ticket Re-Opened",
            "Your ticket **{ticketName}** in **{server}** has been re-opened by **{user.tag}**.",
        ),
        TemplateName::DeleteDm => MessageTemplate::new(
            ERROR,
            "Ticket Deleted",
            "Your ticket **{ticketName}** in **{server}** has been deleted by **{user.tag}**.",
        )
        .field("• Ticket Type", "{ticketType}")
        .field("• Claimed By", "{claimant}"),
        TemplateName::RatingPrompt => MessageTemplate::new(
            SUCCESS,
            "Ticket Feedback",
            "How would you rate the support you received?",
        )
        .footer("{ticketName}"),
        TemplateName::FeedbackThanks => {
            MessageTemplate::new(SUCCESS, "", "Your feedback has been sent successfully!")
        }
        TemplateName::Blacklisted => MessageTemplate::new(
            ERROR,
            "",
            "You are blacklisted and cannot use this!",
        ),
        TemplateName::Cooldown => MessageTemplate::new(
            ERROR,
            "Cooldown",
            "You have to wait **{time}** seconds before clicking this button!",
        ),
        TemplateName::MaxOpenTickets => MessageTemplate::new(
            ERROR,
            "Maximum Tickets Open",
            "You may only have **{max} ticket(s)** open at a time.",
        ),
        TemplateName::WorkingHours => MessageTemplate::new(
            ERROR,
            "Working Hours",
            "Tickets are only open between {openingTime} and {closingTime}.\nThe current time now is {now}.",
        )
        .field("Next opening", "{nextOpening}"),
        TemplateName::Ping => MessageTemplate::new(SUCCESS, "Ping & Latency", "")
            .field("Ping", "{ping}ms")
            .field("Latency", "{latency}ms")
            .footer("Requested by {user.username}"),
        TemplateName::DmError => MessageTemplate::new(
            ERROR,
            "DM Error",
            "Could not deliver a direct message to {user}.",
        )
        .field("• User ID", "{user.id}"),
        TemplateName::LogOpened => log("Ticket Created", SUCCESS),
        TemplateName::LogClaimed => log("Ticket Claimed", SUCCESS),
        TemplateName::LogUnclaimed => log("Ticket Unclaimed", WARNING),
        TemplateName::LogClosed => log("Ticket Closed", WARNING),
        TemplateName::LogReopened => log("Ticket Re-Opened", SUCCESS),
        TemplateName::LogDeleted => {
            log("Ticket Deleted", ERROR).field("• Claimed By", "{claimant}")
        }
        TemplateName::LogMoved => log("Ticket Moved", SUCCESS)
            .field("• From", "{previousCategory}")
            .field("• To", "{category}"),
        TemplateName::LogRenamed => log("Ticket Renamed", SUCCESS)
            .field("• Old Name", "{oldName}")
            .field("• New Name", "{newName}"),
        TemplateName::LogTransferred => log("Ticket Transferred", SUCCESS)
            .field("• Previous Owner", "{previousOwner}")
            .field("• New Owner", "{newOwner}"),
        TemplateName::LogRemoved => {
            log("User Removed", WARNING).field("• Removed", "{target}\n{target.tag}")
        }
        TemplateName::LogTranscript => log("Transcript Saved", SUCCESS),
        TemplateName::LogFeedback => MessageTemplate::new(SUCCESS, "Ticket Logs | Ticket Feedback", "")
            .field("• Executor", "{user}\n{user.tag}")
            .field("• Ticket", "{ticketName}")
            .field("• Rating", "{stars} ({rating}/5)"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use ticketdesk_core::ids::UserProfile;

    #[test]
    fn every_name_has_a_default() {
        let registry = TemplateRegistry::defaults();
        for name in TemplateName::ALL {
            assert!(registry.get(*name).is_some(), "{name} has no default");
        }
    }

    #[test]
    fn overrides_replace_defaults() {
        let registry = TemplateRegistry::defaults().with_overrides(BTreeMap::from([(
            TemplateName::Closed,
            MessageTemplate::new("#000000", "Done", "Closed by {user.username}"),
        )]));
        let alice = UserProfile::new("alice-id", "alice#0001", "alice");
        let rendered = registry.render(
            TemplateName::Closed,
            &Substitutions::new().with_user("user", &alice),
        );
        assert_eq!(rendered.title.as_deref(), Some("Done"));
        assert_eq!(rendered.description.as_deref(), Some("Closed by alice"));
        assert!(registry.get(TemplateName::Reopened).is_some());
    }

    #[test]
    fn ping_renders_both_latencies() {
        let rendered = TemplateRegistry::defaults().render(
            TemplateName::Ping,
            &Substitutions::new()
                .with("ping", "42")
                .with("latency", "7")
                .with("user.username", "alice"),
        );
        assert_eq!(rendered.field_value("Ping"), Some("42ms"));
        assert_eq!(rendered.field_value("Latency"), Some("7ms"));
        assert_eq!(rendered.footer.as_deref(), Some("Requested by alice"));
    }

    #[test]
    fn working_hours_field_disappears_without_next_opening() {
        let rendered = TemplateRegistry::defaults().render(
            TemplateName::WorkingHours,
            &Substitutions::new()
                .with("openingTime", "<t:1:t>")
                .with("closingTime", "<t:2:t>")
                .with("now", "<t:3:t>"),
        );
        assert!(rendered.fields.is_empty());
        assert!(rendered.description.unwrap().contains("<t:1:t> and <t:2:t>"));
    }
}
