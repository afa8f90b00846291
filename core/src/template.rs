//! Message templates: the closed catalog of names, placeholder substitution and the
//! formatted message a template renders to.
//!
//! Placeholders use `{name}` and `{name.attribute}` and are resolved by plain substring
//! replacement. There is no expression language.

use crate::ids::UserProfile;
use crate::markup;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! template_names {
    ($($(#[$meta:meta])* $variant:ident => $key:literal),+ $(,)?) => {
        /// Every message the system can render.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum TemplateName {
            $($(#[$meta])* $variant,)+
        }

        impl TemplateName {
            /// All names, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Configuration key of this template.
            #[must_use]
            pub const fn key(self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)+
                }
            }

            /// Look a template up by configuration key.
            #[must_use]
            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($key => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

template_names! {
    /// Posted into the ticket after a claim.
    Claimed => "claimedEmbed",
    /// Posted into the ticket after an unclaim.
    Unclaimed => "unclaimedEmbed",
    /// The close notice carrying Reopen/Transcript/Delete controls.
    Closed => "closeEmbed",
    /// Posted into the ticket after a reopen.
    Reopened => "reopenEmbed",
    /// Countdown notice before a purge.
    Deleting => "deleteEmbed",
    /// Posted after a move.
    Moved => "moveEmbed",
    /// Posted after a rename.
    Renamed => "renameEmbed",
    /// Posted after a transfer.
    Transferred => "transferEmbed",
    /// Posted after a participant is removed.
    Removed => "removeEmbed",
    /// The intake message of a new ticket.
    NewTicket => "newTicketEmbed",
    /// Reply to the creator once the ticket exists.
    TicketCreated => "ticketOpenEmbed",
    /// Reply after a manual transcript.
    Transcript => "transcriptEmbed",
    /// DM sent to the owner on close.
    CloseDm => "closeDMEmbed",
    /// DM sent to the owner on reopen.
    ReopenDm => "reopenDMEmbed",
    /// DM sent to the owner on delete.
    DeleteDm => "deleteDMEmbed",
    /// Rating prompt attached to the delete DM.
    RatingPrompt => "ratingDMEmbed",
    /// Reply after feedback was recorded.
    FeedbackThanks => "feedbackThanksEmbed",
    /// Reply to a blacklisted actor.
    Blacklisted => "blacklistedEmbed",
    /// Reply while the creation cooldown runs.
    Cooldown => "cooldownEmbed",
    /// Reply when the open-ticket quota is reached.
    MaxOpenTickets => "maxOpenTicketsEmbed",
    /// Reply outside working hours.
    WorkingHours => "workingHoursEmbed",
    /// Reply to the ping command.
    Ping => "pingEmbed",
    /// Audit entry written when a DM could not be delivered.
    DmError => "dmErrorEmbed",
    /// Audit entry for an opened ticket.
    LogOpened => "logTicketOpenEmbed",
    /// Audit entry for a claim.
    LogClaimed => "logClaimedEmbed",
    /// Audit entry for an unclaim.
    LogUnclaimed => "logUnclaimedEmbed",
    /// Audit entry for a close.
    LogClosed => "logCloseEmbed",
    /// Audit entry for a reopen.
    LogReopened => "logReopenEmbed",
    /// Audit entry for a delete.
    LogDeleted => "logDeleteEmbed",
    /// Audit entry for a move.
    LogMoved => "logMoveEmbed",
    /// Audit entry for a rename.
    LogRenamed => "logRenameEmbed",
    /// Audit entry for a transfer.
    LogTransferred => "logTransferEmbed",
    /// Audit entry for a removed participant.
    LogRemoved => "logRemoveEmbed",
    /// Audit entry for a manual transcript.
    LogTranscript => "logTranscriptEmbed",
    /// Audit entry for submitted feedback.
    LogFeedback => "logFeedbackEmbed",
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ordered placeholder values for one rendering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Substitutions {
    entries: Vec<(String, String)>,
}

impl Substitutions {
    /// No substitutions.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add `{key}`, replacing an earlier value for the same key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add `{prefix}` (a mention), `{prefix.tag}`, `{prefix.username}` and `{prefix.id}`.
    #[must_use]
    pub fn with_user(self, prefix: &str, user: &UserProfile) -> Self {
        self.with(prefix, markup::user_mention(&user.id))
            .with(format!("{prefix}.tag"), markup::sanitize(&user.tag))
            .with(format!("{prefix}.username"), markup::sanitize(&user.username))
            .with(format!("{prefix}.id"), user.id.as_str())
    }

    /// Insert in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every known placeholder in `text`.
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for (key, value) in &self.entries {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }

    /// Whether every `{placeholder}` in `text` has a value.
    #[must_use]
    pub fn resolves(&self, text: &str) -> bool {
        placeholders(text).all(|name| self.get(name).is_some())
    }
}

/// Names of the `{placeholder}` tokens in `text`.
fn placeholders(text: &str) -> impl Iterator<Item = &str> {
    text.split('{').skip(1).filter_map(|rest| {
        let (name, _) = rest.split_once('}')?;
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
        valid.then_some(name)
    })
}

/// A request to render one template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    /// Which template.
    pub template: TemplateName,
    /// Values for its placeholders.
    pub substitutions: Substitutions,
}

impl Notice {
    /// A notice with no substitutions yet.
    #[must_use]
    pub const fn new(template: TemplateName) -> Self {
        Self {
            template,
            substitutions: Substitutions::new(),
        }
    }

    /// See [`Substitutions::with`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.substitutions.insert(key, value);
        self
    }

    /// See [`Substitutions::with_user`].
    #[must_use]
    pub fn with_user(mut self, prefix: &str, user: &UserProfile) -> Self {
        self.substitutions = self.substitutions.with_user(prefix, user);
        self
    }
}

/// A named field of a formatted message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    /// Field title.
    pub name: String,
    /// Field body.
    pub value: String,
    /// Rendered side by side with neighbours.
    #[serde(default)]
    pub inline: bool,
}

/// A rendered rich message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedMessage {
    /// Title line.
    pub title: Option<String>,
    /// Body.
    pub description: Option<String>,
    /// Accent color, `#RRGGBB`.
    pub color: Option<String>,
    /// Fields, in order.
    pub fields: Vec<EmbedField>,
    /// Footer text.
    pub footer: Option<String>,
}

impl FormattedMessage {
    /// Append a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Value of the field titled `name`.
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    /// Drop every field titled `name`.
    pub fn remove_field(&mut self, name: &str) {
        self.fields.retain(|field| field.name != name);
    }
}

/// Unrendered template text, as loaded from configuration or defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Title with placeholders.
    #[serde(default)]
    pub title: Option<String>,
    /// Body with placeholders.
    #[serde(default)]
    pub description: Option<String>,
    /// Accent color.
    #[serde(default)]
    pub color: Option<String>,
    /// Fields with placeholders.
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    /// Footer with placeholders.
    #[serde(default)]
    pub footer: Option<String>,
}

impl MessageTemplate {
    /// Template with a title and a body.
    #[must_use]
    pub fn new(color: &str, title: &str, description: &str) -> Self {
        Self {
            title: (!title.is_empty()).then(|| title.to_owned()),
            description: (!description.is_empty()).then(|| description.to_owned()),
            color: Some(color.to_owned()),
            fields: Vec::new(),
            footer: None,
        }
    }

    /// Append a field template.
    #[must_use]
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push(EmbedField {
            name: name.to_owned(),
            value: value.to_owned(),
            inline: false,
        });
        self
    }

    /// Footer template.
    #[must_use]
    pub fn footer(mut self, footer: &str) -> Self {
        self.footer = Some(footer.to_owned());
        self
    }

    /// Fill in placeholders. Fields whose text references a placeholder that has no value are
    /// left out so optional information simply disappears.
    #[must_use]
    pub fn render(&self, substitutions: &Substitutions) -> FormattedMessage {
        FormattedMessage {
            title: self.title.as_deref().map(|t| substitutions.apply(t)),
            description: self.description.as_deref().map(|d| substitutions.apply(d)),
            color: self.color.clone(),
            fields: self
                .fields
                .iter()
                .filter(|field| {
                    substitutions.resolves(&field.name) && substitutions.resolves(&field.value)
                })
                .map(|field| EmbedField {
                    name: substitutions.apply(&field.name),
                    value: substitutions.apply(&field.value),
                    inline: field.inline,
                })
                .collect(),
            footer: self.footer.as_deref().map(|f| substitutions.apply(f)),
        }
    }
}
