//! Capability interfaces for the collaborators the core consumes: the chat platform, the
//! templating engine, transcript capture and the audit log.
//!
//! These are the seams where production adapters and test doubles plug in. Implementations
//! must be `Send + Sync` so they can be shared as `Arc<dyn ...>` across tasks.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use ticketdesk_core::effect::AccessLevel;
use ticketdesk_core::ids::{LocationId, MessageId, Principal, TicketId, UserId, UserProfile};
use ticketdesk_core::template::{FormattedMessage, Substitutions, TemplateName};

/// Errors reported by the chat platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The context, message or user does not exist (any more).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The bot lacks the permission to do this.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The user does not accept direct messages.
    #[error("Direct messages closed for user {0}")]
    DirectMessagesClosed(UserId),

    /// Network or gateway failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors reported by transcript capture.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    /// History could not be read or rendered.
    #[error("Transcript capture failed: {0}")]
    Capture(String),
}

/// Visual weight of a button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlStyle {
    /// Blurple.
    Primary,
    /// Grey.
    Secondary,
    /// Green.
    Success,
    /// Red.
    Danger,
}

/// One entry of a selection menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuOption {
    /// Value reported on selection.
    pub value: String,
    /// Shown text.
    pub label: String,
}

/// Interactive element attached to a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    /// A button carrying an action id.
    Button {
        /// Action id.
        id: String,
        /// Shown text.
        label: String,
        /// Visual weight.
        style: ControlStyle,
        /// Greyed out.
        disabled: bool,
    },
    /// A selection menu carrying an action id.
    Menu {
        /// Action id.
        id: String,
        /// Hint shown while nothing is selected.
        placeholder: String,
        /// Choices.
        options: Vec<MenuOption>,
    },
}

impl Control {
    /// Enabled button.
    #[must_use]
    pub fn button(id: impl Into<String>, label: impl Into<String>, style: ControlStyle) -> Self {
        Self::Button {
            id: id.into(),
            label: label.into(),
            style,
            disabled: false,
        }
    }

    /// Action id of the control.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Button { id, .. } | Self::Menu { id, .. } => id,
        }
    }
}

/// Rendering format of a transcript.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptFormat {
    /// Self-contained HTML page.
    #[default]
    Html,
    /// Plain text.
    Text,
}

/// A file attached to a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileArtifact {
    /// File name including extension.
    pub name: String,
    /// Format of `bytes`.
    pub format: TranscriptFormat,
    /// Contents.
    pub bytes: Vec<u8>,
}

/// A message to send or to replace an existing one with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Plain content, typically mentions.
    pub content: Option<String>,
    /// Rich body.
    pub embed: Option<FormattedMessage>,
    /// Buttons and menus, one row.
    pub controls: Vec<Control>,
    /// Attached file.
    pub attachment: Option<FileArtifact>,
}

impl OutgoingMessage {
    /// A message consisting of a rich body only.
    #[must_use]
    pub fn embed(embed: FormattedMessage) -> Self {
        Self {
            embed: Some(embed),
            ..Self::default()
        }
    }

    /// Attach controls.
    #[must_use]
    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }

    /// Attach a file.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Option<FileArtifact>) -> Self {
        self.attachment = attachment;
        self
    }

    /// Set plain content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// A message as read back from the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    /// Message id.
    pub id: MessageId,
    /// Plain content.
    pub content: Option<String>,
    /// Rich body.
    pub embed: Option<FormattedMessage>,
    /// Controls.
    pub controls: Vec<Control>,
}

/// An access-control entry on a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessEntry {
    /// Who.
    pub principal: Principal,
    /// What they may do.
    pub level: AccessLevel,
}

/// Parameters of a new ticket context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewContext {
    /// Display name.
    pub name: String,
    /// Location to create it under.
    pub parent: LocationId,
    /// Topic line.
    pub topic: String,
    /// Initial access entries.
    pub access: Vec<AccessEntry>,
}

/// Current platform-side facts about a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextInfo {
    /// Context id.
    pub id: TicketId,
    /// Display name.
    pub name: String,
    /// Location it sits under.
    pub parent: Option<LocationId>,
    /// Topic line.
    pub topic: Option<String>,
}

/// The chat platform client.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Allocate a new context.
    async fn create_context(&self, spec: NewContext) -> Result<TicketId, PlatformError>;

    /// Delete a context and its history.
    async fn delete_context(&self, id: &TicketId) -> Result<(), PlatformError>;

    /// Name, parent and topic of a context.
    async fn context_info(&self, id: &TicketId) -> Result<ContextInfo, PlatformError>;

    /// Post a message into a context.
    async fn send_message(
        &self,
        context: &TicketId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError>;

    /// Read a message back.
    async fn fetch_message(
        &self,
        context: &TicketId,
        message: &MessageId,
    ) -> Result<StoredMessage, PlatformError>;

    /// Replace a message's content, body and controls.
    async fn edit_message(
        &self,
        context: &TicketId,
        message: &MessageId,
        replacement: OutgoingMessage,
    ) -> Result<(), PlatformError>;

    /// Messages of a context, oldest first.
    async fn history(&self, context: &TicketId) -> Result<Vec<StoredMessage>, PlatformError>;

    /// Delete a message.
    async fn delete_message(
        &self,
        context: &TicketId,
        message: &MessageId,
    ) -> Result<(), PlatformError>;

    /// Create or overwrite an access entry.
    async fn set_access(
        &self,
        context: &TicketId,
        principal: &Principal,
        level: AccessLevel,
    ) -> Result<(), PlatformError>;

    /// Delete an access entry.
    async fn remove_access(
        &self,
        context: &TicketId,
        principal: &Principal,
    ) -> Result<(), PlatformError>;

    /// Current access entries.
    async fn access_entries(&self, context: &TicketId) -> Result<Vec<AccessEntry>, PlatformError>;

    /// Move a context under another location.
    async fn set_parent(&self, context: &TicketId, parent: &LocationId)
    -> Result<(), PlatformError>;

    /// Rename a context.
    async fn set_name(&self, context: &TicketId, name: &str) -> Result<(), PlatformError>;

    /// Replace a context's topic.
    async fn set_topic(&self, context: &TicketId, topic: &str) -> Result<(), PlatformError>;

    /// Resolve a user id to display data.
    async fn resolve_user(&self, id: &UserId) -> Result<UserProfile, PlatformError>;

    /// Send a direct message.
    async fn send_direct(
        &self,
        user: &UserId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError>;

    /// Read back a direct message previously sent to `user`.
    async fn fetch_direct_message(
        &self,
        user: &UserId,
        message: &MessageId,
    ) -> Result<StoredMessage, PlatformError>;

    /// Remove the controls of a direct message.
    async fn clear_direct_controls(
        &self,
        user: &UserId,
        message: &MessageId,
    ) -> Result<(), PlatformError>;

    /// The bot's own user id.
    fn bot_id(&self) -> UserId;

    /// Display name of the workspace.
    fn workspace_name(&self) -> String;

    /// Current gateway round-trip latency.
    fn latency(&self) -> Duration;
}

/// Renders named templates.
pub trait Templating: Send + Sync {
    /// Render `name` with `substitutions`.
    fn render(&self, name: TemplateName, substitutions: &Substitutions) -> FormattedMessage;
}

/// Exports a context's history.
#[async_trait]
pub trait TranscriptCapture: Send + Sync {
    /// Capture the transcript of `ticket`.
    async fn capture(&self, ticket: &TicketId) -> Result<FileArtifact, TranscriptError>;
}

/// One audit log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditEntry {
    /// Template the entry was rendered from; adapters may route on it.
    pub template: TemplateName,
    /// Rendered body.
    pub message: FormattedMessage,
    /// Attached transcript.
    pub attachment: Option<FileArtifact>,
}

/// Append-only audit log.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Record one entry.
    async fn record(&self, entry: AuditEntry) -> Result<(), PlatformError>;
}
