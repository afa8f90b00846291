//! In-memory doubles for the capability ports. Every call is recorded so tests can assert
//! on what the dispatcher did.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use ticketdesk_core::effect::AccessLevel;
use ticketdesk_core::ids::{LocationId, MessageId, Principal, TicketId, UserId, UserProfile};
use ticketdesk_core::template::{FormattedMessage, Substitutions, TemplateName};
use ticketdesk_runtime::ports::{
    AccessEntry, AuditEntry, AuditLog, ChatPlatform, ContextInfo, FileArtifact, NewContext,
    OutgoingMessage, PlatformError, StoredMessage, Templating, TranscriptCapture,
    TranscriptError, TranscriptFormat,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the platform knows about one context.
#[derive(Clone, Debug)]
pub struct ContextRecord {
    /// Name, parent, topic.
    pub info: ContextInfo,
    /// Access entries in insertion order.
    pub access: Vec<AccessEntry>,
    /// Messages in posting order; deleted ones are removed.
    pub messages: Vec<StoredMessage>,
}

impl ContextRecord {
    /// Access level of `principal`, if it has an entry.
    #[must_use]
    pub fn access_of(&self, principal: &Principal) -> Option<AccessLevel> {
        self.access
            .iter()
            .find(|entry| entry.principal == *principal)
            .map(|entry| entry.level)
    }

    /// Titles of the messages' rich bodies, in order.
    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter_map(|m| m.embed.as_ref().and_then(|e| e.title.clone()))
            .collect()
    }
}

#[derive(Debug, Default)]
struct PlatformState {
    next_id: u64,
    contexts: BTreeMap<TicketId, ContextRecord>,
    directs: HashMap<UserId, Vec<StoredMessage>>,
    users: HashMap<UserId, UserProfile>,
    closed_dms: HashSet<UserId>,
    fail_creation: bool,
}

impl PlatformState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn context(&mut self, id: &TicketId) -> Result<&mut ContextRecord, PlatformError> {
        self.contexts
            .get_mut(id)
            .ok_or_else(|| PlatformError::NotFound(format!("context {id}")))
    }
}

fn stored(id: MessageId, message: OutgoingMessage) -> StoredMessage {
    StoredMessage {
        id,
        content: message.content,
        embed: message.embed,
        controls: message.controls,
    }
}

/// A chat platform held entirely in memory.
#[derive(Debug)]
pub struct RecordingPlatform {
    bot: UserId,
    workspace: String,
    state: Mutex<PlatformState>,
    attachments: Mutex<Vec<(String, FileArtifact)>>,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPlatform {
    /// Empty platform; the bot is `bot`, the workspace `Test Workspace`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bot: UserId::new("bot"),
            workspace: "Test Workspace".into(),
            state: Mutex::new(PlatformState::default()),
            attachments: Mutex::new(Vec::new()),
        }
    }

    /// Make `profile` resolvable.
    pub fn add_user(&self, profile: UserProfile) {
        lock(&self.state).users.insert(profile.id.clone(), profile);
    }

    /// Make direct messages to `user` fail.
    pub fn close_direct_messages(&self, user: &UserId) {
        lock(&self.state).closed_dms.insert(user.clone());
    }

    /// Make the next context creations fail.
    pub fn fail_context_creation(&self, fail: bool) {
        lock(&self.state).fail_creation = fail;
    }

    /// Create a context directly, bypassing the port.
    pub fn seed_context(&self, id: &TicketId, name: &str, parent: &LocationId, access: Vec<AccessEntry>) {
        lock(&self.state).contexts.insert(
            id.clone(),
            ContextRecord {
                info: ContextInfo {
                    id: id.clone(),
                    name: name.to_owned(),
                    parent: Some(parent.clone()),
                    topic: None,
                },
                access,
                messages: Vec::new(),
            },
        );
    }

    /// Post a message directly, bypassing the port. Returns its id.
    pub fn seed_message(&self, context: &TicketId, message: OutgoingMessage) -> MessageId {
        let mut state = lock(&self.state);
        let id = MessageId::new(state.next("msg"));
        if let Some(record) = state.contexts.get_mut(context) {
            record.messages.push(stored(id.clone(), message));
        }
        id
    }

    /// Snapshot of a context, `None` once deleted.
    #[must_use]
    pub fn context(&self, id: &TicketId) -> Option<ContextRecord> {
        lock(&self.state).contexts.get(id).cloned()
    }

    /// Ids of all live contexts.
    #[must_use]
    pub fn context_ids(&self) -> Vec<TicketId> {
        lock(&self.state).contexts.keys().cloned().collect()
    }

    /// Direct messages delivered to `user`.
    #[must_use]
    pub fn directs(&self, user: &UserId) -> Vec<StoredMessage> {
        lock(&self.state).directs.get(user).cloned().unwrap_or_default()
    }

    /// Files attached to channel or direct messages, with the recipient or context id.
    #[must_use]
    pub fn attachments(&self) -> Vec<(String, FileArtifact)> {
        lock(&self.attachments).clone()
    }

    fn keep_attachment(&self, target: &str, message: &OutgoingMessage) {
        if let Some(file) = &message.attachment {
            lock(&self.attachments).push((target.to_owned(), file.clone()));
        }
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn create_context(&self, spec: NewContext) -> Result<TicketId, PlatformError> {
        let mut state = lock(&self.state);
        if state.fail_creation {
            return Err(PlatformError::Forbidden("context creation disabled".into()));
        }
        let id = TicketId::new(state.next("ctx"));
        state.contexts.insert(
            id.clone(),
            ContextRecord {
                info: ContextInfo {
                    id: id.clone(),
                    name: spec.name,
                    parent: Some(spec.parent),
                    topic: Some(spec.topic),
                },
                access: spec.access,
                messages: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn delete_context(&self, id: &TicketId) -> Result<(), PlatformError> {
        lock(&self.state)
            .contexts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(format!("context {id}")))
    }

    async fn context_info(&self, id: &TicketId) -> Result<ContextInfo, PlatformError> {
        Ok(lock(&self.state).context(id)?.info.clone())
    }

    async fn send_message(
        &self,
        context: &TicketId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        self.keep_attachment(context.as_str(), &message);
        let mut state = lock(&self.state);
        let id = MessageId::new(state.next("msg"));
        state.context(context)?.messages.push(stored(id.clone(), message));
        Ok(id)
    }

    async fn fetch_message(
        &self,
        context: &TicketId,
        message: &MessageId,
    ) -> Result<StoredMessage, PlatformError> {
        lock(&self.state)
            .context(context)?
            .messages
            .iter()
            .find(|m| m.id == *message)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("message {message}")))
    }

    async fn edit_message(
        &self,
        context: &TicketId,
        message: &MessageId,
        replacement: OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        let slot = state
            .context(context)?
            .messages
            .iter_mut()
            .find(|m| m.id == *message)
            .ok_or_else(|| PlatformError::NotFound(format!("message {message}")))?;
        *slot = stored(message.clone(), replacement);
        Ok(())
    }

    async fn history(&self, context: &TicketId) -> Result<Vec<StoredMessage>, PlatformError> {
        Ok(lock(&self.state).context(context)?.messages.clone())
    }

    async fn delete_message(
        &self,
        context: &TicketId,
        message: &MessageId,
    ) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        let messages = &mut state.context(context)?.messages;
        let before = messages.len();
        messages.retain(|m| m.id != *message);
        if messages.len() == before {
            return Err(PlatformError::NotFound(format!("message {message}")));
        }
        Ok(())
    }

    async fn set_access(
        &self,
        context: &TicketId,
        principal: &Principal,
        level: AccessLevel,
    ) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        let access = &mut state.context(context)?.access;
        match access.iter_mut().find(|entry| entry.principal == *principal) {
            Some(entry) => entry.level = level,
            None => access.push(AccessEntry {
                principal: principal.clone(),
                level,
            }),
        }
        Ok(())
    }

    async fn remove_access(
        &self,
        context: &TicketId,
        principal: &Principal,
    ) -> Result<(), PlatformError> {
        lock(&self.state)
            .context(context)?
            .access
            .retain(|entry| entry.principal != *principal);
        Ok(())
    }

    async fn access_entries(&self, context: &TicketId) -> Result<Vec<AccessEntry>, PlatformError> {
        Ok(lock(&self.state).context(context)?.access.clone())
    }

    async fn set_parent(&self, context: &TicketId, parent: &LocationId) -> Result<(), PlatformError> {
        lock(&self.state).context(context)?.info.parent = Some(parent.clone());
        Ok(())
    }

    async fn set_name(&self, context: &TicketId, name: &str) -> Result<(), PlatformError> {
        name.clone_into(&mut lock(&self.state).context(context)?.info.name);
        Ok(())
    }

    async fn set_topic(&self, context: &TicketId, topic: &str) -> Result<(), PlatformError> {
        lock(&self.state).context(context)?.info.topic = Some(topic.to_owned());
        Ok(())
    }

    async fn resolve_user(&self, id: &UserId) -> Result<UserProfile, PlatformError> {
        lock(&self.state)
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("user {id}")))
    }

    async fn send_direct(
        &self,
        user: &UserId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let mut state = lock(&self.state);
        if state.closed_dms.contains(user) {
            return Err(PlatformError::DirectMessagesClosed(user.clone()));
        }
        self.keep_attachment(user.as_str(), &message);
        let id = MessageId::new(state.next("dm"));
        state
            .directs
            .entry(user.clone())
            .or_default()
            .push(stored(id.clone(), message));
        Ok(id)
    }

    async fn fetch_direct_message(
        &self,
        user: &UserId,
        message: &MessageId,
    ) -> Result<StoredMessage, PlatformError> {
        lock(&self.state)
            .directs
            .get(user)
            .and_then(|messages| messages.iter().find(|m| m.id == *message))
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("direct message {message}")))
    }

    async fn clear_direct_controls(
        &self,
        user: &UserId,
        message: &MessageId,
    ) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        let slot = state
            .directs
            .get_mut(user)
            .and_then(|messages| messages.iter_mut().find(|m| m.id == *message))
            .ok_or_else(|| PlatformError::NotFound(format!("direct message {message}")))?;
        slot.controls.clear();
        Ok(())
    }

    fn bot_id(&self) -> UserId {
        self.bot.clone()
    }

    fn workspace_name(&self) -> String {
        self.workspace.clone()
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(42)
    }
}

/// Audit log that keeps every entry.
#[derive(Debug, Default)]
pub struct RecordingAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl RecordingAuditLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes fail.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Entries written so far.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        lock(&self.entries).clone()
    }

    /// Templates of the entries written so far.
    #[must_use]
    pub fn templates(&self) -> Vec<TemplateName> {
        lock(&self.entries).iter().map(|e| e.template).collect()
    }

    /// The last entry rendered from `template`.
    #[must_use]
    pub fn last(&self, template: TemplateName) -> Option<AuditEntry> {
        lock(&self.entries)
            .iter()
            .rev()
            .find(|e| e.template == template)
            .cloned()
    }
}

#[async_trait]
impl AuditLog for RecordingAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), PlatformError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::Transport("audit log unavailable".into()));
        }
        lock(&self.entries).push(entry);
        Ok(())
    }
}

/// Transcript capture returning a small HTML file.
#[derive(Debug, Default)]
pub struct StubTranscripts {
    captures: AtomicUsize,
    failing: AtomicBool,
}

impl StubTranscripts {
    /// Working capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make captures fail.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Captures attempted.
    #[must_use]
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptCapture for StubTranscripts {
    async fn capture(&self, ticket: &TicketId) -> Result<FileArtifact, TranscriptError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TranscriptError::Capture("history unavailable".into()));
        }
        Ok(FileArtifact {
            name: format!("transcript-{ticket}.html"),
            format: TranscriptFormat::Html,
            bytes: format!("<html><body>{ticket}</body></html>").into_bytes(),
        })
    }
}

/// Renders every template as its key for a title and one field per substitution.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTemplates;

impl Templating for PlainTemplates {
    fn render(&self, name: TemplateName, substitutions: &Substitutions) -> FormattedMessage {
        substitutions.iter().fold(
            FormattedMessage {
                title: Some(name.key().to_owned()),
                ..FormattedMessage::default()
            },
            |message, (key, value)| message.field(key, value, false),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_round_trip_through_the_platform() {
        let platform = RecordingPlatform::new();
        let id = TicketId::new("t");
        platform.seed_context(&id, "support-alice", &LocationId::new("loc"), vec![]);
        let message = platform
            .send_message(&id, OutgoingMessage::default().with_content("hi"))
            .await
            .unwrap();
        assert_eq!(
            platform.fetch_message(&id, &message).await.unwrap().content.as_deref(),
            Some("hi")
        );
        platform.delete_message(&id, &message).await.unwrap();
        assert!(matches!(
            platform.delete_message(&id, &message).await,
            Err(PlatformError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn closed_direct_messages_fail() {
        let platform = RecordingPlatform::new();
        let user = UserId::new("u");
        platform.close_direct_messages(&user);
        assert_eq!(
            platform.send_direct(&user, OutgoingMessage::default()).await,
            Err(PlatformError::DirectMessagesClosed(user.clone()))
        );
        assert!(platform.directs(&user).is_empty());
    }

    #[test]
    fn plain_templates_expose_substitutions_as_fields() {
        let rendered = PlainTemplates.render(
            TemplateName::Renamed,
            &Substitutions::new().with("name", "vip-alice"),
        );
        assert_eq!(rendered.title.as_deref(), Some("renameEmbed"));
        assert_eq!(rendered.field_value("name"), Some("vip-alice"));
    }
}
