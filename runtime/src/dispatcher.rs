//! Side-effect dispatcher.
//!
//! Executes the effect list of a committed transition, in order, against the capability
//! ports. The durable state change has already been written when this runs, so no failure
//! here can leave a record inconsistent:
//!
//! - a failed access edit or message operation is logged and counted, and the list continues
//! - a failed transcript capture degrades to attachment-less audit entries and DMs
//! - an undeliverable DM degrades to a `dmError` audit entry
//! - a failed audit write is logged
//!
//! Ledger effects are skipped; the runtime commits them together with the record.

use crate::metrics::EffectMetrics;
use crate::ports::{
    AuditEntry, AuditLog, ChatPlatform, Control, ControlStyle, FileArtifact, MenuOption,
    OutgoingMessage, PlatformError, Templating, TranscriptCapture,
};
use std::sync::Arc;
use std::time::Duration;
use ticketdesk_core::catalog::{ActionId, Stars};
use ticketdesk_core::effect::{AccessEdit, AccessLevel, Effect};
use ticketdesk_core::ids::{MessageId, Principal, TicketId, UserId, UserProfile};
use ticketdesk_core::markup;
use ticketdesk_core::template::{FormattedMessage, Notice, Substitutions, TemplateName};
use tracing::{debug, warn};

/// Title of the intake-message field naming the claimant.
pub const CLAIMED_BY_FIELD: &str = "Claimed by";

/// Labels of the buttons the dispatcher attaches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlLabels {
    /// Close button on the intake message.
    pub close: String,
    /// Claim button.
    pub claim: String,
    /// Unclaim button.
    pub unclaim: String,
    /// Reopen button on the close notice.
    pub reopen: String,
    /// Transcript button on the close notice.
    pub transcript: String,
    /// Delete button on the close notice.
    pub delete: String,
    /// Placeholder of the star-rating menu.
    pub rating_placeholder: String,
}

impl Default for ControlLabels {
    fn default() -> Self {
        Self {
            close: "Close Ticket".into(),
            claim: "Claim".into(),
            unclaim: "Unclaim".into(),
            reopen: "Re-Open".into(),
            transcript: "Transcript".into(),
            delete: "Delete".into(),
            rating_placeholder: "Rate your support experience".into(),
        }
    }
}

impl ControlLabels {
    /// Control row of the intake message for the given claim state.
    #[must_use]
    pub fn intake_row(&self, claim_enabled: bool, claimed: bool) -> Vec<Control> {
        let mut row = vec![Control::button(
            ActionId::CloseTicket.to_string(),
            &self.close,
            ControlStyle::Danger,
        )];
        if claim_enabled {
            row.push(Control::Button {
                id: ActionId::Claim.to_string(),
                label: self.claim.clone(),
                style: ControlStyle::Success,
                disabled: claimed,
            });
            if claimed {
                row.push(Control::button(
                    ActionId::Unclaim.to_string(),
                    &self.unclaim,
                    ControlStyle::Secondary,
                ));
            }
        }
        row
    }

    /// Control row of the close notice.
    #[must_use]
    pub fn close_notice_row(&self) -> Vec<Control> {
        vec![
            Control::button(
                ActionId::Reopen.to_string(),
                &self.reopen,
                ControlStyle::Secondary,
            ),
            Control::button(
                ActionId::Transcript.to_string(),
                &self.transcript,
                ControlStyle::Primary,
            ),
            Control::button(
                ActionId::Delete.to_string(),
                &self.delete,
                ControlStyle::Danger,
            ),
        ]
    }

    /// The 1 to 5 star menu attached to the rating prompt.
    #[must_use]
    pub fn rating_menu(&self) -> Control {
        Control::Menu {
            id: ActionId::RatingMenu.to_string(),
            placeholder: self.rating_placeholder.clone(),
            options: (1..=Stars::MAX)
                .filter_map(Stars::new)
                .map(|stars| MenuOption {
                    value: stars.menu_value(),
                    label: format!(
                        "{} {}",
                        stars.get(),
                        if stars.get() > 1 { "stars" } else { "star" }
                    ),
                })
                .collect(),
        }
    }
}

/// What the dispatcher hands back to the runtime.
#[derive(Debug)]
pub struct DispatchReport<A> {
    /// Actions to reduce immediately (e.g. recording the posted close notice).
    pub follow_ups: Vec<A>,
    /// Actions to reduce after a delay.
    pub delayed: Vec<(Duration, A)>,
    /// Effects that failed and were skipped or degraded.
    pub failures: usize,
}

impl<A> Default for DispatchReport<A> {
    fn default() -> Self {
        Self {
            follow_ups: Vec::new(),
            delayed: Vec::new(),
            failures: 0,
        }
    }
}

/// Executes effect lists against the capability ports.
#[derive(Clone)]
pub struct EffectDispatcher {
    platform: Arc<dyn ChatPlatform>,
    templates: Arc<dyn Templating>,
    transcripts: Arc<dyn TranscriptCapture>,
    audit: Arc<dyn AuditLog>,
    labels: ControlLabels,
    claim_enabled: bool,
}

impl EffectDispatcher {
    /// Wire the dispatcher to its collaborators.
    #[must_use]
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        templates: Arc<dyn Templating>,
        transcripts: Arc<dyn TranscriptCapture>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            platform,
            templates,
            transcripts,
            audit,
            labels: ControlLabels::default(),
            claim_enabled: true,
        }
    }

    /// Override button labels.
    #[must_use]
    pub fn with_labels(mut self, labels: ControlLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Whether intake messages carry a Claim button.
    #[must_use]
    pub const fn with_claim_enabled(mut self, enabled: bool) -> Self {
        self.claim_enabled = enabled;
        self
    }

    /// The chat platform this dispatcher talks to.
    #[must_use]
    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// The templating capability.
    #[must_use]
    pub fn templates(&self) -> &Arc<dyn Templating> {
        &self.templates
    }

    /// The transcript capability.
    #[must_use]
    pub fn transcripts(&self) -> &Arc<dyn TranscriptCapture> {
        &self.transcripts
    }

    /// The audit log.
    #[must_use]
    pub fn audit_log(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// Button labels.
    #[must_use]
    pub const fn labels(&self) -> &ControlLabels {
        &self.labels
    }

    /// Render a notice with the workspace name filled in.
    #[must_use]
    pub fn render(&self, notice: &Notice) -> FormattedMessage {
        self.render_with(notice.template, &notice.substitutions)
    }

    /// Render a template with the workspace name filled in.
    #[must_use]
    pub fn render_with(&self, template: TemplateName, substitutions: &Substitutions) -> FormattedMessage {
        let mut substitutions = substitutions.clone();
        if substitutions.get("server").is_none() {
            substitutions.insert("server", markup::sanitize(&self.platform.workspace_name()));
        }
        self.templates.render(template, &substitutions)
    }

    /// Write an audit entry, logging instead of failing.
    pub async fn audit(&self, template: TemplateName, message: FormattedMessage, attachment: Option<FileArtifact>) -> bool {
        let entry = AuditEntry {
            template,
            message,
            attachment,
        };
        match self.audit.record(entry).await {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, template = %template, "Audit log write failed");
                EffectMetrics::record_failure("audit");
                false
            }
        }
    }

    /// Execute `effects` against `ticket`, in order.
    #[tracing::instrument(skip(self, ticket, effects), fields(ticket = %ticket))]
    pub async fn dispatch<A>(&self, ticket: &TicketId, effects: Vec<Effect<A>>) -> DispatchReport<A> {
        let mut report = DispatchReport::default();
        let mut transcript: Option<FileArtifact> = None;

        for effect in Effect::flatten(effects) {
            let outcome = match effect {
                Effect::None | Effect::Sequential(_) | Effect::Ledger(_) => Ok(()),
                Effect::Access(edit) => self.apply_access(ticket, edit).await.map_err(|e| ("access", e)),
                Effect::Announce(notice) => self
                    .platform
                    .send_message(ticket, OutgoingMessage::embed(self.render(&notice)))
                    .await
                    .map(|_| ())
                    .map_err(|e| ("announce", e)),
                Effect::PostCloseNotice { notice, on_posted } => {
                    let message = OutgoingMessage::embed(self.render(&notice))
                        .with_controls(self.labels.close_notice_row());
                    match self.platform.send_message(ticket, message).await {
                        Ok(message_id) => {
                            report.follow_ups.push(on_posted(message_id));
                            Ok(())
                        }
                        Err(e) => Err(("close_notice", e)),
                    }
                }
                Effect::RefreshIntake {
                    message_id,
                    claimant,
                } => self
                    .refresh_intake(ticket, &message_id, claimant.as_ref())
                    .await
                    .map_err(|e| ("refresh_intake", e)),
                Effect::DeleteMessage(message_id) => {
                    match self.platform.delete_message(ticket, &message_id).await {
                        Err(PlatformError::NotFound(_)) => {
                            debug!(message = %message_id, "Message already gone");
                            Ok(())
                        }
                        other => other.map_err(|e| ("delete_message", e)),
                    }
                }
                Effect::Relocate(location) => self
                    .platform
                    .set_parent(ticket, &location)
                    .await
                    .map_err(|e| ("relocate", e)),
                Effect::Rename(name) => self
                    .platform
                    .set_name(ticket, &name)
                    .await
                    .map_err(|e| ("rename", e)),
                Effect::SetTopic(topic) => self
                    .platform
                    .set_topic(ticket, &topic)
                    .await
                    .map_err(|e| ("set_topic", e)),
                Effect::CaptureTranscript => {
                    match self.transcripts.capture(ticket).await {
                        Ok(artifact) => transcript = Some(artifact),
                        Err(error) => {
                            warn!(%error, "Transcript capture failed, continuing without it");
                            EffectMetrics::record_failure("transcript");
                            report.failures += 1;
                        }
                    }
                    Ok(())
                }
                Effect::Audit {
                    notice,
                    attach_transcript,
                } => {
                    let attachment = if attach_transcript {
                        transcript.clone()
                    } else {
                        None
                    };
                    if !self.audit(notice.template, self.render(&notice), attachment).await {
                        report.failures += 1;
                    }
                    Ok(())
                }
                Effect::Notify {
                    recipient,
                    notice,
                    attach_transcript,
                    rating_prompt,
                } => {
                    let attachment = if attach_transcript {
                        transcript.clone()
                    } else {
                        None
                    };
                    if !self
                        .notify(&recipient, &notice, attachment, rating_prompt.as_ref())
                        .await
                    {
                        report.failures += 1;
                    }
                    Ok(())
                }
                Effect::RemoveContext => self
                    .platform
                    .delete_context(ticket)
                    .await
                    .map_err(|e| ("remove_context", e)),
                Effect::Delay { duration, action } => {
                    report.delayed.push((duration, *action));
                    Ok(())
                }
            };

            if let Err((kind, error)) = outcome {
                warn!(%error, kind, "Effect failed, continuing with the remaining effects");
                EffectMetrics::record_failure(kind);
                report.failures += 1;
            }
        }

        report
    }

    async fn apply_access(&self, ticket: &TicketId, edit: AccessEdit) -> Result<(), PlatformError> {
        match edit {
            AccessEdit::Set(principal, level) => {
                self.platform.set_access(ticket, &principal, level).await
            }
            AccessEdit::Remove(principal) => self.platform.remove_access(ticket, &principal).await,
            AccessEdit::FreezeMembers => {
                let bot = Principal::User(self.platform.bot_id());
                for entry in self.platform.access_entries(ticket).await? {
                    if matches!(entry.principal, Principal::User(_)) && entry.principal != bot {
                        self.platform
                            .set_access(ticket, &entry.principal, AccessLevel::ReadOnly)
                            .await?;
                    }
                }
                Ok(())
            }
        }
    }

    async fn refresh_intake(
        &self,
        ticket: &TicketId,
        message_id: &MessageId,
        claimant: Option<&UserProfile>,
    ) -> Result<(), PlatformError> {
        let current = self.platform.fetch_message(ticket, message_id).await?;
        let mut embed = current.embed.unwrap_or_default();
        embed.remove_field(CLAIMED_BY_FIELD);
        if let Some(claimant) = claimant {
            embed = embed.field(
                CLAIMED_BY_FIELD,
                format!(
                    "> {} ({})",
                    markup::user_mention(&claimant.id),
                    markup::sanitize(&claimant.tag)
                ),
                false,
            );
        }
        let replacement = OutgoingMessage {
            content: current.content,
            embed: Some(embed),
            controls: self
                .labels
                .intake_row(self.claim_enabled, claimant.is_some()),
            attachment: None,
        };
        self.platform
            .edit_message(ticket, message_id, replacement)
            .await
    }

    /// Best-effort direct message. Returns `false` when delivery failed and the failure was
    /// written to the audit log instead.
    async fn notify(
        &self,
        recipient: &UserId,
        notice: &Notice,
        attachment: Option<FileArtifact>,
        rating_prompt: Option<&Notice>,
    ) -> bool {
        let message = OutgoingMessage::embed(self.render(notice)).with_attachment(attachment);
        let delivered = match self.platform.send_direct(recipient, message).await {
            Ok(_) => match rating_prompt {
                Some(prompt) => {
                    let prompt = OutgoingMessage::embed(self.render(prompt))
                        .with_controls(vec![self.labels.rating_menu()]);
                    self.platform.send_direct(recipient, prompt).await.map(|_| ())
                }
                None => Ok(()),
            },
            Err(error) => Err(error),
        };

        match delivered {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, recipient = %recipient, "Direct message failed, recording in audit log");
                EffectMetrics::record_dm_failure();
                let substitutions = Substitutions::new()
                    .with("user", markup::user_mention(recipient))
                    .with("user.id", recipient.as_str());
                let message = self.render_with(TemplateName::DmError, &substitutions);
                self.audit(TemplateName::DmError, message, None).await;
                false
            }
        }
    }
}

impl std::fmt::Debug for EffectDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectDispatcher")
            .field("labels", &self.labels)
            .field("claim_enabled", &self.claim_enabled)
            .finish_non_exhaustive()
    }
}
