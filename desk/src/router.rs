//! The event router.
//!
//! Classifies each [`InboundEvent`], runs the gates and hands the event to the creation
//! workflow, the feedback flow or the lifecycle runtime. Every outcome, including refusals and
//! failures, becomes a [`Reply`].

use std::sync::Arc;
use ticketdesk_core::catalog::{ActionId, CommandName};
use ticketdesk_core::effect::AccessLevel;
use ticketdesk_core::ids::{Actor, CategoryKey, Principal, TicketId, UserId};
use ticketdesk_core::lifecycle::{LifecycleAction, LifecycleRequest, TicketContext};
use ticketdesk_core::markup;
use ticketdesk_core::record::TicketRecord;
use ticketdesk_core::template::{Substitutions, TemplateName};
use ticketdesk_runtime::cooldown::CooldownTracker;
use ticketdesk_runtime::{RuntimeError, TicketRuntime};
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::creation::CreationWorkflow;
use crate::error::DeskError;
use crate::event::{Command, EventKind, InboundEvent};
use crate::feedback::FeedbackFlow;
use crate::gates::{self, Gate};
use crate::reply::{self, Reply};

/// Routes inbound events.
#[derive(Debug)]
pub struct Router {
    runtime: TicketRuntime,
    settings: Arc<Settings>,
    creation: CreationWorkflow,
    feedback: FeedbackFlow,
    creation_cooldown: CooldownTracker<UserId>,
    command_cooldown: CooldownTracker<(UserId, CommandName)>,
}

impl Router {
    /// Router over `runtime` with cooldowns from `settings`.
    #[must_use]
    pub fn new(runtime: TicketRuntime, settings: Arc<Settings>) -> Self {
        Self {
            creation: CreationWorkflow::new(runtime.clone(), settings.clone()),
            feedback: FeedbackFlow::new(runtime.clone(), settings.clone()),
            creation_cooldown: CooldownTracker::new(settings.creation_cooldown),
            command_cooldown: CooldownTracker::new(settings.command_cooldown),
            runtime,
            settings,
        }
    }

    /// The runtime events are applied to.
    #[must_use]
    pub const fn runtime(&self) -> &TicketRuntime {
        &self.runtime
    }

    /// The validated configuration.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle one event. Never fails; store and platform errors become the generic failure
    /// reply.
    #[tracing::instrument(
        skip(self, event),
        fields(correlation_id = %event.correlation_id, actor = %event.actor.id(), event = %event.label())
    )]
    pub async fn handle(&self, event: InboundEvent) -> Reply {
        match self.route(&event).await {
            Ok(reply) => reply,
            Err(error) => {
                error!(%error, "Event failed");
                Reply::ephemeral(self.settings.messages.generic_failure.clone())
            }
        }
    }

    async fn route(&self, event: &InboundEvent) -> Result<Reply, DeskError> {
        let actor = &event.actor;
        if gates::is_blacklisted(self.runtime.store().as_ref(), actor).await? {
            Gate::Blacklist.refused();
            return Ok(self.embed(
                TemplateName::Blacklisted,
                Substitutions::new().with_user("user", &actor.profile),
            ));
        }

        match &event.kind {
            EventKind::Command(command) => self.command(event, command).await,
            EventKind::Button { id } => match ActionId::parse(id) {
                ActionId::CategoryButton(key) => self.create(event, &key).await,
                ActionId::CloseTicket => self.transition(event, LifecycleAction::Close).await,
                ActionId::Claim => self.transition(event, LifecycleAction::Claim).await,
                ActionId::Unclaim => self.transition(event, LifecycleAction::Unclaim).await,
                ActionId::Reopen => self.transition(event, LifecycleAction::Reopen).await,
                ActionId::Delete => self.transition(event, LifecycleAction::Delete).await,
                ActionId::Transcript => self.transcript(event).await,
                other => {
                    debug!(action = %other, "Ignoring button");
                    Ok(Reply::None)
                }
            },
            EventKind::Menu {
                id,
                values,
                message,
            } => match ActionId::parse(id) {
                ActionId::CategoryMenu => match values.first() {
                    Some(key) => self.create(event, &CategoryKey::new(key.as_str())).await,
                    None => Ok(Reply::None),
                },
                ActionId::RatingMenu => {
                    self.feedback
                        .select(actor, values.first().map(String::as_str), message.as_ref())
                        .await
                }
                other => {
                    debug!(action = %other, "Ignoring menu");
                    Ok(Reply::None)
                }
            },
            EventKind::Form {
                id,
                fields,
                message,
            } => match ActionId::parse(id) {
                ActionId::CategoryForm(key) => self.creation.submit(actor, &key, fields).await,
                ActionId::RatingForm(stars) => {
                    self.feedback
                        .submit(actor, stars, fields, message.as_ref())
                        .await
                }
                other => {
                    debug!(action = %other, "Ignoring form");
                    Ok(Reply::None)
                }
            },
        }
    }

    /// Creation gates, then the intake form.
    async fn create(&self, event: &InboundEvent, key: &CategoryKey) -> Result<Reply, DeskError> {
        let actor = &event.actor;
        if self.settings.categories.by_key(key).is_none() {
            debug!(%key, "Unknown category");
            return Ok(Reply::None);
        }
        self.creation_cooldown.purge_expired();
        if let Err(remaining) = self.creation_cooldown.try_acquire(actor.id()) {
            Gate::Cooldown.refused();
            let seconds = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Ok(self.embed(
                TemplateName::Cooldown,
                Substitutions::new()
                    .with_user("user", &actor.profile)
                    .with("time", seconds.to_string()),
            ));
        }

        let now = self.runtime.environment().now();
        if let Some(hours) = self.settings.working_hours.as_ref().filter(|h| h.blocks(now)) {
            Gate::WorkingHours.refused();
            return Ok(self.embed(
                TemplateName::WorkingHours,
                hours.substitutions(now).with_user("user", &actor.profile),
            ));
        }

        self.creation.begin(actor, key).await
    }

    async fn command(&self, event: &InboundEvent, command: &Command) -> Result<Reply, DeskError> {
        let name = command.name();
        if self.settings.is_disabled(name) {
            debug!(command = %name, "Command disabled");
            return Ok(Reply::None);
        }
        self.command_cooldown.purge_expired();
        if let Err(remaining) = self
            .command_cooldown
            .try_acquire(&(event.actor.id().clone(), name))
        {
            Gate::CommandCooldown.refused();
            let wait = chrono::Duration::from_std(remaining)
                .unwrap_or_else(|_| chrono::Duration::zero());
            let until = self.runtime.environment().now() + wait;
            return Ok(Reply::ephemeral(format!(
                "Please wait, you are on a cooldown for `{name}`. You can use it again {}.",
                markup::timestamp(until.timestamp(), 'R')
            )));
        }

        let action = match command {
            Command::Claim => LifecycleAction::Claim,
            Command::Unclaim => LifecycleAction::Unclaim,
            Command::Close => LifecycleAction::Close,
            Command::Reopen => LifecycleAction::Reopen,
            Command::Delete => LifecycleAction::Delete,
            Command::Move { category } => LifecycleAction::Move {
                category_name: category.clone(),
            },
            Command::Rename { name } => LifecycleAction::Rename { name: name.clone() },
            Command::Transfer { user } => LifecycleAction::Transfer {
                new_owner: user.clone(),
            },
            Command::Remove { user, role } => match (user, role) {
                (Some(user), None) => LifecycleAction::RemoveParticipant {
                    target: Principal::User(user.id.clone()),
                    label: user.tag.clone(),
                },
                (None, Some((role, label))) => LifecycleAction::RemoveParticipant {
                    target: Principal::Role(role.clone()),
                    label: label.clone(),
                },
                _ => {
                    return Ok(Reply::ephemeral(
                        "Please provide either a user or a role, but not both.",
                    ));
                }
            },
            Command::Ping => return Ok(self.ping(event)),
        };
        self.transition(event, action).await
    }

    fn ping(&self, event: &InboundEvent) -> Reply {
        let gateway = self.runtime.dispatcher().platform().latency().as_millis();
        let processing = (self.runtime.environment().now() - event.created_at)
            .num_milliseconds()
            .max(0);
        let message = self.runtime.dispatcher().render_with(
            TemplateName::Ping,
            &Substitutions::new()
                .with_user("user", &event.actor.profile)
                .with("ping", gateway.to_string())
                .with("latency", processing.to_string()),
        );
        Reply::public_embed(message)
    }

    /// The ticket behind the event's context, or the refusal to send.
    async fn lookup(
        &self,
        event: &InboundEvent,
    ) -> Result<Result<(TicketId, TicketRecord), Reply>, DeskError> {
        let record = match &event.context {
            Some(id) => self.runtime.record(id).await?.map(|record| (id.clone(), record)),
            None => None,
        };
        Ok(record.ok_or_else(|| {
            Gate::Authorization.refused();
            Reply::ephemeral(self.settings.messages.not_in_a_ticket.clone())
        }))
    }

    /// Whether `action` needs staff under the current policy.
    fn staff_only(&self, action: &LifecycleAction) -> bool {
        let policy = &self.settings.policy;
        match action {
            LifecycleAction::Claim
            | LifecycleAction::Delete
            | LifecycleAction::Move { .. }
            | LifecycleAction::Rename { .. }
            | LifecycleAction::Transfer { .. }
            | LifecycleAction::RemoveParticipant { .. } => true,
            LifecycleAction::Close => policy.close_staff_only,
            LifecycleAction::Reopen => policy.reopen_staff_only,
            _ => false,
        }
    }

    fn refuse_non_staff(&self, actor: &Actor, record: &TicketRecord) -> Option<Reply> {
        if gates::is_staff(self.runtime.environment(), actor, record) {
            return None;
        }
        Gate::Authorization.refused();
        Some(Reply::ephemeral(self.settings.messages.not_allowed.clone()))
    }

    /// What the platform currently knows about the ticket's context.
    async fn context(
        &self,
        id: &TicketId,
        record: &TicketRecord,
    ) -> Result<TicketContext, DeskError> {
        let platform = self.runtime.dispatcher().platform();
        let info = platform.context_info(id).await?;
        let participants = platform
            .access_entries(id)
            .await?
            .into_iter()
            .filter(|entry| entry.level != AccessLevel::Hidden)
            .map(|entry| entry.principal)
            .collect();
        let mut context = TicketContext::new(id.clone(), info.name).with_participants(participants);
        match platform.resolve_user(&record.owner_id).await {
            Ok(owner) => context = context.with_owner(owner),
            Err(error) => debug!(%error, owner = %record.owner_id, "Owner not resolvable"),
        }
        Ok(context)
    }

    async fn transition(
        &self,
        event: &InboundEvent,
        action: LifecycleAction,
    ) -> Result<Reply, DeskError> {
        let (id, record) = match self.lookup(event).await? {
            Ok(found) => found,
            Err(refusal) => return Ok(refusal),
        };
        if self.staff_only(&action) {
            if let Some(refusal) = self.refuse_non_staff(&event.actor, &record) {
                return Ok(refusal);
            }
        }

        let name = action.name();
        let acknowledgement = acknowledgement(&action);
        let context = self.context(&id, &record).await?;
        let request = LifecycleRequest::new(context, event.actor.clone(), action);
        match self.runtime.apply(request).await {
            Ok(_) => Ok(Reply::ephemeral(acknowledgement)),
            Err(RuntimeError::Rejected(reason)) => Ok(reply::rejection(
                &reason,
                name,
                &self.settings.messages,
                self.runtime.dispatcher(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    /// Manual transcript: capture, audit with the file attached, confirm.
    async fn transcript(&self, event: &InboundEvent) -> Result<Reply, DeskError> {
        let (id, record) = match self.lookup(event).await? {
            Ok(found) => found,
            Err(refusal) => return Ok(refusal),
        };
        if let Some(refusal) = self.refuse_non_staff(&event.actor, &record) {
            return Ok(refusal);
        }

        let dispatcher = self.runtime.dispatcher();
        let info = dispatcher.platform().context_info(&id).await?;
        let file = dispatcher.transcripts().capture(&id).await?;
        let substitutions = Substitutions::new()
            .with_user("user", &event.actor.profile)
            .with("channel", markup::context_mention(&id))
            .with("ticketName", markup::sanitize(&info.name))
            .with("ticketType", record.ticket_type.clone());
        let entry = dispatcher.render_with(TemplateName::LogTranscript, &substitutions);
        dispatcher
            .audit(TemplateName::LogTranscript, entry, Some(file))
            .await;
        info!(ticket_id = %id, "Transcript saved");
        Ok(Reply::ephemeral_embed(
            dispatcher.render_with(TemplateName::Transcript, &substitutions),
        ))
    }

    fn embed(&self, template: TemplateName, substitutions: Substitutions) -> Reply {
        Reply::ephemeral_embed(self.runtime.dispatcher().render_with(template, &substitutions))
    }
}

fn acknowledgement(action: &LifecycleAction) -> String {
    match action {
        LifecycleAction::Claim => "You successfully claimed this ticket!".to_owned(),
        LifecycleAction::Unclaim => "You successfully unclaimed this ticket!".to_owned(),
        LifecycleAction::Close => "This ticket has been closed.".to_owned(),
        LifecycleAction::Reopen => "This ticket has been reopened.".to_owned(),
        LifecycleAction::Delete => "This ticket will be deleted shortly.".to_owned(),
        LifecycleAction::Move { category_name } => {
            format!("Ticket moved to **{}**.", markup::sanitize(category_name.trim()))
        }
        LifecycleAction::Rename { name } => {
            format!("Ticket renamed to **{}**.", markup::sanitize(name))
        }
        LifecycleAction::Transfer { new_owner } => {
            format!("Ticket transferred to {}.", markup::user_mention(&new_owner.id))
        }
        LifecycleAction::RemoveParticipant { label, .. } => {
            format!("Removed **{}** from the ticket.", markup::sanitize(label))
        }
        LifecycleAction::Open { .. }
        | LifecycleAction::Purge
        | LifecycleAction::AttachCloseNotice { .. } => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketdesk_core::ids::UserProfile;

    #[test]
    fn acknowledgements_name_the_result() {
        assert_eq!(
            acknowledgement(&LifecycleAction::Claim),
            "You successfully claimed this ticket!"
        );
        assert_eq!(
            acknowledgement(&LifecycleAction::Rename {
                name: "vip_ticket".into()
            }),
            "Ticket renamed to **vip\\_ticket**."
        );
        assert_eq!(
            acknowledgement(&LifecycleAction::Transfer {
                new_owner: UserProfile::new("bob-id", "bob", "bob")
            }),
            "Ticket transferred to <@bob-id>."
        );
    }
}
