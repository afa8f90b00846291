//! Ticket creation: category pick, intake form, context allocation and the Open transition.
//!
//! The quota is counted twice, once before the form is shown and again on submission,
//! because several forms can be open at the same time. A context that was allocated for a
//! submission the engine then refuses is deleted again.

use std::sync::Arc;
use ticketdesk_core::catalog::ActionId;
use ticketdesk_core::category::{CategoryDefinition, NamingStrategy};
use ticketdesk_core::effect::AccessLevel;
use ticketdesk_core::ids::{Actor, CategoryKey, Principal, TicketId};
use ticketdesk_core::lifecycle::{LifecycleAction, LifecycleRequest, TicketContext};
use ticketdesk_core::markup;
use ticketdesk_core::record::Counter;
use ticketdesk_core::rejection::{Authority, RejectReason};
use ticketdesk_core::template::{FormattedMessage, Substitutions, TemplateName};
use ticketdesk_runtime::ports::{AccessEntry, NewContext, OutgoingMessage};
use ticketdesk_runtime::{RuntimeError, TicketRuntime};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::DeskError;
use crate::reply::{self, FormFieldSpec, FormPrompt, Reply};

/// Field id of the `index`-th intake question, counted from zero (`question1` is the first).
#[must_use]
pub fn question_field(index: usize) -> String {
    format!("question{}", index + 1)
}

/// Drives ticket creation.
#[derive(Clone, Debug)]
pub struct CreationWorkflow {
    runtime: TicketRuntime,
    settings: Arc<Settings>,
}

impl CreationWorkflow {
    /// Workflow over `runtime`.
    #[must_use]
    pub const fn new(runtime: TicketRuntime, settings: Arc<Settings>) -> Self {
        Self { runtime, settings }
    }

    /// A category was picked. Returns the intake form, or creates the ticket right away when
    /// the category has no questions.
    ///
    /// # Errors
    ///
    /// Store or platform failures.
    pub async fn begin(&self, actor: &Actor, key: &CategoryKey) -> Result<Reply, DeskError> {
        let Some(category) = self.settings.categories.by_key(key) else {
            debug!(%key, "Unknown category");
            return Ok(Reply::None);
        };
        if let Some(refusal) = self.precheck(actor, category).await? {
            return Ok(refusal);
        }
        if category.questions.is_empty() {
            return self.submit(actor, key, &[]).await;
        }

        Ok(Reply::Form(FormPrompt {
            id: ActionId::CategoryForm(key.clone()).to_string(),
            title: category.form_title().to_owned(),
            fields: category
                .questions
                .iter()
                .enumerate()
                .map(|(i, question)| FormFieldSpec::from_question(question_field(i), question))
                .collect(),
        }))
    }

    /// The intake form was submitted.
    ///
    /// # Errors
    ///
    /// Store or platform failures. The allocated context is removed again before returning.
    #[tracing::instrument(skip(self, actor, answers), fields(actor = %actor.id()))]
    pub async fn submit(
        &self,
        actor: &Actor,
        key: &CategoryKey,
        answers: &[(String, String)],
    ) -> Result<Reply, DeskError> {
        let Some(category) = self.settings.categories.by_key(key) else {
            debug!(%key, "Unknown category");
            return Ok(Reply::None);
        };
        if let Some(refusal) = self.precheck(actor, category).await? {
            return Ok(refusal);
        }

        let name = self.context_name(actor, category).await?;
        let platform = self.runtime.dispatcher().platform().clone();
        let bot = platform.bot_id();
        let mut access = vec![
            AccessEntry {
                principal: Principal::Everyone,
                level: AccessLevel::Hidden,
            },
            AccessEntry {
                principal: Principal::User(actor.id().clone()),
                level: AccessLevel::Full,
            },
            AccessEntry {
                principal: Principal::User(bot),
                level: AccessLevel::Full,
            },
        ];
        access.extend(category.staff_role_ids.iter().map(|role| AccessEntry {
            principal: Principal::Role(role.clone()),
            level: AccessLevel::Full,
        }));
        let participants = access
            .iter()
            .filter(|entry| entry.level != AccessLevel::Hidden)
            .map(|entry| entry.principal.clone())
            .collect();

        let id = platform
            .create_context(NewContext {
                name: name.clone(),
                parent: category.location_id.clone(),
                topic: format!(
                    "Ticket Creator: {} | Ticket Type: {}",
                    markup::sanitize(&actor.profile.tag),
                    category.name
                ),
                access,
            })
            .await?;

        let intake = self.intake_message(actor, category, &id, &name, answers);
        let intake_msg = match platform.send_message(&id, intake).await {
            Ok(message) => message,
            Err(error) => {
                self.discard(&id).await;
                return Err(error.into());
            }
        };

        let open_count = self.runtime.open_tickets_of(actor.id()).await?;
        let ticket = TicketContext::new(id.clone(), name.clone())
            .with_owner(actor.profile.clone())
            .with_participants(participants);
        let request = LifecycleRequest::new(
            ticket,
            actor.clone(),
            LifecycleAction::Open {
                category: key.clone(),
                intake_msg,
                open_count,
            },
        );
        match self.runtime.apply(request).await {
            Ok(_) => {}
            Err(RuntimeError::Rejected(reason)) => {
                self.discard(&id).await;
                return Ok(reply::rejection(
                    &reason,
                    "open",
                    &self.settings.messages,
                    self.runtime.dispatcher(),
                ));
            }
            Err(error) => {
                self.discard(&id).await;
                return Err(error.into());
            }
        }

        info!(ticket_id = %id, %name, category = %category.key, "Ticket created");
        let substitutions = Substitutions::new()
            .with_user("user", &actor.profile)
            .with("channel", markup::context_mention(&id))
            .with("ticketName", markup::sanitize(&name))
            .with("ticketType", category.name.clone());
        Ok(Reply::ephemeral_embed(self.runtime.dispatcher().render_with(
            TemplateName::TicketCreated,
            &substitutions,
        )))
    }

    /// Creator groups and quota. `Some` is the refusal to send.
    async fn precheck(
        &self,
        actor: &Actor,
        category: &CategoryDefinition,
    ) -> Result<Option<Reply>, DeskError> {
        let reason = if !category.creator_role_ids.is_empty()
            && !actor.has_any_role(&category.creator_role_ids)
        {
            Some(RejectReason::NotAuthorized {
                required: Authority::CategoryCreator,
            })
        } else {
            let max = self.settings.policy.max_open_tickets;
            let open = self.runtime.open_tickets_of(actor.id()).await?;
            (open >= max).then_some(RejectReason::QuotaExceeded { max })
        };
        Ok(reason.map(|reason| {
            debug!(actor = %actor.id(), reason = reason.label(), "Creation refused");
            reply::rejection(
                &reason,
                "open",
                &self.settings.messages,
                self.runtime.dispatcher(),
            )
        }))
    }

    async fn context_name(
        &self,
        actor: &Actor,
        category: &CategoryDefinition,
    ) -> Result<String, DeskError> {
        Ok(match category.naming {
            NamingStrategy::Username => format!("{}-{}", category.name, actor.profile.username),
            NamingStrategy::Sequence => {
                let next = self
                    .runtime
                    .store()
                    .counter(Counter::TotalTickets)
                    .await?
                    .unwrap_or(self.settings.sequence_start);
                format!("{}-{next}", category.name)
            }
        })
    }

    fn intake_message(
        &self,
        actor: &Actor,
        category: &CategoryDefinition,
        id: &TicketId,
        name: &str,
        answers: &[(String, String)],
    ) -> OutgoingMessage {
        let substitutions = Substitutions::new()
            .with_user("user", &actor.profile)
            .with("channel", markup::context_mention(id))
            .with("ticketName", markup::sanitize(name))
            .with("ticketType", category.name.clone());
        let mut embed: FormattedMessage = self
            .runtime
            .dispatcher()
            .render_with(TemplateName::NewTicket, &substitutions);
        if let Some(title) = &category.embed_title {
            embed.title = Some(substitutions.apply(title));
        }
        if let Some(description) = &category.description {
            embed.description = Some(substitutions.apply(description));
        }
        if let Some(color) = &category.color {
            embed.color = Some(color.clone());
        }

        for (i, question) in category.questions.iter().enumerate() {
            let field = question_field(i);
            let answer = answers
                .iter()
                .find(|(id, _)| *id == field)
                .map(|(_, value)| value.trim())
                .filter(|value| !value.is_empty());
            if let Some(answer) = answer {
                embed = embed.field(question.label.clone(), format!(">>> {answer}"), false);
            }
        }

        if let Some(hours) = self.settings.working_hours.as_ref().filter(|h| h.add_field) {
            let window = hours.substitutions(self.runtime.environment().now());
            embed = embed.field(
                window.apply(&hours.field_title),
                window.apply(&hours.field_value),
                false,
            );
        }

        let mut mentions = vec![markup::user_mention(actor.id())];
        mentions.extend(category.ping_role_ids.iter().map(markup::role_mention));
        OutgoingMessage::embed(embed)
            .with_content(mentions.join(" "))
            .with_controls(
                self.runtime
                    .dispatcher()
                    .labels()
                    .intake_row(self.settings.policy.claim_enabled, false),
            )
    }

    async fn discard(&self, id: &TicketId) {
        if let Err(error) = self.runtime.dispatcher().platform().delete_context(id).await {
            warn!(ticket_id = %id, %error, "Failed to delete abandoned context");
        }
    }
}
