//! Star ratings submitted from the delete notification.

use std::sync::Arc;
use ticketdesk_core::catalog::{ActionId, Stars};
use ticketdesk_core::ids::{Actor, MessageId};
use ticketdesk_core::markup;
use ticketdesk_core::record::{Counter, ListName};
use ticketdesk_core::template::{Substitutions, TemplateName};
use ticketdesk_runtime::TicketRuntime;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::DeskError;
use crate::reply::{FormFieldSpec, FormPrompt, Reply};

const UNKNOWN_TICKET: &str = "Unknown";

/// Field id of the `index`-th rating question, counted from zero (`ratingQuestion1` is the first).
#[must_use]
pub fn rating_field(index: usize) -> String {
    format!("ratingQuestion{}", index + 1)
}

/// Collects ratings.
#[derive(Clone, Debug)]
pub struct FeedbackFlow {
    runtime: TicketRuntime,
    settings: Arc<Settings>,
}

impl FeedbackFlow {
    /// Flow over `runtime`.
    #[must_use]
    pub const fn new(runtime: TicketRuntime, settings: Arc<Settings>) -> Self {
        Self { runtime, settings }
    }

    /// A star value was picked from the rating menu.
    ///
    /// # Errors
    ///
    /// Store failures when there is no form and the rating is recorded right away.
    pub async fn select(
        &self,
        actor: &Actor,
        value: Option<&str>,
        prompt: Option<&MessageId>,
    ) -> Result<Reply, DeskError> {
        let Some(stars) = value.and_then(Stars::from_menu_value) else {
            return Ok(Reply::None);
        };
        if self.settings.rating_questions.is_empty() {
            return self.submit(actor, stars, &[], prompt).await;
        }
        Ok(Reply::Form(FormPrompt {
            id: ActionId::RatingForm(stars).to_string(),
            title: "Ticket Feedback".to_owned(),
            fields: self
                .settings
                .rating_questions
                .iter()
                .enumerate()
                .map(|(i, question)| FormFieldSpec::from_question(rating_field(i), question))
                .collect(),
        }))
    }

    /// The rating form was submitted.
    ///
    /// # Errors
    ///
    /// Store failures while updating the review counter or the ratings list.
    #[tracing::instrument(skip(self, actor, answers), fields(actor = %actor.id(), stars = stars.get()))]
    pub async fn submit(
        &self,
        actor: &Actor,
        stars: Stars,
        answers: &[(String, String)],
        prompt: Option<&MessageId>,
    ) -> Result<Reply, DeskError> {
        let dispatcher = self.runtime.dispatcher();
        let platform = dispatcher.platform();

        let mut ticket = UNKNOWN_TICKET.to_owned();
        if let Some(prompt) = prompt {
            match platform.fetch_direct_message(actor.id(), prompt).await {
                Ok(message) => {
                    if let Some(footer) = message.embed.and_then(|embed| embed.footer) {
                        ticket = footer;
                    }
                }
                Err(error) => warn!(%error, "Rating prompt could not be read"),
            }
            if let Err(error) = platform.clear_direct_controls(actor.id(), prompt).await {
                warn!(%error, "Rating prompt controls could not be cleared");
            }
        }

        let substitutions = Substitutions::new()
            .with_user("user", &actor.profile)
            .with("ticketName", ticket.clone())
            .with("stars", stars.render())
            .with("rating", stars.get().to_string());
        let mut entry = dispatcher.render_with(TemplateName::LogFeedback, &substitutions);
        for (i, question) in self.settings.rating_questions.iter().enumerate() {
            let field = rating_field(i);
            let answer = answers
                .iter()
                .find(|(id, _)| *id == field)
                .map(|(_, value)| value.trim())
                .filter(|value| !value.is_empty());
            if let Some(answer) = answer {
                entry = entry.field(
                    question.label.clone(),
                    format!(">>> {}", markup::sanitize(answer)),
                    false,
                );
            }
        }
        dispatcher.audit(TemplateName::LogFeedback, entry, None).await;

        let store = self.runtime.store();
        let reviews = store.counter(Counter::TotalReviews).await?.unwrap_or(0);
        store
            .set_counter(Counter::TotalReviews, reviews.saturating_add(1))
            .await?;
        store.push(ListName::Ratings, stars.get().to_string()).await?;
        info!(%ticket, "Feedback recorded");

        Ok(Reply::ephemeral_embed(dispatcher.render_with(
            TemplateName::FeedbackThanks,
            &Substitutions::new().with_user("user", &actor.profile),
        )))
    }
}
