//! The ticket lifecycle engine.
//!
//! A finite state machine per ticket context with the states `Open` and `Closed` plus the
//! terminal pseudo-state "no record" reached by the internal `Purge` transition. Every
//! transition validates its guards against the record it is handed, then mutates the record
//! and lists the effects in execution order: ledger writes, access edits, message sends and
//! edits, transcript capture, audit entries, direct notifications.

use crate::category::CategoryDefinition;
use crate::effect::{AccessEdit, AccessLevel, Effect, Ledger};
use crate::environment::LifecycleEnvironment;
use crate::ids::{Actor, CategoryKey, MessageId, Principal, TicketId, UserProfile};
use crate::markup;
use crate::record::{Counter, TicketRecord, TicketStatus};
use crate::reducer::Reducer;
use crate::rejection::{Authority, RejectReason, TicketCondition};
use crate::template::{Notice, TemplateName};
use crate::{Effects, smallvec};

/// What the platform knows about the ticket context at the time of the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketContext {
    /// Context id, also the store key.
    pub id: TicketId,
    /// Current display name.
    pub name: String,
    /// Resolved profile of the recorded owner, when the platform could resolve it.
    pub owner: Option<UserProfile>,
    /// Principals that currently hold an access entry.
    pub participants: Vec<Principal>,
}

impl TicketContext {
    /// A context with no known owner or participants.
    #[must_use]
    pub fn new(id: impl Into<TicketId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner: None,
            participants: Vec::new(),
        }
    }

    /// Attach the owner profile.
    #[must_use]
    pub fn with_owner(mut self, owner: UserProfile) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Attach the current access entries.
    #[must_use]
    pub fn with_participants(mut self, participants: Vec<Principal>) -> Self {
        self.participants = participants;
        self
    }
}

/// The requested transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Create the record for a freshly allocated context.
    Open {
        /// Category the intake form belonged to.
        category: CategoryKey,
        /// The intake message already posted into the context.
        intake_msg: MessageId,
        /// Open tickets the actor holds right now.
        open_count: usize,
    },
    /// Take the claim.
    Claim,
    /// Release the claim.
    Unclaim,
    /// Close the ticket.
    Close,
    /// Reopen a closed ticket.
    Reopen,
    /// Schedule the ticket for removal.
    Delete,
    /// Remove the record and the context. Only fired by the delete timer.
    Purge,
    /// File the ticket under another category.
    Move {
        /// Target category display name, matched case-insensitively.
        category_name: String,
    },
    /// Rename the context.
    Rename {
        /// New display name.
        name: String,
    },
    /// Hand ownership to another user.
    Transfer {
        /// The new owner.
        new_owner: UserProfile,
    },
    /// Delete a participant's access entry.
    RemoveParticipant {
        /// The user or role to remove.
        target: Principal,
        /// Human-readable label for notices (tag or role name).
        label: String,
    },
    /// Record the id of the close notice the dispatcher just posted.
    AttachCloseNotice {
        /// The posted close notice.
        message_id: MessageId,
    },
}

impl LifecycleAction {
    /// Stable name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Claim => "claim",
            Self::Unclaim => "unclaim",
            Self::Close => "close",
            Self::Reopen => "reopen",
            Self::Delete => "delete",
            Self::Purge => "purge",
            Self::Move { .. } => "move",
            Self::Rename { .. } => "rename",
            Self::Transfer { .. } => "transfer",
            Self::RemoveParticipant { .. } => "remove",
            Self::AttachCloseNotice { .. } => "attach_close_notice",
        }
    }
}

/// One inbound request against one ticket context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleRequest {
    /// Where.
    pub ticket: TicketContext,
    /// Who.
    pub actor: Actor,
    /// What.
    pub action: LifecycleAction,
}

impl LifecycleRequest {
    /// Bundle a request.
    #[must_use]
    pub const fn new(ticket: TicketContext, actor: Actor, action: LifecycleAction) -> Self {
        Self {
            ticket,
            actor,
            action,
        }
    }

    /// Same ticket and actor, different action.
    #[must_use]
    pub fn follow_up(&self, action: LifecycleAction) -> Self {
        Self {
            ticket: self.ticket.clone(),
            actor: self.actor.clone(),
            action,
        }
    }
}

/// The lifecycle reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleEngine;

impl LifecycleEngine {
    /// Create the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

type Outcome = Result<Effects<LifecycleRequest>, RejectReason>;

impl Reducer for LifecycleEngine {
    type State = Option<TicketRecord>;
    type Action = LifecycleRequest;
    type Environment = LifecycleEnvironment;
    type Rejection = RejectReason;

    fn reduce(
        &self,
        state: &mut Self::State,
        request: Self::Action,
        env: &Self::Environment,
    ) -> Outcome {
        let step = Step {
            request: &request,
            env,
        };

        match &request.action {
            LifecycleAction::Open {
                category,
                intake_msg,
                open_count,
            } => step.open(state, category, intake_msg, *open_count),
            LifecycleAction::Claim => step.claim(live(state)?),
            LifecycleAction::Unclaim => step.unclaim(live(state)?),
            LifecycleAction::Close => step.close(live(state)?),
            LifecycleAction::Reopen => step.reopen(live(state)?),
            LifecycleAction::Delete => step.delete(live(state)?),
            LifecycleAction::Purge => step.purge(state),
            LifecycleAction::Move { category_name } => step.relocate(live(state)?, category_name),
            LifecycleAction::Rename { name } => step.rename(live(state)?, name),
            LifecycleAction::Transfer { new_owner } => step.transfer(live(state)?, new_owner),
            LifecycleAction::RemoveParticipant { target, label } => {
                step.remove_participant(live(state)?, target, label)
            }
            LifecycleAction::AttachCloseNotice { message_id } => {
                step.attach_close_notice(state, message_id)
            }
        }
    }
}

/// The record, unless it is missing or already scheduled for purge.
fn live(state: &mut Option<TicketRecord>) -> Result<&mut TicketRecord, RejectReason> {
    let record = state.as_mut().ok_or(RejectReason::NotATicket)?;
    if record.pending_deletion {
        return Err(RejectReason::AlreadyInState(TicketCondition::PendingDeletion));
    }
    Ok(record)
}

/// Borrowed view over one reduction.
struct Step<'a> {
    request: &'a LifecycleRequest,
    env: &'a LifecycleEnvironment,
}

impl Step<'_> {
    fn actor(&self) -> &Actor {
        &self.request.actor
    }

    fn ticket_id(&self) -> &TicketId {
        &self.request.ticket.id
    }

    fn category(&self, record: &TicketRecord) -> Option<&CategoryDefinition> {
        self.env.categories.by_key(&record.originating_button_id)
    }

    fn staff_roles(&self, record: &TicketRecord) -> Vec<crate::ids::RoleId> {
        self.category(record)
            .map(|c| c.staff_role_ids.clone())
            .unwrap_or_default()
    }

    fn require_staff(&self, record: &TicketRecord) -> Result<(), RejectReason> {
        if self.env.policy.is_staff(self.actor(), self.category(record)) {
            Ok(())
        } else {
            Err(RejectReason::NotAuthorized {
                required: Authority::Staff,
            })
        }
    }

    /// Notice pre-filled with the actor and the ticket.
    fn notice(&self, template: TemplateName, record: &TicketRecord) -> Notice {
        let ticket = &self.request.ticket;
        let notice = Notice::new(template)
            .with_user("user", &self.actor().profile)
            .with("ticketName", markup::sanitize(&ticket.name))
            .with("channel", markup::context_mention(&ticket.id))
            .with("ticketType", record.ticket_type.clone());
        match &ticket.owner {
            Some(owner) => notice.with_user("owner", owner),
            None => notice.with("owner", markup::user_mention(&record.owner_id)),
        }
    }

    fn is_owner(&self, record: &TicketRecord) -> bool {
        *self.actor().id() == record.owner_id
    }

    fn open(
        &self,
        state: &mut Option<TicketRecord>,
        key: &CategoryKey,
        intake_msg: &MessageId,
        open_count: usize,
    ) -> Outcome {
        if let Some(existing) = state {
            return Err(RejectReason::AlreadyInState(if existing.is_open() {
                TicketCondition::Open
            } else {
                TicketCondition::Closed
            }));
        }
        let category =
            self.env
                .categories
                .by_key(key)
                .ok_or_else(|| RejectReason::InvalidCategory {
                    available: self.env.categories.names(),
                })?;
        if !category.creator_role_ids.is_empty()
            && !self.actor().has_any_role(&category.creator_role_ids)
        {
            return Err(RejectReason::NotAuthorized {
                required: Authority::CategoryCreator,
            });
        }
        let max = self.env.policy.max_open_tickets;
        if open_count >= max {
            return Err(RejectReason::QuotaExceeded { max });
        }

        let record = TicketRecord::open(
            self.actor().id().clone(),
            category.name.clone(),
            category.key.clone(),
            intake_msg.clone(),
            self.env.now(),
        );
        let audit = self.notice(TemplateName::LogOpened, &record);
        *state = Some(record);

        Ok(smallvec![
            Effect::Ledger(Ledger::IndexAdd(self.ticket_id().clone())),
            Effect::Ledger(Ledger::Increment(Counter::TotalTickets)),
            Effect::Audit {
                notice: audit,
                attach_transcript: false,
            },
        ])
    }

    fn claim(&self, record: &mut TicketRecord) -> Outcome {
        if !self.env.policy.claim_enabled {
            return Err(RejectReason::FeatureDisabled);
        }
        self.require_staff(record)?;
        if record.status == TicketStatus::Closed {
            return Err(RejectReason::AlreadyInState(TicketCondition::Closed));
        }
        if let Some(by) = &record.claimant {
            return Err(RejectReason::AlreadyInState(TicketCondition::Claimed(
                by.clone(),
            )));
        }

        record.claimant = Some(self.actor().id().clone());

        let mut effects: Effects<LifecycleRequest> = smallvec![
            Effect::Ledger(Ledger::Increment(Counter::TotalClaims)),
            Effect::Access(AccessEdit::Set(
                Principal::User(self.actor().id().clone()),
                AccessLevel::Full,
            )),
        ];
        if self.env.policy.exclusive_claim {
            effects.extend(self.staff_roles(record).into_iter().map(|role| {
                Effect::Access(AccessEdit::Set(Principal::Role(role), AccessLevel::ReadOnly))
            }));
        }
        effects.push(Effect::RefreshIntake {
            message_id: record.msg_id.clone(),
            claimant: Some(self.actor().profile.clone()),
        });
        effects.push(Effect::Announce(self.notice(TemplateName::Claimed, record)));
        effects.push(Effect::Audit {
            notice: self.notice(TemplateName::LogClaimed, record),
            attach_transcript: false,
        });
        Ok(effects)
    }

    fn unclaim(&self, record: &mut TicketRecord) -> Outcome {
        if !self.env.policy.claim_enabled {
            return Err(RejectReason::FeatureDisabled);
        }
        let Some(claimant) = record.claimant.clone() else {
            return Err(RejectReason::AlreadyInState(TicketCondition::Unclaimed));
        };
        if claimant != *self.actor().id() {
            return Err(RejectReason::NotAuthorized {
                required: Authority::Claimant(claimant),
            });
        }
        if record.status == TicketStatus::Closed {
            return Err(RejectReason::AlreadyInState(TicketCondition::Closed));
        }

        record.claimant = None;

        let mut effects: Effects<LifecycleRequest> =
            smallvec![Effect::Ledger(Ledger::Decrement(Counter::TotalClaims))];
        if claimant != record.owner_id {
            effects.push(Effect::Access(AccessEdit::Remove(Principal::User(claimant))));
        }
        if self.env.policy.exclusive_claim {
            effects.extend(self.staff_roles(record).into_iter().map(|role| {
                Effect::Access(AccessEdit::Set(Principal::Role(role), AccessLevel::Full))
            }));
        }
        effects.push(Effect::RefreshIntake {
            message_id: record.msg_id.clone(),
            claimant: None,
        });
        effects.push(Effect::Announce(self.notice(TemplateName::Unclaimed, record)));
        effects.push(Effect::Audit {
            notice: self.notice(TemplateName::LogUnclaimed, record),
            attach_transcript: false,
        });
        Ok(effects)
    }

    fn close(&self, record: &mut TicketRecord) -> Outcome {
        if self.env.policy.close_staff_only {
            self.require_staff(record)?;
        }
        if record.status == TicketStatus::Closed {
            return Err(RejectReason::AlreadyInState(TicketCondition::Closed));
        }

        record.status = TicketStatus::Closed;
        record.close_user_id = Some(self.actor().id().clone());
        record.closed_at = Some(self.env.now());

        let mut effects: Effects<LifecycleRequest> = smallvec![
            Effect::Ledger(Ledger::IndexRemove(self.ticket_id().clone())),
            Effect::Access(AccessEdit::FreezeMembers),
        ];
        if self.env.policy.close_removes_owner {
            effects.push(Effect::Access(AccessEdit::Remove(Principal::User(
                record.owner_id.clone(),
            ))));
        }
        effects.extend(self.staff_roles(record).into_iter().map(|role| {
            Effect::Access(AccessEdit::Set(Principal::Role(role), AccessLevel::ReadOnly))
        }));
        if let Some(closed_location) = self
            .category(record)
            .and_then(|c| c.closed_location_id.clone())
        {
            effects.push(Effect::Relocate(closed_location));
        }

        let request = self.request.clone();
        effects.push(Effect::PostCloseNotice {
            notice: self.notice(TemplateName::Closed, record),
            on_posted: Box::new(move |message_id| {
                request.follow_up(LifecycleAction::AttachCloseNotice { message_id })
            }),
        });
        effects.push(Effect::Audit {
            notice: self.notice(TemplateName::LogClosed, record),
            attach_transcript: false,
        });
        if self.env.policy.notify_on_close && !self.is_owner(record) {
            effects.push(Effect::Notify {
                recipient: record.owner_id.clone(),
                notice: self.notice(TemplateName::CloseDm, record),
                attach_transcript: false,
                rating_prompt: None,
            });
        }
        Ok(effects)
    }

    fn reopen(&self, record: &mut TicketRecord) -> Outcome {
        if self.env.policy.reopen_staff_only {
            self.require_staff(record)?;
        }
        if record.status == TicketStatus::Open {
            return Err(RejectReason::AlreadyInState(TicketCondition::Open));
        }

        record.status = TicketStatus::Open;
        record.closed_at = None;
        let stale_notice = record.close_msg_id.take();

        let mut effects: Effects<LifecycleRequest> =
            smallvec![Effect::Ledger(Ledger::IndexAdd(self.ticket_id().clone()))];
        if let Some(category) = self.category(record) {
            if category.closed_location_id.is_some() {
                effects.push(Effect::Relocate(category.location_id.clone()));
            }
        }
        let role_level = if self.env.policy.exclusive_claim && record.is_claimed() {
            AccessLevel::ReadOnly
        } else {
            AccessLevel::Full
        };
        effects.extend(
            self.staff_roles(record)
                .into_iter()
                .map(|role| Effect::Access(AccessEdit::Set(Principal::Role(role), role_level))),
        );
        effects.push(Effect::Access(AccessEdit::Set(
            Principal::User(record.owner_id.clone()),
            AccessLevel::Full,
        )));
        if let Some(claimant) = record.claimant.clone() {
            if claimant != record.owner_id {
                effects.push(Effect::Access(AccessEdit::Set(
                    Principal::User(claimant),
                    AccessLevel::Full,
                )));
            }
        }
        if let Some(message_id) = stale_notice {
            effects.push(Effect::DeleteMessage(message_id));
        }
        effects.push(Effect::Announce(self.notice(TemplateName::Reopened, record)));
        effects.push(Effect::Audit {
            notice: self.notice(TemplateName::LogReopened, record),
            attach_transcript: false,
        });
        if self.env.policy.notify_on_reopen && !self.is_owner(record) {
            effects.push(Effect::Notify {
                recipient: record.owner_id.clone(),
                notice: self.notice(TemplateName::ReopenDm, record),
                attach_transcript: false,
                rating_prompt: None,
            });
        }
        Ok(effects)
    }

    fn delete(&self, record: &mut TicketRecord) -> Outcome {
        self.require_staff(record)?;

        record.pending_deletion = true;
        let close_notice = record.close_msg_id.take();
        let delay = self.env.policy.delete_delay;

        let mut effects: Effects<LifecycleRequest> = smallvec![];
        if let Some(message_id) = close_notice {
            effects.push(Effect::DeleteMessage(message_id));
        }
        effects.push(Effect::CaptureTranscript);
        let claimant = record.claimant.as_ref().map(markup::user_mention);
        let mut audit = self.notice(TemplateName::LogDeleted, record);
        if let Some(claimant) = &claimant {
            audit = audit.with("claimant", claimant.clone());
        }
        effects.push(Effect::Audit {
            notice: audit,
            attach_transcript: true,
        });
        if self.env.policy.notify_on_delete {
            let rating_prompt = self
                .env
                .policy
                .rating_prompt
                .then(|| self.notice(TemplateName::RatingPrompt, record));
            effects.push(Effect::Notify {
                recipient: record.owner_id.clone(),
                notice: self
                    .notice(TemplateName::DeleteDm, record)
                    .with("claimant", claimant.unwrap_or_else(|| "None".to_owned())),
                attach_transcript: true,
                rating_prompt,
            });
        }
        effects.push(Effect::Announce(
            self.notice(TemplateName::Deleting, record)
                .with("time", delay.as_secs().to_string()),
        ));
        effects.push(Effect::Delay {
            duration: delay,
            action: Box::new(self.request.follow_up(LifecycleAction::Purge)),
        });
        Ok(effects)
    }

    fn purge(&self, state: &mut Option<TicketRecord>) -> Outcome {
        if state.take().is_none() {
            return Err(RejectReason::NotATicket);
        }
        Ok(smallvec![
            Effect::Ledger(Ledger::IndexRemove(self.ticket_id().clone())),
            Effect::RemoveContext,
        ])
    }

    fn relocate(&self, record: &mut TicketRecord, category_name: &str) -> Outcome {
        self.require_staff(record)?;
        if record.status == TicketStatus::Closed {
            return Err(RejectReason::AlreadyInState(TicketCondition::Closed));
        }
        let target = self.env.categories.by_name(category_name).ok_or_else(|| {
            RejectReason::InvalidCategory {
                available: self.env.categories.names(),
            }
        })?;
        if target.matches_name(&record.ticket_type) {
            return Err(RejectReason::AlreadyInState(TicketCondition::InCategory(
                target.name.clone(),
            )));
        }

        let previous = std::mem::replace(&mut record.ticket_type, target.name.clone());

        Ok(smallvec![
            Effect::Relocate(target.location_id.clone()),
            Effect::Announce(
                self.notice(TemplateName::Moved, record)
                    .with("category", target.name.clone())
            ),
            Effect::Audit {
                notice: self
                    .notice(TemplateName::LogMoved, record)
                    .with("previousCategory", previous)
                    .with("category", target.name.clone()),
                attach_transcript: false,
            },
        ])
    }

    fn rename(&self, record: &TicketRecord, name: &str) -> Outcome {
        self.require_staff(record)?;
        if name == self.request.ticket.name {
            return Err(RejectReason::SelfNoop);
        }

        Ok(smallvec![
            Effect::Rename(name.to_owned()),
            Effect::Announce(
                self.notice(TemplateName::Renamed, record)
                    .with("name", markup::sanitize(name))
            ),
            Effect::Audit {
                notice: self
                    .notice(TemplateName::LogRenamed, record)
                    .with("oldName", markup::sanitize(&self.request.ticket.name))
                    .with("newName", markup::sanitize(name)),
                attach_transcript: false,
            },
        ])
    }

    fn transfer(&self, record: &mut TicketRecord, new_owner: &UserProfile) -> Outcome {
        self.require_staff(record)?;
        if new_owner.id == record.owner_id {
            return Err(RejectReason::SelfNoop);
        }

        let previous = std::mem::replace(&mut record.owner_id, new_owner.id.clone());

        let mut effects: Effects<LifecycleRequest> = smallvec![
            Effect::Access(AccessEdit::Remove(Principal::User(previous.clone()))),
            Effect::Access(AccessEdit::Set(
                Principal::User(new_owner.id.clone()),
                AccessLevel::Full,
            )),
            Effect::SetTopic(format!(
                "Ticket Creator: {} | Ticket Type: {}",
                markup::sanitize(&new_owner.tag),
                record.ticket_type
            )),
        ];
        let embeds_old_name = self
            .request
            .ticket
            .owner
            .as_ref()
            .is_some_and(|old| !old.username.is_empty() && self.request.ticket.name.contains(&old.username));
        if embeds_old_name {
            effects.push(Effect::Rename(format!(
                "{}-{}",
                record.ticket_type, new_owner.username
            )));
        }

        let audit = self
            .notice(TemplateName::LogTransferred, record)
            .with_user("newOwner", new_owner);
        let audit = match &self.request.ticket.owner {
            Some(old) => audit.with_user("previousOwner", old),
            None => audit.with("previousOwner", markup::user_mention(&previous)),
        };
        effects.push(Effect::Announce(
            Notice::new(TemplateName::Transferred).with_user("user", new_owner),
        ));
        effects.push(Effect::Audit {
            notice: audit,
            attach_transcript: false,
        });
        Ok(effects)
    }

    fn remove_participant(&self, record: &TicketRecord, target: &Principal, label: &str) -> Outcome {
        self.require_staff(record)?;
        if !self.request.ticket.participants.contains(target) {
            return Err(RejectReason::TargetNotPresent);
        }

        let mention = match target {
            Principal::User(id) => markup::user_mention(id),
            Principal::Role(id) => markup::role_mention(id),
            Principal::Everyone => "@everyone".to_owned(),
        };
        let label = markup::sanitize(label);
        Ok(smallvec![
            Effect::Access(AccessEdit::Remove(target.clone())),
            Effect::Announce(
                self.notice(TemplateName::Removed, record)
                    .with("target", mention.clone())
                    .with("target.tag", label.clone())
            ),
            Effect::Audit {
                notice: self
                    .notice(TemplateName::LogRemoved, record)
                    .with("target", mention)
                    .with("target.tag", label),
                attach_transcript: false,
            },
        ])
    }

    fn attach_close_notice(
        &self,
        state: &mut Option<TicketRecord>,
        message_id: &MessageId,
    ) -> Outcome {
        let record = state.as_mut().ok_or(RejectReason::NotATicket)?;
        if record.status == TicketStatus::Closed && !record.pending_deletion {
            record.close_msg_id = Some(message_id.clone());
            Ok(smallvec![])
        } else {
            // Reopened or deleted before the notice landed.
            Ok(smallvec![Effect::DeleteMessage(message_id.clone())])
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)] // Test code can panic
mod tests {
    use super::*;
    use crate::category::{CategoryRegistry, NamingStrategy};
    use crate::environment::{Clock, LifecyclePolicy};
    use crate::ids::{LocationId, RoleId, UserId};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    struct Frozen;

    impl Clock for Frozen {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
        }
    }

    fn env(policy: LifecyclePolicy) -> LifecycleEnvironment {
        let support = CategoryDefinition {
            key: CategoryKey::new("support"),
            name: "support".into(),
            location_id: LocationId::new("open-loc"),
            closed_location_id: Some(LocationId::new("closed-loc")),
            staff_role_ids: vec![RoleId::new("support-staff")],
            ping_role_ids: vec![],
            creator_role_ids: vec![],
            form_title: None,
            embed_title: None,
            description: None,
            color: None,
            naming: NamingStrategy::Username,
            questions: vec![],
        };
        let mut billing = support.clone();
        billing.key = CategoryKey::new("billing");
        billing.name = "Billing".into();
        billing.location_id = LocationId::new("billing-loc");
        billing.creator_role_ids = vec![RoleId::new("customer")];
        let registry = CategoryRegistry::new(vec![support, billing]).unwrap();
        LifecycleEnvironment::new(Arc::new(Frozen), policy, Arc::new(registry))
    }

    fn owner() -> Actor {
        Actor::new(UserProfile::new("owner", "owner#1", "owner"), vec![])
    }

    fn staff(id: &str) -> Actor {
        Actor::new(
            UserProfile::new(id, format!("{id}#2"), id),
            vec![RoleId::new("support-staff")],
        )
    }

    fn context() -> TicketContext {
        TicketContext::new("t-1", "support-owner")
            .with_owner(owner().profile)
            .with_participants(vec![Principal::User(UserId::new("owner"))])
    }

    fn open_record() -> Option<TicketRecord> {
        Some(TicketRecord::open(
            UserId::new("owner"),
            "support".into(),
            CategoryKey::new("support"),
            MessageId::new("intake"),
            Frozen.now(),
        ))
    }

    fn run(
        state: &mut Option<TicketRecord>,
        actor: Actor,
        action: LifecycleAction,
        env: &LifecycleEnvironment,
    ) -> Outcome {
        LifecycleEngine.reduce(state, LifecycleRequest::new(context(), actor, action), env)
    }

    #[test]
    fn open_creates_an_unclaimed_record_and_bumps_the_ledger() {
        let env = env(LifecyclePolicy::default());
        let mut state = None;
        let effects = run(
            &mut state,
            owner(),
            LifecycleAction::Open {
                category: CategoryKey::new("support"),
                intake_msg: MessageId::new("m1"),
                open_count: 0,
            },
            &env,
        )
        .unwrap();

        let record = state.unwrap();
        assert_eq!(record.status, TicketStatus::Open);
        assert!(!record.is_claimed());
        assert_eq!(record.ticket_type, "support");
        let ledger: Vec<_> = effects.iter().filter_map(Effect::ledger).cloned().collect();
        assert_eq!(
            ledger,
            vec![
                Ledger::IndexAdd(TicketId::new("t-1")),
                Ledger::Increment(Counter::TotalTickets)
            ]
        );
    }

    #[test]
    fn open_enforces_quota_and_creator_roles() {
        let env = env(LifecyclePolicy {
            max_open_tickets: 2,
            ..LifecyclePolicy::default()
        });
        let mut state = None;
        let quota = run(
            &mut state,
            owner(),
            LifecycleAction::Open {
                category: CategoryKey::new("support"),
                intake_msg: MessageId::new("m1"),
                open_count: 2,
            },
            &env,
        );
        assert_eq!(quota.err(), Some(RejectReason::QuotaExceeded { max: 2 }));

        let restricted = run(
            &mut state,
            owner(),
            LifecycleAction::Open {
                category: CategoryKey::new("billing"),
                intake_msg: MessageId::new("m1"),
                open_count: 0,
            },
            &env,
        );
        assert_eq!(
            restricted.err(),
            Some(RejectReason::NotAuthorized {
                required: Authority::CategoryCreator
            })
        );
        assert!(state.is_none());
    }

    #[test]
    fn second_claim_is_rejected() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        run(&mut state, staff("s1"), LifecycleAction::Claim, &env).unwrap();
        let second = run(&mut state, staff("s2"), LifecycleAction::Claim, &env);
        assert_eq!(
            second.err(),
            Some(RejectReason::AlreadyInState(TicketCondition::Claimed(
                UserId::new("s1")
            )))
        );
        assert!(state.unwrap().is_claimed_by(&UserId::new("s1")));
    }

    #[test]
    fn claim_requires_staff() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        let before = state.clone();
        let result = run(&mut state, owner(), LifecycleAction::Claim, &env);
        assert_eq!(
            result.err(),
            Some(RejectReason::NotAuthorized {
                required: Authority::Staff
            })
        );
        assert_eq!(state, before);
    }

    #[test]
    fn exclusive_claim_makes_staff_roles_read_only() {
        let env = env(LifecyclePolicy {
            exclusive_claim: true,
            ..LifecyclePolicy::default()
        });
        let mut state = open_record();
        let effects = run(&mut state, staff("s1"), LifecycleAction::Claim, &env).unwrap();
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Access(AccessEdit::Set(Principal::Role(role), AccessLevel::ReadOnly))
                if role.as_str() == "support-staff"
        )));
    }

    #[test]
    fn unclaim_only_by_claimant() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        assert_eq!(
            run(&mut state, staff("s1"), LifecycleAction::Unclaim, &env).err(),
            Some(RejectReason::AlreadyInState(TicketCondition::Unclaimed))
        );
        run(&mut state, staff("s1"), LifecycleAction::Claim, &env).unwrap();
        assert_eq!(
            run(&mut state, staff("s2"), LifecycleAction::Unclaim, &env).err(),
            Some(RejectReason::NotAuthorized {
                required: Authority::Claimant(UserId::new("s1"))
            })
        );
        let effects = run(&mut state, staff("s1"), LifecycleAction::Unclaim, &env).unwrap();
        assert!(matches!(
            effects.first(),
            Some(Effect::Ledger(Ledger::Decrement(Counter::TotalClaims)))
        ));
        assert!(!state.unwrap().is_claimed());
    }

    #[test]
    fn claim_disabled_by_policy() {
        let env = env(LifecyclePolicy {
            claim_enabled: false,
            ..LifecyclePolicy::default()
        });
        let mut state = open_record();
        assert_eq!(
            run(&mut state, staff("s1"), LifecycleAction::Claim, &env).err(),
            Some(RejectReason::FeatureDisabled)
        );
    }

    #[test]
    fn close_twice_yields_already_in_state() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        let effects = run(&mut state, staff("s1"), LifecycleAction::Close, &env).unwrap();
        assert!(effects.iter().any(|e| matches!(e, Effect::Relocate(loc) if loc.as_str() == "closed-loc")));
        assert!(effects.iter().any(|e| matches!(e, Effect::Notify { .. })));
        assert_eq!(
            run(&mut state, staff("s1"), LifecycleAction::Close, &env).err(),
            Some(RejectReason::AlreadyInState(TicketCondition::Closed))
        );
    }

    #[test]
    fn owner_closing_gets_no_dm() {
        let env = env(LifecyclePolicy {
            close_staff_only: false,
            ..LifecyclePolicy::default()
        });
        let mut state = open_record();
        let effects = run(&mut state, owner(), LifecycleAction::Close, &env).unwrap();
        assert!(!effects.iter().any(|e| matches!(e, Effect::Notify { .. })));
    }

    #[test]
    fn close_then_reopen_keeps_close_user_and_drops_notice() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        let effects = run(&mut state, staff("s1"), LifecycleAction::Close, &env).unwrap();

        let Some(Effect::PostCloseNotice { on_posted, .. }) = effects
            .into_iter()
            .find(|e| matches!(e, Effect::PostCloseNotice { .. }))
        else {
            panic!("close must post a notice");
        };
        let follow_up = on_posted(MessageId::new("notice"));
        LifecycleEngine.reduce(&mut state, follow_up, &env).unwrap();
        assert_eq!(
            state.as_ref().unwrap().close_msg_id,
            Some(MessageId::new("notice"))
        );

        let effects = run(&mut state, staff("s2"), LifecycleAction::Reopen, &env).unwrap();
        let record = state.unwrap();
        assert_eq!(record.status, TicketStatus::Open);
        assert_eq!(record.close_msg_id, None);
        assert_eq!(record.close_user_id, Some(UserId::new("s1")));
        assert!(effects.iter().any(|e| matches!(e, Effect::DeleteMessage(id) if id.as_str() == "notice")));
        assert!(effects.iter().any(|e| matches!(e, Effect::Ledger(Ledger::IndexAdd(_)))));
    }

    #[test]
    fn late_close_notice_on_reopened_ticket_is_deleted() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        let effects = run(
            &mut state,
            staff("s1"),
            LifecycleAction::AttachCloseNotice {
                message_id: MessageId::new("late"),
            },
            &env,
        )
        .unwrap();
        assert!(matches!(effects.as_slice(), [Effect::DeleteMessage(_)]));
        assert_eq!(state.unwrap().close_msg_id, None);
    }

    #[test]
    fn delete_schedules_purge_and_blocks_further_transitions() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        let effects = run(&mut state, staff("s1"), LifecycleAction::Delete, &env).unwrap();
        let transcript_at = effects
            .iter()
            .position(|e| matches!(e, Effect::CaptureTranscript))
            .unwrap();
        let delay_at = effects
            .iter()
            .position(|e| matches!(e, Effect::Delay { .. }))
            .unwrap();
        assert!(transcript_at < delay_at);
        assert!(state.as_ref().unwrap().pending_deletion);

        assert_eq!(
            run(&mut state, staff("s1"), LifecycleAction::Delete, &env).err(),
            Some(RejectReason::AlreadyInState(TicketCondition::PendingDeletion))
        );

        let purge = run(&mut state, staff("s1"), LifecycleAction::Purge, &env).unwrap();
        assert!(state.is_none());
        assert!(purge.iter().any(|e| matches!(e, Effect::RemoveContext)));
    }

    #[test]
    fn delete_notices_name_the_claimant() {
        let env = env(LifecyclePolicy::default());
        let deleted = |state: &mut Option<TicketRecord>| {
            let effects = run(state, staff("s1"), LifecycleAction::Delete, &env).unwrap();
            let mut audit = None;
            let mut direct = None;
            for effect in effects {
                match effect {
                    Effect::Audit { notice, .. } if notice.template == TemplateName::LogDeleted => {
                        audit = Some(notice);
                    }
                    Effect::Notify { notice, .. } => direct = Some(notice),
                    _ => {}
                }
            }
            (audit.unwrap(), direct.unwrap())
        };

        let mut unclaimed = open_record();
        let (audit, direct) = deleted(&mut unclaimed);
        assert_eq!(audit.substitutions.get("claimant"), None);
        assert_eq!(direct.substitutions.get("claimant"), Some("None"));

        let mut claimed = open_record();
        run(&mut claimed, staff("s2"), LifecycleAction::Claim, &env).unwrap();
        let (audit, direct) = deleted(&mut claimed);
        assert_eq!(audit.substitutions.get("claimant"), Some("<@s2>"));
        assert_eq!(direct.substitutions.get("claimant"), Some("<@s2>"));
    }

    #[test]
    fn move_is_case_insensitive_and_rejects_same_category() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        assert_eq!(
            run(
                &mut state,
                staff("s1"),
                LifecycleAction::Move {
                    category_name: "SUPPORT".into()
                },
                &env
            )
            .err(),
            Some(RejectReason::AlreadyInState(TicketCondition::InCategory(
                "support".into()
            )))
        );
        assert!(matches!(
            run(
                &mut state,
                staff("s1"),
                LifecycleAction::Move {
                    category_name: "sales".into()
                },
                &env
            ),
            Err(RejectReason::InvalidCategory { .. })
        ));
        run(
            &mut state,
            staff("s1"),
            LifecycleAction::Move {
                category_name: "billing".into(),
            },
            &env,
        )
        .unwrap();
        let record = state.unwrap();
        assert_eq!(record.ticket_type, "Billing");
        assert_eq!(record.originating_button_id, CategoryKey::new("support"));
    }

    #[test]
    fn transfer_renames_only_when_name_embeds_old_owner() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        let new_owner = UserProfile::new("u2", "carol#3", "carol");
        let effects = run(
            &mut state,
            staff("s1"),
            LifecycleAction::Transfer {
                new_owner: new_owner.clone(),
            },
            &env,
        )
        .unwrap();
        assert_eq!(state.as_ref().unwrap().owner_id, UserId::new("u2"));
        assert!(effects.iter().any(|e| matches!(e, Effect::Rename(n) if n == "support-carol")));
        assert_eq!(
            run(
                &mut state,
                staff("s1"),
                LifecycleAction::Transfer { new_owner },
                &env
            )
            .err(),
            Some(RejectReason::SelfNoop)
        );
    }

    #[test]
    fn remove_requires_present_target() {
        let env = env(LifecyclePolicy::default());
        let mut state = open_record();
        assert_eq!(
            run(
                &mut state,
                staff("s1"),
                LifecycleAction::RemoveParticipant {
                    target: Principal::Role(RoleId::new("ghost")),
                    label: "ghost".into()
                },
                &env
            )
            .err(),
            Some(RejectReason::TargetNotPresent)
        );
        let effects = run(
            &mut state,
            staff("s1"),
            LifecycleAction::RemoveParticipant {
                target: Principal::User(UserId::new("owner")),
                label: "owner#1".into(),
            },
            &env,
        )
        .unwrap();
        assert!(matches!(
            effects.first(),
            Some(Effect::Access(AccessEdit::Remove(Principal::User(_))))
        ));
    }

    #[test]
    fn missing_record_is_not_a_ticket() {
        let env = env(LifecyclePolicy::default());
        let mut state = None;
        assert_eq!(
            run(&mut state, staff("s1"), LifecycleAction::Close, &env).err(),
            Some(RejectReason::NotATicket)
        );
    }
}
