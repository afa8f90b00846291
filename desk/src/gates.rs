//! Cross-cutting checks applied before an event reaches the engine.
//!
//! Gates run in a fixed order: blacklist, creation cooldown, working hours, authorization.
//! Each refusal is counted under its [`Gate`] label.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use ticketdesk_core::environment::LifecycleEnvironment;
use ticketdesk_core::ids::Actor;
use ticketdesk_core::markup;
use ticketdesk_core::record::{ListName, TicketRecord};
use ticketdesk_core::template::Substitutions;
use ticketdesk_runtime::metrics::GateMetrics;
use ticketdesk_runtime::store::{StoreError, TicketStore};

/// A router gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Actor or one of their groups is blacklisted.
    Blacklist,
    /// Creation attempted during the creation cooldown.
    Cooldown,
    /// Command repeated during its cooldown.
    CommandCooldown,
    /// Creation attempted outside working hours.
    WorkingHours,
    /// Staff-only action by a non-staff actor, or a ticket action outside a ticket.
    Authorization,
}

impl Gate {
    /// Metric label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Blacklist => "blacklist",
            Self::Cooldown => "cooldown",
            Self::CommandCooldown => "command_cooldown",
            Self::WorkingHours => "working_hours",
            Self::Authorization => "authorization",
        }
    }

    /// Count a refusal.
    pub fn refused(self) {
        tracing::debug!(gate = self.label(), "Gate refused event");
        GateMetrics::record_rejection(self.label());
    }
}

/// Whether the actor's id or any of their groups is on the blacklist.
///
/// # Errors
///
/// Returns the store error if the list cannot be read.
pub async fn is_blacklisted(store: &dyn TicketStore, actor: &Actor) -> Result<bool, StoreError> {
    let blacklist = store.list(ListName::Blacklist).await?;
    Ok(blacklist.iter().any(|entry| {
        entry == actor.id().as_str() || actor.roles.iter().any(|role| entry == role.as_str())
    }))
}

/// Whether `actor` is staff for the ticket behind `record`.
#[must_use]
pub fn is_staff(environment: &LifecycleEnvironment, actor: &Actor, record: &TicketRecord) -> bool {
    environment
        .policy
        .is_staff(actor, environment.categories.by_key(&record.originating_button_id))
}

/// The daily creation window.
///
/// Times are wall-clock times in `timezone`. When `close` is earlier than `open` the window
/// spans midnight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingHours {
    /// Zone the times are in.
    pub timezone: Tz,
    /// Opening time.
    pub open: NaiveTime,
    /// Closing time.
    pub close: NaiveTime,
    /// Refuse creation outside the window.
    pub block_creation: bool,
    /// Show the window on intake messages.
    pub add_field: bool,
    /// Title of the intake field.
    pub field_title: String,
    /// Body of the intake field.
    pub field_value: String,
}

impl WorkingHours {
    /// Whether `now` falls inside the window.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone).time();
        if self.open < self.close {
            local >= self.open && local < self.close
        } else {
            local >= self.open || local < self.close
        }
    }

    /// Whether creation must be refused at `now`.
    #[must_use]
    pub fn blocks(&self, now: DateTime<Utc>) -> bool {
        self.block_creation && !self.is_open_at(now)
    }

    /// The next opening strictly after `now`. `None` only inside a DST gap.
    #[must_use]
    pub fn next_opening(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.timezone).date_naive();
        match self.at(today, self.open) {
            Some(opening) if opening > now => Some(opening),
            _ => self.at(today.succ_opt()?, self.open),
        }
    }

    /// `{openingTime}`, `{closingTime}`, `{now}` and `{nextOpening}` for `now`.
    #[must_use]
    pub fn substitutions(&self, now: DateTime<Utc>) -> Substitutions {
        let today = now.with_timezone(&self.timezone).date_naive();
        let mut substitutions = Substitutions::new().with("now", markup::timestamp(now.timestamp(), 't'));
        if let Some(opening) = self.at(today, self.open) {
            substitutions.insert("openingTime", markup::timestamp(opening.timestamp(), 't'));
        }
        if let Some(closing) = self.at(today, self.close) {
            substitutions.insert("closingTime", markup::timestamp(closing.timestamp(), 't'));
        }
        if let Some(next) = self.next_opening(now) {
            substitutions.insert("nextOpening", markup::timestamp(next.timestamp(), 'R'));
        }
        substitutions
    }

    fn at(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }
}
