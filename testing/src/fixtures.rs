//! Categories, actors and a fully wired runtime over the recording doubles.

use std::sync::Arc;
use std::time::Duration;
use ticketdesk_core::category::{CategoryDefinition, CategoryRegistry, NamingStrategy};
use ticketdesk_core::effect::AccessLevel;
use ticketdesk_core::environment::{Clock, LifecycleEnvironment, LifecyclePolicy};
use ticketdesk_core::ids::{
    Actor, CategoryKey, LocationId, Principal, RoleId, TicketId, UserProfile,
};
use ticketdesk_core::lifecycle::{LifecycleAction, LifecycleRequest, TicketContext};
use ticketdesk_runtime::dispatcher::EffectDispatcher;
use ticketdesk_runtime::ports::{AccessEntry, OutgoingMessage};
use ticketdesk_runtime::retry::RetryPolicy;
use ticketdesk_runtime::{Applied, RuntimeError, TicketRuntime};

use crate::mocks::test_clock;
use crate::ports::{PlainTemplates, RecordingAuditLog, RecordingPlatform, StubTranscripts};
use crate::store::FlakyStore;

/// Staff group shared by every fixture category.
pub const STAFF_ROLE: &str = "staff";

/// Location open tickets live under.
pub const OPEN_LOCATION: &str = "open-tickets";

/// Location closed tickets are moved to.
pub const CLOSED_LOCATION: &str = "closed-tickets";

/// `support` (open to all) and `Billing` (customers only, no closed location).
///
/// # Panics
///
/// Never; the fixture categories are valid.
#[must_use]
#[allow(clippy::expect_used)] // Fixture data is known-good
pub fn categories() -> CategoryRegistry {
    let support = CategoryDefinition {
        key: CategoryKey::new("support"),
        name: "support".into(),
        location_id: LocationId::new(OPEN_LOCATION),
        closed_location_id: Some(LocationId::new(CLOSED_LOCATION)),
        staff_role_ids: vec![RoleId::new(STAFF_ROLE)],
        ping_role_ids: vec![],
        creator_role_ids: vec![],
        form_title: None,
        embed_title: None,
        description: None,
        color: None,
        naming: NamingStrategy::Username,
        questions: vec![],
    };
    let billing = CategoryDefinition {
        key: CategoryKey::new("billing"),
        name: "Billing".into(),
        location_id: LocationId::new("billing"),
        closed_location_id: None,
        creator_role_ids: vec![],
        ..support.clone()
    };
    CategoryRegistry::new(vec![support, billing]).expect("fixture categories are valid")
}

/// Default policy with [`STAFF_ROLE`] as the global staff group and a 5 s delete delay.
#[must_use]
pub fn policy() -> LifecyclePolicy {
    LifecyclePolicy {
        staff_role_ids: vec![RoleId::new(STAFF_ROLE)],
        delete_delay: Duration::from_secs(5),
        ..LifecyclePolicy::default()
    }
}

/// Environment over the fixture categories and the frozen test clock.
#[must_use]
pub fn environment(policy: LifecyclePolicy) -> LifecycleEnvironment {
    environment_with_clock(policy, Arc::new(test_clock()))
}

/// Environment over the fixture categories and a caller-provided clock.
#[must_use]
pub fn environment_with_clock(policy: LifecyclePolicy, clock: Arc<dyn Clock>) -> LifecycleEnvironment {
    LifecycleEnvironment::new(clock, policy, Arc::new(categories()))
}

/// A plain member: `alice`.
#[must_use]
pub fn owner() -> Actor {
    member("alice")
}

/// A member without staff groups.
#[must_use]
pub fn member(name: &str) -> Actor {
    Actor::new(UserProfile::new(format!("{name}-id"), name, name), vec![])
}

/// A staff member: `sam`.
#[must_use]
pub fn staff() -> Actor {
    staff_member("sam")
}

/// A member holding [`STAFF_ROLE`].
#[must_use]
pub fn staff_member(name: &str) -> Actor {
    Actor::new(
        UserProfile::new(format!("{name}-id"), name, name),
        vec![RoleId::new(STAFF_ROLE)],
    )
}

/// Bundle a request.
#[must_use]
pub fn request(ticket: &TicketContext, actor: Actor, action: LifecycleAction) -> LifecycleRequest {
    LifecycleRequest::new(ticket.clone(), actor, action)
}

/// A runtime wired to recording doubles.
pub struct RuntimeHarness {
    /// The runtime under test.
    pub runtime: TicketRuntime,
    /// Chat platform double.
    pub platform: Arc<RecordingPlatform>,
    /// Audit log double.
    pub audit: Arc<RecordingAuditLog>,
    /// Transcript double.
    pub transcripts: Arc<StubTranscripts>,
    /// Store with failure injection.
    pub store: Arc<FlakyStore>,
}

impl Default for RuntimeHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeHarness {
    /// Harness with the default fixture policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(policy())
    }

    /// Harness with a custom policy.
    #[must_use]
    pub fn with_policy(policy: LifecyclePolicy) -> Self {
        Self::with_environment(environment(policy))
    }

    /// Harness with a custom environment.
    #[must_use]
    pub fn with_environment(environment: LifecycleEnvironment) -> Self {
        let platform = Arc::new(RecordingPlatform::new());
        let audit = Arc::new(RecordingAuditLog::new());
        let transcripts = Arc::new(StubTranscripts::new());
        let store = Arc::new(FlakyStore::new());
        let dispatcher = EffectDispatcher::new(
            platform.clone(),
            Arc::new(PlainTemplates),
            transcripts.clone(),
            audit.clone(),
        )
        .with_claim_enabled(environment.policy.claim_enabled);
        let commit_policy = RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(1))
            .build();
        let runtime =
            TicketRuntime::with_commit_policy(store.clone(), environment, dispatcher, commit_policy);
        Self {
            runtime,
            platform,
            audit,
            transcripts,
            store,
        }
    }

    /// Allocate a context for `owner`, post an intake message and commit the Open transition.
    ///
    /// # Errors
    ///
    /// Whatever the runtime returns for the Open request.
    pub async fn open_ticket(
        &self,
        id: &str,
        owner: &Actor,
        category: &str,
    ) -> Result<TicketContext, RuntimeError> {
        let ticket_id = TicketId::new(id);
        let name = format!("{category}-{}", owner.profile.username);
        self.platform.add_user(owner.profile.clone());
        self.platform.seed_context(
            &ticket_id,
            &name,
            &LocationId::new(OPEN_LOCATION),
            vec![
                AccessEntry {
                    principal: Principal::Everyone,
                    level: AccessLevel::Hidden,
                },
                AccessEntry {
                    principal: Principal::User(owner.id().clone()),
                    level: AccessLevel::Full,
                },
                AccessEntry {
                    principal: Principal::Role(RoleId::new(STAFF_ROLE)),
                    level: AccessLevel::Full,
                },
            ],
        );
        let intake = self.platform.seed_message(
            &ticket_id,
            OutgoingMessage::default()
                .with_content(format!("<@{}>", owner.id()))
                .with_controls(self.runtime.dispatcher().labels().intake_row(
                    self.runtime.environment().policy.claim_enabled,
                    false,
                )),
        );
        let open_count = self.runtime.open_tickets_of(owner.id()).await?;
        let ticket = TicketContext::new(ticket_id, name)
            .with_owner(owner.profile.clone())
            .with_participants(vec![
                Principal::User(owner.id().clone()),
                Principal::Role(RoleId::new(STAFF_ROLE)),
            ]);
        self.runtime
            .apply(request(
                &ticket,
                owner.clone(),
                LifecycleAction::Open {
                    category: CategoryKey::new(category),
                    intake_msg: intake,
                    open_count,
                },
            ))
            .await?;
        Ok(ticket)
    }

    /// Apply `action` by `actor` to `ticket`.
    ///
    /// # Errors
    ///
    /// Whatever the runtime returns.
    pub async fn act(
        &self,
        ticket: &TicketContext,
        actor: &Actor,
        action: LifecycleAction,
    ) -> Result<Applied, RuntimeError> {
        self.runtime
            .apply(request(ticket, actor.clone(), action))
            .await
    }
}

impl std::fmt::Debug for RuntimeHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHarness")
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}
