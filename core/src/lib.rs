//! # Ticketdesk Core
//!
//! Data model and pure transition logic for the Ticketdesk support-ticket workflow.
//!
//! Nothing in this crate performs I/O. The lifecycle engine is a [`reducer::Reducer`]: given
//! the current ticket record, a request and the injected environment, it either refuses with a
//! named [`rejection::RejectReason`] or updates the record in place and returns the
//! [`effect::Effect`] descriptions the runtime must carry out.
//!
//! ## Core Concepts
//!
//! - **State**: `Option<TicketRecord>`, where `None` means "no ticket in this context"
//! - **Action**: a [`lifecycle::LifecycleRequest`] (who asked, where, and what)
//! - **Reducer**: pure function `(State, Action, Environment) → Result<Effects, RejectReason>`
//! - **Effect**: side effect descriptions (ledger writes, access edits, notices, DMs)
//! - **Environment**: clock, lifecycle policy and the category registry
//!
//! ## Example
//!
//! ```ignore
//! use ticketdesk_core::prelude::*;
//!
//! let mut state = Some(record);
//! let request = LifecycleRequest::new(context, staff_actor, LifecycleAction::Claim);
//! match LifecycleEngine.reduce(&mut state, request, &env) {
//!     Ok(effects) => runtime.commit(state, effects).await?,
//!     Err(reason) => reply_with(reason),
//! }
//! ```

pub mod catalog;
pub mod category;
pub mod effect;
pub mod ids;
pub mod lifecycle;
pub mod markup;
pub mod record;
pub mod rejection;
pub mod template;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Effects returned by one reduction.
pub type Effects<A> = SmallVec<[effect::Effect<A>; 4]>;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Result<Effects, Rejection>`.
/// A rejected action leaves the state exactly as it was.
pub mod reducer {
    use super::Effects;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Rejection`: Why an action may be refused
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Named refusal returned instead of effects
        type Rejection;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place (only once every guard has passed)
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Errors
        ///
        /// Returns `Self::Rejection` when a guard fails. The state is untouched in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<Effects<Self::Action>, Self::Rejection>;
    }
}

/// Environment module - Dependency injection for the lifecycle engine
pub mod environment {
    use crate::category::{CategoryDefinition, CategoryRegistry};
    use crate::ids::{Actor, RoleId};
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock reading the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Switches and limits that shape the lifecycle transitions.
    #[derive(Debug, Clone)]
    pub struct LifecyclePolicy {
        /// Workspace-wide staff groups (category staff groups are added per ticket).
        pub staff_role_ids: Vec<RoleId>,
        /// Open tickets a single user may hold.
        pub max_open_tickets: usize,
        /// Whether claiming is available at all.
        pub claim_enabled: bool,
        /// Claiming makes the category's staff groups read-only.
        pub exclusive_claim: bool,
        /// Only staff may close.
        pub close_staff_only: bool,
        /// Only staff may reopen.
        pub reopen_staff_only: bool,
        /// Closing removes the owner's access entry.
        pub close_removes_owner: bool,
        /// DM the owner when someone else closes.
        pub notify_on_close: bool,
        /// DM the owner when someone else reopens.
        pub notify_on_reopen: bool,
        /// DM the owner the transcript on delete.
        pub notify_on_delete: bool,
        /// Attach the star-rating prompt to the delete DM.
        pub rating_prompt: bool,
        /// Wait between the delete notice and the purge.
        pub delete_delay: Duration,
    }

    impl Default for LifecyclePolicy {
        fn default() -> Self {
            Self {
                staff_role_ids: Vec::new(),
                max_open_tickets: 3,
                claim_enabled: true,
                exclusive_claim: false,
                close_staff_only: true,
                reopen_staff_only: false,
                close_removes_owner: false,
                notify_on_close: true,
                notify_on_reopen: true,
                notify_on_delete: true,
                rating_prompt: true,
                delete_delay: Duration::from_secs(5),
            }
        }
    }

    impl LifecyclePolicy {
        /// Whether `actor` holds a workspace staff group or a staff group of `category`.
        #[must_use]
        pub fn is_staff(&self, actor: &Actor, category: Option<&CategoryDefinition>) -> bool {
            actor.has_any_role(&self.staff_role_ids)
                || category.is_some_and(|c| actor.has_any_role(&c.staff_role_ids))
        }
    }

    /// Everything the lifecycle engine needs besides the record and the request.
    #[derive(Clone)]
    pub struct LifecycleEnvironment {
        /// Time source.
        pub clock: Arc<dyn Clock>,
        /// Policy switches.
        pub policy: LifecyclePolicy,
        /// Category definitions.
        pub categories: Arc<CategoryRegistry>,
    }

    impl LifecycleEnvironment {
        /// Bundle the dependencies.
        #[must_use]
        pub fn new(
            clock: Arc<dyn Clock>,
            policy: LifecyclePolicy,
            categories: Arc<CategoryRegistry>,
        ) -> Self {
            Self {
                clock,
                policy,
                categories,
            }
        }

        /// Current time from the injected clock.
        #[must_use]
        pub fn now(&self) -> DateTime<Utc> {
            self.clock.now()
        }
    }

    impl std::fmt::Debug for LifecycleEnvironment {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LifecycleEnvironment")
                .field("policy", &self.policy)
                .field("categories", &self.categories.len())
                .finish_non_exhaustive()
        }
    }
}

/// Convenient glob import for downstream crates.
pub mod prelude {
    pub use crate::catalog::{ActionId, CommandName, Stars};
    pub use crate::category::{CategoryDefinition, CategoryRegistry, NamingStrategy, Question};
    pub use crate::effect::{AccessEdit, AccessLevel, Effect, Ledger};
    pub use crate::environment::{Clock, LifecycleEnvironment, LifecyclePolicy, SystemClock};
    pub use crate::ids::{
        Actor, CategoryKey, LocationId, MessageId, Principal, RoleId, TicketId, UserId,
        UserProfile,
    };
    pub use crate::lifecycle::{LifecycleAction, LifecycleEngine, LifecycleRequest, TicketContext};
    pub use crate::record::{Counter, ListName, TicketRecord, TicketStatus};
    pub use crate::reducer::Reducer;
    pub use crate::rejection::{Authority, RejectReason, TicketCondition};
    pub use crate::template::{FormattedMessage, Notice, Substitutions, TemplateName};
    pub use crate::Effects;
}
