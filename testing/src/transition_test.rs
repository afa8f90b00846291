//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // TransitionTest is the natural name

use ticketdesk_core::effect::Effect;
use ticketdesk_core::reducer::Reducer;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Type alias for rejection assertion functions
type RejectionAssertion<J> = Box<dyn FnOnce(&J)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Effects handed to `then_effects` are flattened: nested sequences are unrolled and
/// `Effect::None` is dropped.
///
/// # Example
///
/// ```ignore
/// use ticketdesk_testing::TransitionTest;
///
/// TransitionTest::new(LifecycleEngine)
///     .with_env(environment())
///     .given_state(open_record())
///     .when_action(request(staff(), LifecycleAction::Claim))
///     .then_state(|record| assert!(record.as_ref().unwrap().is_claimed()))
///     .then_effects(|effects| assertions::assert_announces(effects, TemplateName::Claimed))
///     .run();
/// ```
pub struct TransitionTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    effect_assertions: Vec<EffectAssertion<R::Action>>,
    rejection_assertion: Option<RejectionAssertion<R::Rejection>>,
}

impl<R> TransitionTest<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + std::fmt::Debug,
    R::Rejection: std::fmt::Debug,
    R::Action: std::fmt::Debug,
{
    /// Create a new transition test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
            rejection_assertion: None,
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<R::Action>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the reducer to refuse, and assert on the reason (Then).
    ///
    /// A refused transition must leave the state untouched; `run` checks that too.
    #[must_use]
    pub fn then_rejected<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Rejection) + 'static,
    {
        self.rejection_assertion = Some(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// if the outcome (accepted or rejected) is not the expected one,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let initial = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut state = initial.clone();
        let outcome = self.reducer.reduce(&mut state, action, &env);

        match (outcome, self.rejection_assertion) {
            (Ok(effects), None) => {
                for assertion in self.state_assertions {
                    assertion(&state);
                }
                let effects = Effect::flatten(effects);
                for assertion in self.effect_assertions {
                    assertion(&effects);
                }
            }
            (Err(reason), Some(assertion)) => {
                assert_eq!(state, initial, "A rejected transition changed the state");
                assertion(&reason);
                for assertion in self.state_assertions {
                    assertion(&state);
                }
            }
            (Ok(effects), Some(_)) => panic!(
                "Expected a rejection, but the transition was accepted with {} effects",
                effects.len()
            ),
            (Err(reason), None) => panic!("Expected the transition to succeed, got {reason:?}"),
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use ticketdesk_core::effect::{AccessEdit, Effect, Ledger};
    use ticketdesk_core::ids::UserId;
    use ticketdesk_core::template::{Notice, TemplateName};

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(|e| matches!(e, Effect::None)),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Ledger operations, in order.
    #[must_use]
    pub fn ledger_ops<A>(effects: &[Effect<A>]) -> Vec<Ledger> {
        effects.iter().filter_map(Effect::ledger).cloned().collect()
    }

    /// Access edits, in order.
    #[must_use]
    pub fn access_edits<A>(effects: &[Effect<A>]) -> Vec<AccessEdit> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Access(edit) => Some(edit.clone()),
                _ => None,
            })
            .collect()
    }

    /// Notices posted into the ticket (announcements and the close notice).
    #[must_use]
    pub fn announcements<A>(effects: &[Effect<A>]) -> Vec<&Notice> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Announce(notice) | Effect::PostCloseNotice { notice, .. } => Some(notice),
                _ => None,
            })
            .collect()
    }

    /// Templates written to the audit log.
    #[must_use]
    pub fn audited<A>(effects: &[Effect<A>]) -> Vec<TemplateName> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Audit { notice, .. } => Some(notice.template),
                _ => None,
            })
            .collect()
    }

    /// Assert that the ticket receives a notice rendered from `template`
    ///
    /// # Panics
    ///
    /// Panics if no such announcement is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_announces<A>(effects: &[Effect<A>], template: TemplateName) {
        assert!(
            announcements(effects).iter().any(|n| n.template == template),
            "Expected an announcement from {template}, found {:?}",
            announcements(effects)
        );
    }

    /// Assert that an audit entry rendered from `template` is written
    ///
    /// # Panics
    ///
    /// Panics if no such audit effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_audits<A>(effects: &[Effect<A>], template: TemplateName) {
        assert!(
            audited(effects).contains(&template),
            "Expected an audit entry from {template}, found {:?}",
            audited(effects)
        );
    }

    /// Assert that `recipient` is sent a DM rendered from `template`
    ///
    /// # Panics
    ///
    /// Panics if no such notification is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_notifies<A>(effects: &[Effect<A>], recipient: &UserId, template: TemplateName) {
        assert!(
            effects.iter().any(|e| matches!(
                e,
                Effect::Notify { recipient: r, notice, .. } if r == recipient && notice.template == template
            )),
            "Expected a {template} DM to {recipient}"
        );
    }

    /// Assert that nobody is sent a DM
    ///
    /// # Panics
    ///
    /// Panics if a notification is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_notifications<A>(effects: &[Effect<A>]) {
        assert!(
            !effects.iter().any(|e| matches!(e, Effect::Notify { .. })),
            "Expected no DMs"
        );
    }

    /// Assert that a delayed action is scheduled
    ///
    /// # Panics
    ///
    /// Panics if no `Delay` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_delay_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Delay { .. })),
            "Expected at least one Delay effect, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketdesk_core::Effects;
    use ticketdesk_core::smallvec;

    #[derive(Clone, Debug, PartialEq)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;
        type Rejection = &'static str;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Result<Effects<Self::Action>, Self::Rejection> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    Ok(smallvec![Effect::None])
                }
                TestAction::Decrement if state.count == 0 => Err("already zero"),
                TestAction::Decrement => {
                    state.count -= 1;
                    Ok(smallvec![Effect::None])
                }
            }
        }
    }

    #[test]
    fn test_transition_test_increment() {
        TransitionTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_transition_test_rejection() {
        TransitionTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Decrement)
            .then_rejected(|reason| assert_eq!(*reason, "already zero"))
            .run();
    }

    #[test]
    fn test_assertions_effects_count() {
        assertions::assert_effects_count(&[Effect::<TestAction>::None], 1);
        assertions::assert_effects_count::<TestAction>(&[], 0);
    }
}
