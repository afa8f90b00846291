//! Property tests for the lifecycle engine: the open-ticket index never disagrees with the
//! records, and the claim invariants survive arbitrary action sequences.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use ticketdesk_core::prelude::*;

struct Frozen;

impl Clock for Frozen {
    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }
}

fn environment(max_open_tickets: usize) -> LifecycleEnvironment {
    let category = CategoryDefinition {
        key: CategoryKey::new("support"),
        name: "support".into(),
        location_id: LocationId::new("loc"),
        closed_location_id: None,
        staff_role_ids: vec![RoleId::new("staff")],
        ping_role_ids: vec![],
        creator_role_ids: vec![],
        form_title: None,
        embed_title: None,
        description: None,
        color: None,
        naming: NamingStrategy::Username,
        questions: vec![],
    };
    LifecycleEnvironment::new(
        Arc::new(Frozen),
        LifecyclePolicy {
            max_open_tickets,
            staff_role_ids: vec![RoleId::new("staff")],
            ..LifecyclePolicy::default()
        },
        Arc::new(CategoryRegistry::new(vec![category]).unwrap()),
    )
}

fn staff(n: u8) -> Actor {
    Actor::new(
        UserProfile::new(format!("staff-{n}"), format!("staff-{n}"), format!("staff{n}")),
        vec![RoleId::new("staff")],
    )
}

fn owner() -> Actor {
    Actor::new(UserProfile::new("owner", "owner", "owner"), vec![])
}

#[derive(Clone, Debug)]
enum Step {
    Open,
    Claim(u8),
    Unclaim(u8),
    Close,
    Reopen,
    Delete,
    Purge,
}

fn arb_step() -> impl Strategy<Value = (usize, Step)> {
    (
        0usize..3,
        prop_oneof![
            Just(Step::Open),
            (0u8..2).prop_map(Step::Claim),
            (0u8..2).prop_map(Step::Unclaim),
            Just(Step::Close),
            Just(Step::Reopen),
            Just(Step::Delete),
            Just(Step::Purge),
        ],
    )
}

/// A tiny in-memory world: records per ticket plus the ledger the runtime would maintain.
#[derive(Default)]
struct World {
    records: BTreeMap<usize, Option<TicketRecord>>,
    index: BTreeSet<TicketId>,
    total_tickets: u64,
}

impl World {
    fn apply(&mut self, env: &LifecycleEnvironment, slot: usize, step: &Step) -> Result<(), RejectReason> {
        let id = TicketId::new(format!("t-{slot}"));
        let open_count = self
            .records
            .values()
            .flatten()
            .filter(|r| r.is_open() && r.owner_id.as_str() == "owner")
            .count();
        let (actor, action) = match step {
            Step::Open => (
                owner(),
                LifecycleAction::Open {
                    category: CategoryKey::new("support"),
                    intake_msg: MessageId::new(format!("m-{slot}")),
                    open_count,
                },
            ),
            Step::Claim(n) => (staff(*n), LifecycleAction::Claim),
            Step::Unclaim(n) => (staff(*n), LifecycleAction::Unclaim),
            Step::Close => (staff(0), LifecycleAction::Close),
            Step::Reopen => (staff(0), LifecycleAction::Reopen),
            Step::Delete => (staff(0), LifecycleAction::Delete),
            Step::Purge => {
                // The timer only exists for tickets that were deleted.
                let pending = self
                    .records
                    .get(&slot)
                    .and_then(Option::as_ref)
                    .is_some_and(|r| r.pending_deletion);
                if !pending {
                    return Ok(());
                }
                (staff(0), LifecycleAction::Purge)
            }
        };

        let state = self.records.entry(slot).or_default();
        let request = LifecycleRequest::new(TicketContext::new(id, "support-owner"), actor, action);
        let effects = LifecycleEngine.reduce(state, request, env)?;
        for effect in Effect::flatten(effects) {
            match effect {
                Effect::Ledger(Ledger::IndexAdd(id)) => {
                    self.index.insert(id);
                }
                Effect::Ledger(Ledger::IndexRemove(id)) => {
                    self.index.remove(&id);
                }
                Effect::Ledger(Ledger::Increment(Counter::TotalTickets)) => self.total_tickets += 1,
                _ => {}
            }
        }
        Ok(())
    }

    fn open_ids(&self) -> BTreeSet<TicketId> {
        self.records
            .iter()
            .filter_map(|(slot, record)| {
                record
                    .as_ref()
                    .filter(|r| r.is_open())
                    .map(|_| TicketId::new(format!("t-{slot}")))
            })
            .collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The open-ticket index equals the set of records whose status is Open.
    #[test]
    fn prop_index_matches_open_records(steps in prop::collection::vec(arb_step(), 1..60)) {
        let env = environment(3);
        let mut world = World::default();
        for (slot, step) in &steps {
            let _ = world.apply(&env, *slot, step);
            prop_assert_eq!(&world.index, &world.open_ids());
        }
    }

    /// A rejected action never changes the record.
    #[test]
    fn prop_rejections_leave_state_untouched(steps in prop::collection::vec(arb_step(), 1..60)) {
        let env = environment(3);
        let mut world = World::default();
        for (slot, step) in &steps {
            let before = world.records.get(slot).cloned().flatten();
            if world.apply(&env, *slot, step).is_err() {
                prop_assert_eq!(world.records.get(slot).cloned().flatten(), before);
            }
        }
    }

    /// Claims are exclusive: whoever claimed first keeps the claim until they release it.
    #[test]
    fn prop_claim_is_exclusive(order in prop::collection::vec(0u8..3, 2..8)) {
        let env = environment(3);
        let mut world = World::default();
        world.apply(&env, 0, &Step::Open).unwrap();
        let first = order[0];
        world.apply(&env, 0, &Step::Claim(first)).unwrap();
        for n in &order[1..] {
            let result = world.apply(&env, 0, &Step::Claim(*n));
            prop_assert!(matches!(result, Err(RejectReason::AlreadyInState(TicketCondition::Claimed(_)))));
        }
        let record = world.records[&0].clone().unwrap();
        prop_assert_eq!(record.claimant, Some(UserId::new(format!("staff-{first}"))));
    }
}

#[test]
fn quota_frees_up_after_a_close() {
    let env = environment(2);
    let mut world = World::default();
    world.apply(&env, 0, &Step::Open).unwrap();
    world.apply(&env, 1, &Step::Open).unwrap();
    assert_eq!(
        world.apply(&env, 2, &Step::Open),
        Err(RejectReason::QuotaExceeded { max: 2 })
    );
    world.apply(&env, 0, &Step::Close).unwrap();
    world.apply(&env, 2, &Step::Open).unwrap();
    assert_eq!(world.total_tickets, 3);
}
