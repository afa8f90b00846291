//! Shared wiring for the desk integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use ticketdesk::creation::question_field;
use ticketdesk::{DeskApp, InboundEvent, Reply, Settings};
use ticketdesk_core::ids::{Actor, TicketId};
use ticketdesk_core::record::TicketRecord;
use ticketdesk_runtime::store::{InMemoryTicketStore, TicketStore};
use ticketdesk_testing::mocks::{test_time, ManualClock};
use ticketdesk_testing::ports::{RecordingAuditLog, RecordingPlatform, StubTranscripts};

/// Top-level keys. Tables follow.
pub const TOP: &str = r#"
sequence_start = 1
staff_role_ids = ["staff"]
max_open_tickets = 2
"#;

/// Sections used when a test does not care about cooldowns or opening hours.
pub const SECTIONS: &str = r#"
[cooldowns]
creation_secs = 0
command_secs = 0

[features]
delete_delay_secs = 5

[notifications]
rating_prompt = true

[[notifications.rating_questions]]
label = "What could we improve?"
required = false
"#;

/// Two categories: `support` asks one question, `billing` asks none and is restricted.
pub const CATEGORIES: &str = r#"
[[categories]]
key = "support"
name = "support"
location_id = "open-tickets"
closed_location_id = "closed-tickets"
staff_role_ids = ["support-staff"]
ping_role_ids = ["support-staff"]

[[categories.questions]]
label = "What do you need help with?"
min_length = 10

[[categories]]
key = "billing"
name = "Billing"
location_id = "billing-tickets"
creator_role_ids = ["customer"]
naming = "sequence"
"#;

/// Answer given on every intake form.
pub const PROBLEM: &str = "The printer keeps jamming on page two.";

/// A desk over recording doubles.
pub struct Desk {
    pub app: DeskApp,
    pub platform: Arc<RecordingPlatform>,
    pub audit: Arc<RecordingAuditLog>,
    pub transcripts: Arc<StubTranscripts>,
    pub store: Arc<InMemoryTicketStore>,
    pub clock: Arc<ManualClock>,
}

/// Desk with the default sections.
pub async fn desk() -> Desk {
    desk_with(SECTIONS).await
}

/// Desk whose table sections are replaced by `sections`.
pub async fn desk_with(sections: &str) -> Desk {
    desk_from(settings("", sections)).await
}

/// Settings with `extra` top-level keys and the given table sections.
pub fn settings(extra: &str, sections: &str) -> Settings {
    Settings::from_toml_str(&format!("{TOP}{extra}\n{sections}{CATEGORIES}")).unwrap()
}

/// Desk over already validated settings.
pub async fn desk_from(settings: Settings) -> Desk {
    build(settings, true).await
}

/// Desk that renders transcripts from the platform history instead of the stub.
pub async fn desk_with_history(settings: Settings) -> Desk {
    build(settings, false).await
}

async fn build(settings: Settings, stub_transcripts: bool) -> Desk {
    let platform = Arc::new(RecordingPlatform::new());
    let audit = Arc::new(RecordingAuditLog::new());
    let transcripts = Arc::new(StubTranscripts::new());
    let store = Arc::new(InMemoryTicketStore::new());
    let clock = Arc::new(ManualClock::new(test_time()));
    let mut builder = DeskApp::builder(settings)
        .platform(platform.clone())
        .audit(audit.clone());
    if stub_transcripts {
        builder = builder.transcripts(transcripts.clone());
    }
    let app = builder
        .store(store.clone())
        .clock(clock.clone())
        .build()
        .await
        .unwrap();
    Desk {
        app,
        platform,
        audit,
        transcripts,
        store,
        clock,
    }
}

impl Desk {
    /// Make `actor` resolvable on the platform.
    pub fn register(&self, actor: &Actor) {
        self.platform.add_user(actor.profile.clone());
    }

    /// Pick `support`, answer its question and return the new ticket.
    pub async fn open_support(&self, actor: &Actor) -> TicketId {
        let before = self.platform.context_ids();
        let reply = self
            .app
            .handle(InboundEvent::button(actor.clone(), None, "support"))
            .await;
        let form = reply.form().expect("support asks a question");
        let reply = self
            .app
            .handle(InboundEvent::form(
                actor.clone(),
                None,
                form.id.clone(),
                vec![(question_field(0), PROBLEM.to_owned())],
                None,
            ))
            .await;
        assert_eq!(reply.title(), Some("Ticket Created!"), "{reply:?}");
        self.newest_context(&before)
    }

    /// The context that is not in `before`.
    pub fn newest_context(&self, before: &[TicketId]) -> TicketId {
        self.platform
            .context_ids()
            .into_iter()
            .find(|id| !before.contains(id))
            .expect("a new context")
    }

    /// Send `event` and return the reply.
    pub async fn send(&self, event: InboundEvent) -> Reply {
        self.app.handle(event).await
    }

    /// Press button `id` inside `ticket`.
    pub async fn press(&self, actor: &Actor, ticket: &TicketId, id: &str) -> Reply {
        self.send(InboundEvent::button(actor.clone(), Some(ticket.clone()), id))
            .await
    }

    /// The stored record.
    pub async fn record(&self, ticket: &TicketId) -> Option<TicketRecord> {
        self.store.get(ticket.clone()).await.unwrap()
    }
}
