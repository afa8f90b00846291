//! # Ticketdesk
//!
//! The application layer of the support-ticket desk: configuration, the event router with its
//! gates, ticket creation, star-rating feedback and the default message templates.
//!
//! A [`DeskApp`] wires a [`TicketRuntime`] from validated [`Settings`] and the capability
//! ports supplied by the host, then answers every [`InboundEvent`] with a [`Reply`].
//!
//! ## Example
//!
//! ```ignore
//! use ticketdesk::{DeskApp, Settings};
//!
//! let settings = Settings::load()?;
//! let app = DeskApp::builder(settings)
//!     .platform(platform)
//!     .audit(audit_log)
//!     .build()
//!     .await?;
//!
//! let reply = app.handle(event).await;
//! ```

use std::sync::Arc;
use std::time::Duration;
use ticketdesk_core::environment::{Clock, LifecycleEnvironment, SystemClock};
use ticketdesk_runtime::dispatcher::EffectDispatcher;
use ticketdesk_runtime::ports::{AuditLog, ChatPlatform, TranscriptCapture};
use ticketdesk_runtime::store::{InMemoryTicketStore, TicketStore};
use ticketdesk_runtime::{RuntimeError, TicketRuntime};

pub mod config;
pub mod creation;
pub mod error;
pub mod event;
pub mod feedback;
pub mod gates;
pub mod reply;
pub mod router;
pub mod templates;
pub mod transcript;

pub use config::Settings;
pub use error::DeskError;
pub use event::{Command, EventKind, InboundEvent};
pub use reply::Reply;
pub use router::Router;

use templates::TemplateRegistry;
use transcript::HistoryTranscripts;

/// A fully wired desk.
#[derive(Debug)]
pub struct DeskApp {
    router: Router,
}

impl DeskApp {
    /// Start wiring a desk from `settings`.
    #[must_use]
    pub fn builder(settings: Settings) -> DeskAppBuilder {
        DeskAppBuilder {
            settings,
            platform: None,
            transcripts: None,
            audit: None,
            store: None,
            clock: None,
        }
    }

    /// Answer one event.
    pub async fn handle(&self, event: InboundEvent) -> Reply {
        self.router.handle(event).await
    }

    /// The router.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// The lifecycle runtime.
    #[must_use]
    pub const fn runtime(&self) -> &TicketRuntime {
        self.router.runtime()
    }

    /// Stop accepting transitions and wait for scheduled deletions.
    ///
    /// # Errors
    ///
    /// `ShutdownTimeout` if scheduled deletions are still pending after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
        self.runtime().shutdown(timeout).await
    }
}

/// Collects the ports a [`DeskApp`] needs.
pub struct DeskAppBuilder {
    settings: Settings,
    platform: Option<Arc<dyn ChatPlatform>>,
    transcripts: Option<Arc<dyn TranscriptCapture>>,
    audit: Option<Arc<dyn AuditLog>>,
    store: Option<Arc<dyn TicketStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl DeskAppBuilder {
    /// The chat platform. Required.
    #[must_use]
    pub fn platform(mut self, platform: Arc<dyn ChatPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Transcript capture. Defaults to rendering the platform history in the configured format.
    #[must_use]
    pub fn transcripts(mut self, transcripts: Arc<dyn TranscriptCapture>) -> Self {
        self.transcripts = Some(transcripts);
        self
    }

    /// The audit log. Required.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The ticket store. Defaults to an in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn TicketStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The clock. Defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wire everything and seed the store.
    ///
    /// # Errors
    ///
    /// `MissingPort` without a platform or audit log; a runtime error if seeding the store fails.
    pub async fn build(self) -> Result<DeskApp, DeskError> {
        let settings = self.settings;
        let platform = self.platform.ok_or(DeskError::MissingPort("chat platform"))?;
        let audit = self.audit.ok_or(DeskError::MissingPort("audit log"))?;
        let transcripts = self.transcripts.unwrap_or_else(|| {
            Arc::new(HistoryTranscripts::new(platform.clone(), settings.transcript_format))
        });
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTicketStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let templates =
            TemplateRegistry::defaults().with_overrides(settings.templates.clone());
        let dispatcher = EffectDispatcher::new(platform, Arc::new(templates), transcripts, audit)
            .with_claim_enabled(settings.policy.claim_enabled);
        let environment = LifecycleEnvironment::new(
            clock,
            settings.policy.clone(),
            settings.categories.clone(),
        );
        let runtime = TicketRuntime::new(store, environment, dispatcher);
        runtime.bootstrap(settings.sequence_start).await?;
        tracing::info!(
            categories = settings.categories.len(),
            working_hours = settings.working_hours.is_some(),
            "Desk ready"
        );

        Ok(DeskApp {
            router: Router::new(runtime, Arc::new(settings)),
        })
    }
}

impl std::fmt::Debug for DeskAppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskAppBuilder")
            .field("settings", &self.settings)
            .field("platform", &self.platform.is_some())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}
