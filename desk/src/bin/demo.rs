//! Ticketdesk demo - one ticket from pick to purge
//!
//! Runs the desk against the in-memory platform and audit log doubles and walks a ticket
//! through its whole lifecycle, printing every reply and the resulting audit trail.
//!
//! # Running the Demo
//!
//! ```bash
//! cargo run -p ticketdesk --features demo --bin demo
//! RUST_LOG=ticketdesk=debug cargo run -p ticketdesk --features demo --bin demo
//! ```
//!
//! Set `TICKETDESK_CONFIG` to use another configuration file. When it sets `metrics_addr`,
//! Prometheus metrics are served there for the duration of the run.

#![allow(missing_docs)]

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use ticketdesk::creation::question_field;
use ticketdesk::{Command, DeskApp, InboundEvent, Reply, Settings};
use ticketdesk_core::ids::{Actor, RoleId, TicketId, UserProfile};
use ticketdesk_runtime::metrics::MetricsServer;
use ticketdesk_testing::ports::{RecordingAuditLog, RecordingPlatform};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn show(step: &str, reply: &Reply) {
    match reply {
        Reply::None => println!("[{step}] (no reply)"),
        Reply::Text { content, .. } => println!("[{step}] {content}"),
        Reply::Embed { message, .. } => println!(
            "[{step}] {} | {}",
            message.title.as_deref().unwrap_or("-"),
            message.description.as_deref().unwrap_or("-")
        ),
        Reply::Form(form) => {
            println!("[{step}] form '{}' ({} fields)", form.title, form.fields.len());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticketdesk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // 2. Load configuration
    let settings = Settings::load().context("loading configuration")?;
    let delete_delay = settings.policy.delete_delay;
    let staff_role = settings
        .policy
        .staff_role_ids
        .first()
        .cloned()
        .unwrap_or_else(|| RoleId::new("staff"));

    // 3. Optional Prometheus exporter
    let mut metrics = settings.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start()?;
    }

    // 4. Wire the desk over the in-memory doubles
    let platform = Arc::new(RecordingPlatform::new());
    let audit = Arc::new(RecordingAuditLog::new());
    let app = DeskApp::builder(settings)
        .platform(platform.clone())
        .audit(audit.clone())
        .build()
        .await?;

    let alice = Actor::new(UserProfile::new("alice-id", "alice#0001", "alice"), vec![]);
    let sam = Actor::new(UserProfile::new("sam-id", "sam#0002", "sam"), vec![staff_role]);
    platform.add_user(alice.profile.clone());
    platform.add_user(sam.profile.clone());

    // 5. Alice picks a category and fills in the form
    let reply = app
        .handle(InboundEvent::button(alice.clone(), None, "support"))
        .await;
    show("pick", &reply);
    let form = reply.form().context("support should ask its questions")?;
    let reply = app
        .handle(InboundEvent::form(
            alice.clone(),
            None,
            form.id.clone(),
            vec![(question_field(0), "The printer keeps jamming on page two.".into())],
            None,
        ))
        .await;
    show("submit", &reply);
    let ticket: TicketId = platform
        .context_ids()
        .into_iter()
        .next()
        .context("a ticket context should exist")?;
    let here = Some(ticket.clone());

    // 6. Lifecycle
    let steps: [(&str, InboundEvent); 6] = [
        ("claim", InboundEvent::button(sam.clone(), here.clone(), "ticketclaim")),
        ("owner close", InboundEvent::button(alice.clone(), here.clone(), "closeTicket")),
        ("close", InboundEvent::command(sam.clone(), here.clone(), Command::Close)),
        ("ping", InboundEvent::command(sam.clone(), here.clone(), Command::Ping)),
        ("reopen", InboundEvent::button(alice.clone(), here.clone(), "reOpen")),
        ("delete", InboundEvent::button(sam.clone(), here.clone(), "deleteTicket")),
    ];
    for (step, event) in steps {
        show(step, &app.handle(event).await);
    }

    // 7. Wait for the purge and print the audit trail
    tokio::time::sleep(delete_delay + Duration::from_millis(500)).await;
    println!(
        "context still present: {}",
        platform.context(&ticket).is_some()
    );
    for template in audit.templates() {
        println!("audit: {template}");
    }
    if let Some(server) = &metrics {
        if let Some(rendered) = server.render() {
            println!("{rendered}");
        }
    }

    app.shutdown(Duration::from_secs(10)).await?;
    Ok(())
}
