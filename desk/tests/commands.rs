//! Typed commands, the staff gate and manual transcripts.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::{desk, desk_from, desk_with, desk_with_history, settings, PROBLEM, SECTIONS};
use ticketdesk::{Command, InboundEvent, Reply};
use ticketdesk_core::ids::{Principal, RoleId, UserId};
use ticketdesk_core::template::TemplateName;
use ticketdesk_runtime::ports::TranscriptFormat;
use ticketdesk_testing::fixtures::{member, owner, staff};

fn in_ticket(ticket: &ticketdesk_core::ids::TicketId, command: Command) -> InboundEvent {
    InboundEvent::command(staff(), Some(ticket.clone()), command)
}

#[tokio::test]
async fn ping_reports_latency_publicly() {
    let desk = desk().await;

    let reply = desk
        .send(InboundEvent::command(staff(), None, Command::Ping))
        .await;

    assert!(!reply.is_ephemeral());
    let embed = reply.embed().unwrap();
    assert_eq!(embed.title.as_deref(), Some("Ping & Latency"));
    assert_eq!(embed.field_value("Ping"), Some("42ms"));
    assert_eq!(embed.field_value("Latency"), Some("0ms"));
    assert_eq!(embed.footer.as_deref(), Some("Requested by sam"));
}

#[tokio::test]
async fn disabled_commands_are_ignored() {
    let desk = desk_from(settings(r#"disabled_commands = ["ping"]"#, SECTIONS)).await;

    let reply = desk
        .send(InboundEvent::command(staff(), None, Command::Ping))
        .await;

    assert_eq!(reply, Reply::None);
}

#[tokio::test(start_paused = true)]
async fn commands_have_a_per_user_cooldown() {
    let sections = r#"
[cooldowns]
creation_secs = 0
command_secs = 5
"#;
    let desk = desk_with(sections).await;

    let first = desk
        .send(InboundEvent::command(staff(), None, Command::Ping))
        .await;
    assert!(first.embed().is_some());

    let second = desk
        .send(InboundEvent::command(staff(), None, Command::Ping))
        .await;
    let text = second.text().unwrap();
    assert!(
        text.starts_with("Please wait, you are on a cooldown for `ping`."),
        "{text}"
    );

    let other = desk
        .send(InboundEvent::command(owner(), None, Command::Ping))
        .await;
    assert!(other.embed().is_some());
}

#[tokio::test]
async fn lifecycle_commands_need_a_ticket() {
    let desk = desk().await;

    let reply = desk
        .send(InboundEvent::command(staff(), None, Command::Close))
        .await;

    assert_eq!(
        reply.text(),
        Some("This action can only be used inside a ticket.")
    );
}

#[tokio::test]
async fn move_files_the_ticket_under_another_category() {
    let desk = desk().await;
    let alice = owner();
    desk.register(&alice);
    let ticket = desk.open_support(&alice).await;

    let reply = desk
        .send(in_ticket(
            &ticket,
            Command::Move {
                category: "nowhere".into(),
            },
        ))
        .await;
    assert_eq!(
        reply.text(),
        Some("Invalid option. Available options are: support, Billing")
    );

    let reply = desk
        .send(in_ticket(
            &ticket,
            Command::Move {
                category: "SUPPORT".into(),
            },
        ))
        .await;
    assert_eq!(
        reply.text(),
        Some("This ticket is already in the **support** category.")
    );

    let reply = desk
        .send(in_ticket(
            &ticket,
            Command::Move {
                category: "billing".into(),
            },
        ))
        .await;
    assert_eq!(reply.text(), Some("Ticket moved to **billing**."));
    assert_eq!(desk.record(&ticket).await.unwrap().ticket_type, "Billing");
    let context = desk.platform.context(&ticket).unwrap();
    assert_eq!(
        context.info.parent.as_ref().map(|p| p.as_str()),
        Some("billing-tickets")
    );
    assert!(desk.audit.last(TemplateName::LogMoved).is_some());
}

#[tokio::test]
async fn rename_changes_the_context_name() {
    let desk = desk().await;
    let alice = owner();
    desk.register(&alice);
    let ticket = desk.open_support(&alice).await;

    let rename = |name: &str| Command::Rename { name: name.into() };

    let reply = desk
        .send(InboundEvent::command(
            alice.clone(),
            Some(ticket.clone()),
            rename("mine"),
        ))
        .await;
    assert_eq!(reply.text(), Some("You are not allowed to use this!"));

    let reply = desk.send(in_ticket(&ticket, rename("vip"))).await;
    assert_eq!(reply.text(), Some("Ticket renamed to **vip**."));
    assert_eq!(desk.platform.context(&ticket).unwrap().info.name, "vip");

    let reply = desk.send(in_ticket(&ticket, rename("vip"))).await;
    assert_eq!(reply.text(), Some("The ticket already has that name."));
}

#[tokio::test]
async fn remove_takes_exactly_one_target() {
    let desk = desk().await;
    let alice = owner();
    desk.register(&alice);
    let ticket = desk.open_support(&alice).await;
    let usage = Some("Please provide either a user or a role, but not both.");

    let neither = Command::Remove {
        user: None,
        role: None,
    };
    assert_eq!(desk.send(in_ticket(&ticket, neither)).await.text(), usage);

    let both = Command::Remove {
        user: Some(alice.profile.clone()),
        role: Some((RoleId::new("support-staff"), "Support Staff".into())),
    };
    assert_eq!(desk.send(in_ticket(&ticket, both)).await.text(), usage);

    let stranger = Command::Remove {
        user: Some(member("bob").profile),
        role: None,
    };
    assert_eq!(
        desk.send(in_ticket(&ticket, stranger)).await.text(),
        Some("That user or role is not in this ticket.")
    );
}

#[tokio::test]
async fn remove_revokes_access() {
    let desk = desk().await;
    let alice = owner();
    desk.register(&alice);
    let ticket = desk.open_support(&alice).await;

    let reply = desk
        .send(in_ticket(
            &ticket,
            Command::Remove {
                user: None,
                role: Some((RoleId::new("support-staff"), "Support Staff".into())),
            },
        ))
        .await;
    assert_eq!(reply.text(), Some("Removed **Support Staff** from the ticket."));

    let reply = desk
        .send(in_ticket(
            &ticket,
            Command::Remove {
                user: Some(alice.profile.clone()),
                role: None,
            },
        ))
        .await;
    assert_eq!(reply.text(), Some("Removed **alice** from the ticket."));

    let context = desk.platform.context(&ticket).unwrap();
    assert_eq!(
        context.access_of(&Principal::Role(RoleId::new("support-staff"))),
        None
    );
    assert_eq!(
        context.access_of(&Principal::User(UserId::new("alice-id"))),
        None
    );
    assert_eq!(
        desk.audit
            .templates()
            .iter()
            .filter(|t| **t == TemplateName::LogRemoved)
            .count(),
        2
    );
}

#[tokio::test]
async fn transcripts_are_staff_only_and_audited() {
    let desk = desk().await;
    let alice = owner();
    desk.register(&alice);
    let ticket = desk.open_support(&alice).await;

    let reply = desk.press(&alice, &ticket, "createTranscript").await;
    assert_eq!(reply.text(), Some("You are not allowed to use this!"));
    assert_eq!(desk.transcripts.captures(), 0);

    let reply = desk.press(&staff(), &ticket, "createTranscript").await;
    assert_eq!(
        reply.embed().and_then(|e| e.description.as_deref()),
        Some(format!("The transcript of <#{ticket}> has been saved by <@sam-id>.").as_str())
    );
    assert_eq!(desk.transcripts.captures(), 1);
    let entry = desk.audit.last(TemplateName::LogTranscript).unwrap();
    assert!(entry.attachment.is_some());
}

#[tokio::test]
async fn transcripts_render_the_context_history() {
    let desk = desk_with_history(settings(r#"transcript_format = "text""#, SECTIONS)).await;
    let alice = owner();
    desk.register(&alice);
    let ticket = desk.open_support(&alice).await;

    desk.press(&staff(), &ticket, "createTranscript").await;

    let file = desk
        .audit
        .last(TemplateName::LogTranscript)
        .and_then(|entry| entry.attachment)
        .unwrap();
    assert_eq!(file.name, "transcript-support-alice.txt");
    assert_eq!(file.format, TranscriptFormat::Text);
    let body = String::from_utf8(file.bytes).unwrap();
    assert!(body.contains(PROBLEM), "{body}");
}
