//! Mention syntax and markdown escaping for user-supplied text.

use crate::ids::{RoleId, TicketId, UserId};

/// `<@id>`
#[must_use]
pub fn user_mention(id: &UserId) -> String {
    format!("<@{id}>")
}

/// `<@&id>`
#[must_use]
pub fn role_mention(id: &RoleId) -> String {
    format!("<@&{id}>")
}

/// `<#id>`
#[must_use]
pub fn context_mention(id: &TicketId) -> String {
    format!("<#{id}>")
}

/// `<t:unix:style>`, rendered by the client in the reader's locale.
#[must_use]
pub fn timestamp(unix: i64, style: char) -> String {
    format!("<t:{unix}:{style}>")
}

/// Escape markdown control characters so names and tags render literally.
#[must_use]
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '*' | '_' | '~' | '`' | '|' | '>') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
