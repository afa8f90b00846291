//! Transcript capture over the platform's message history.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use ticketdesk_core::ids::TicketId;
use ticketdesk_core::template::FormattedMessage;
use ticketdesk_runtime::ports::{
    ChatPlatform, FileArtifact, StoredMessage, TranscriptCapture, TranscriptError,
    TranscriptFormat,
};

/// Renders a context's history as HTML or plain text.
#[derive(Clone)]
pub struct HistoryTranscripts {
    platform: Arc<dyn ChatPlatform>,
    format: TranscriptFormat,
}

impl HistoryTranscripts {
    /// Capture from `platform` in `format`.
    #[must_use]
    pub fn new(platform: Arc<dyn ChatPlatform>, format: TranscriptFormat) -> Self {
        Self { platform, format }
    }
}

impl std::fmt::Debug for HistoryTranscripts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryTranscripts")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TranscriptCapture for HistoryTranscripts {
    #[tracing::instrument(skip(self), fields(format = ?self.format))]
    async fn capture(&self, ticket: &TicketId) -> Result<FileArtifact, TranscriptError> {
        let info = self
            .platform
            .context_info(ticket)
            .await
            .map_err(|e| TranscriptError::Capture(e.to_string()))?;
        let history = self
            .platform
            .history(ticket)
            .await
            .map_err(|e| TranscriptError::Capture(e.to_string()))?;
        tracing::debug!(messages = history.len(), "Rendering transcript");

        let (extension, body) = match self.format {
            TranscriptFormat::Html => ("html", render_html(&info.name, &history)),
            TranscriptFormat::Text => ("txt", render_text(&info.name, &history)),
        };
        Ok(FileArtifact {
            name: format!("transcript-{}.{extension}", info.name),
            format: self.format,
            bytes: body.into_bytes(),
        })
    }
}

fn embed_lines(embed: &FormattedMessage) -> Vec<String> {
    let mut lines = Vec::new();
    lines.extend(embed.title.clone());
    lines.extend(embed.description.clone());
    for field in &embed.fields {
        lines.push(format!("{}: {}", field.name, field.value));
    }
    lines.extend(embed.footer.clone());
    lines
}

fn message_lines(message: &StoredMessage) -> Vec<String> {
    let mut lines: Vec<String> = message.content.iter().cloned().collect();
    if let Some(embed) = &message.embed {
        lines.extend(embed_lines(embed));
    }
    lines
}

fn render_text(name: &str, history: &[StoredMessage]) -> String {
    let mut out = format!("Transcript of {name}\n\n");
    for message in history {
        let _ = writeln!(out, "[{}]", message.id);
        for line in message_lines(message) {
            let _ = writeln!(out, "{line}");
        }
        out.push('\n');
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_html(name: &str, history: &[StoredMessage]) -> String {
    let title = escape(name);
    let mut out = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head><body>\n<h1>{title}</h1>\n"
    );
    for message in history {
        let _ = writeln!(out, "<div class=\"message\" id=\"{}\">", escape(message.id.as_str()));
        for line in message_lines(message) {
            let _ = writeln!(out, "<p>{}</p>", escape(&line).replace('\n', "<br>"));
        }
        out.push_str("</div>\n");
    }
    out.push_str("</body></html>\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use ticketdesk_core::ids::LocationId;
    use ticketdesk_runtime::ports::OutgoingMessage;
    use ticketdesk_testing::ports::RecordingPlatform;

    fn platform_with_history() -> (Arc<RecordingPlatform>, TicketId) {
        let platform = Arc::new(RecordingPlatform::new());
        let id = TicketId::new("t-1");
        platform.seed_context(&id, "support-alice", &LocationId::new("open"), vec![]);
        platform.seed_message(&id, OutgoingMessage::default().with_content("<b>hi</b> & bye"));
        platform.seed_message(
            &id,
            OutgoingMessage::embed(FormattedMessage {
                title: Some("Ticket Closed".into()),
                ..FormattedMessage::default()
            }),
        );
        (platform, id)
    }

    #[tokio::test]
    async fn html_escapes_content() {
        let (platform, id) = platform_with_history();
        let transcripts = HistoryTranscripts::new(platform, TranscriptFormat::Html);
        let file = transcripts.capture(&id).await.unwrap();
        let body = String::from_utf8(file.bytes).unwrap();
        assert_eq!(file.name, "transcript-support-alice.html");
        assert!(body.contains("&lt;b&gt;hi&lt;/b&gt; &amp; bye"));
        assert!(body.contains("<p>Ticket Closed</p>"));
    }

    #[tokio::test]
    async fn text_lists_messages_in_order() {
        let (platform, id) = platform_with_history();
        let transcripts = HistoryTranscripts::new(platform, TranscriptFormat::Text);
        let file = transcripts.capture(&id).await.unwrap();
        let body = String::from_utf8(file.bytes).unwrap();
        assert_eq!(file.format, TranscriptFormat::Text);
        let hi = body.find("<b>hi</b>").unwrap();
        let closed = body.find("Ticket Closed").unwrap();
        assert!(hi < closed);
    }

    #[tokio::test]
    async fn missing_context_is_a_capture_error() {
        let platform = Arc::new(RecordingPlatform::new());
        let transcripts = HistoryTranscripts::new(platform, TranscriptFormat::Html);
        let result = transcripts.capture(&TicketId::new("gone")).await;
        assert!(matches!(result, Err(TranscriptError::Capture(_))));
    }
}
