//! Plain-text chat transcript export.

use chrono::{DateTime, Utc};

use crate::domain::{ChatMessage, Document, Role};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Render the conversation about `document` as a downloadable log.
///
/// Returns `None` when there is nothing to export.
pub fn render_transcript(
    document: &Document,
    messages: &[ChatMessage],
    exported_at: DateTime<Utc>,
) -> Option<String> {
    if messages.is_empty() {
        return None;
    }

    let header = format!(
        "DocuMind AI Chat Log\nDocument: {}\nDate: {}\n-------------------\n\n",
        document.name,
        exported_at.format(TIMESTAMP_FORMAT)
    );
    let body = messages
        .iter()
        .map(|message| {
            let speaker = match message.role {
                Role::User => "You",
                Role::Model => "AI",
            };
            format!(
                "[{}] {}:\n{}\n",
                message.timestamp.format(TIMESTAMP_FORMAT),
                speaker,
                message.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(header + &body)
}

/// `Quarterly Report.pdf` becomes `Quarterly_Report.pdf_chat_history.txt`.
pub fn transcript_file_name(document: &Document) -> String {
    let stem = document.name.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{stem}_chat_history.txt")
}
