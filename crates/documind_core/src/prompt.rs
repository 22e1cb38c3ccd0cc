//! System instructions and fixed conversation text sent to the generative backend.

use crate::domain::{DocumentKind, PageText};

/// The exact sentence the backend must use when the document cannot answer a question.
pub const NOT_IN_DOCUMENT: &str = "The information is not available in the document.";

/// Reply used when the backend returns no text.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "I couldn't generate a response.";

pub const PDF_SYSTEM_INSTRUCTION: &str = r#"You are DocuMind, an intelligent document assistant.
Your task is to answer the user's question based ONLY on the provided document context.

RULES:
1. Answer truthfully using only the provided context.
2. If the answer is not in the document, say exactly: "The information is not available in the document."
3. Cite the page numbers where you found the information at the end of your response in this format: [Page X] or [Page X, Y].
4. Do not make up information that is not in the document.
5. Keep answers concise and professional."#;

pub const IMAGE_SYSTEM_INSTRUCTION: &str = r#"You are DocuMind, an intelligent assistant capable of analyzing images.
Analyze the provided image and answer the user's questions about it.
Be descriptive and helpful."#;

pub const VIDEO_SYSTEM_INSTRUCTION: &str = r#"You are DocuMind, an intelligent assistant capable of analyzing videos.
Analyze the provided video content and answer the user's questions about it.
Provide timestamps where possible when describing specific events.
The video is provided as context."#;

pub fn system_instruction(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Pdf => PDF_SYSTEM_INSTRUCTION,
        DocumentKind::Image => IMAGE_SYSTEM_INSTRUCTION,
        DocumentKind::Video => VIDEO_SYSTEM_INSTRUCTION,
    }
}

/// Text that accompanies the payload in the priming turn of a multi-turn media request.
pub fn media_reference_note(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Video => "Reference Video for this conversation.",
        DocumentKind::Image | DocumentKind::Pdf => "Reference Image for this conversation.",
    }
}

/// The synthetic model turn that closes the priming pair.
pub fn media_acknowledgment(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Video => "Understood. I have analyzed the video.",
        DocumentKind::Image | DocumentKind::Pdf => "Understood. I have analyzed the image.",
    }
}

/// Concatenate every page as `[Page N] <text>`, in page order.
pub fn pdf_context_block(pages: &[PageText]) -> String {
    let mut context = String::from("DOCUMENT CONTEXT:\n");
    for page in pages {
        context.push_str(&format!("[Page {}] {}\n\n", page.page, page.text));
    }
    context
}
