//! Content normalizer
//!
//! Turns a raw chat request (question + optional attachment) into the ordered
//! content blocks of a single user message. The question always comes first;
//! an attachment contributes at most one block after it.

use crate::error::ComplianceError;
use crate::models::{Attachment, ChatRequest, ContentBlock, Conversation, Message};
use crate::Result;
use tracing::{info, warn};

/// Character budget for extracted PDF text.
pub const PDF_TEXT_BUDGET: usize = 5000;

pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Default)]
pub struct ContentNormalizer;

impl ContentNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Build the ordered blocks for one request.
    pub async fn normalize(&self, request: &ChatRequest) -> Vec<ContentBlock> {
        let mut blocks = vec![ContentBlock::text(request.message.clone())];

        if let Some(attachment) = &request.attachment {
            if let Some(block) = self.attachment_block(attachment).await {
                blocks.push(block);
            }
        }

        blocks
    }

    /// Start a conversation: the fixed system instruction, then the user's message.
    pub async fn assemble(&self, system_instruction: &str, request: &ChatRequest) -> Conversation {
        let mut conversation = Conversation::new(system_instruction);
        conversation.push(Message::user(self.normalize(request).await));
        conversation
    }

    async fn attachment_block(&self, attachment: &Attachment) -> Option<ContentBlock> {
        let mime = attachment.mime_type.trim().to_ascii_lowercase();

        if mime.starts_with("image/") {
            info!(
                filename = %attachment.filename,
                bytes = attachment.bytes.len(),
                "Attaching image to user message"
            );
            return Some(ContentBlock::image(&mime, &attachment.bytes));
        }

        if mime == PDF_MIME_TYPE {
            return Some(pdf_block(attachment).await);
        }

        info!(
            filename = %attachment.filename,
            mime_type = %attachment.mime_type,
            "Ignoring attachment with unsupported type"
        );
        None
    }
}

async fn pdf_block(attachment: &Attachment) -> ContentBlock {
    match extract_pdf_text(attachment.bytes.clone()).await {
        Ok(raw) => {
            info!(
                filename = %attachment.filename,
                chars = raw.chars().count(),
                "Extracted text from PDF attachment"
            );
            pdf_document(&raw, &attachment.filename)
        }
        Err(e) => {
            warn!(filename = %attachment.filename, error = %e, "PDF extraction failed");
            extraction_failed(&attachment.filename)
        }
    }
}

/// Run pdf-extract off the async workers. It can panic on malformed input;
/// a panic surfaces as a JoinError.
async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| ComplianceError::Extraction(format!("extractor aborted: {}", e)))?
        .map_err(|e| ComplianceError::Extraction(e.to_string()))
}

/// Document block for extracted text, capped at [`PDF_TEXT_BUDGET`] characters.
fn pdf_document(raw: &str, filename: &str) -> ContentBlock {
    ContentBlock::Document {
        text: truncate_chars(&join_pages(raw), PDF_TEXT_BUDGET),
        source_name: filename.to_string(),
    }
}

fn extraction_failed(filename: &str) -> ContentBlock {
    ContentBlock::Document {
        text: format!(
            "[Note: User attempted to upload PDF {}, but data extraction failed.]",
            filename
        ),
        source_name: filename.to_string(),
    }
}

/// pdf-extract separates pages with form feeds; keep non-empty pages, one per line group.
fn join_pages(raw: &str) -> String {
    raw.split('\u{c}')
        .map(str::trim_end)
        .filter(|page| !page.trim().is_empty())
        .map(|page| format!("{}\n", page))
        .collect()
}

/// Keep at most `budget` characters (not bytes).
pub fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Best-effort MIME type from a file name, for clients that send none.
pub fn mime_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => PDF_MIME_TYPE,
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    fn with_attachment(mime: &str, bytes: &[u8], filename: &str) -> ChatRequest {
        ChatRequest {
            message: "Does this charger need NOM certification?".to_string(),
            attachment: Some(Attachment {
                bytes: bytes.to_vec(),
                mime_type: mime.to_string(),
                filename: filename.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_text_only_request_yields_one_text_block() {
        let normalizer = ContentNormalizer::new();
        let conversation = normalizer
            .assemble("system", &ChatRequest::text("What does FCC stand for?"))
            .await;

        let user = &conversation.messages()[1];
        assert_eq!(user.blocks.len(), 1);
        assert!(matches!(&user.blocks[0], ContentBlock::Text { text } if text == "What does FCC stand for?"));
    }

    #[tokio::test]
    async fn test_image_round_trips_through_data_uri() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let blocks = ContentNormalizer::new()
            .normalize(&with_attachment("image/jpeg", &bytes, "label.jpg"))
            .await;

        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[0], ContentBlock::Text { .. }));

        let images: Vec<_> = blocks
            .iter()
            .filter(|b| matches!(b, ContentBlock::Image { .. }))
            .collect();
        assert_eq!(images.len(), 1);

        let (mime, payload) = images[0].image_payload().unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(BASE64.decode(payload).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_broken_pdf_yields_placeholder_document() {
        let blocks = ContentNormalizer::new()
            .normalize(&with_attachment(PDF_MIME_TYPE, b"not a pdf at all", "datasheet.pdf"))
            .await;

        assert_eq!(blocks.len(), 2);
        match &blocks[1] {
            ContentBlock::Document { text, source_name } => {
                assert_eq!(source_name, "datasheet.pdf");
                assert!(text.contains("data extraction failed"));
                assert!(text.contains("datasheet.pdf"));
            }
            other => panic!("expected document block, got {:?}", other),
        }
    }

    /// Single-page PDF using the built-in Helvetica font, with a valid xref table.
    fn single_page_pdf(line: &str) -> Vec<u8> {
        let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", line);
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut pdf = String::from("%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
        }

        let xref_at = pdf.len();
        pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            pdf.push_str(&format!("{:010} 00000 n \n", offset));
        }
        pdf.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        ));
        pdf.into_bytes()
    }

    #[tokio::test]
    async fn test_valid_pdf_yields_document_with_text() {
        let pdf = single_page_pdf("Rated input 100 to 240 V");
        let blocks = ContentNormalizer::new()
            .normalize(&with_attachment(PDF_MIME_TYPE, &pdf, "psu-datasheet.pdf"))
            .await;

        assert_eq!(blocks.len(), 2);
        match &blocks[1] {
            ContentBlock::Document { text, source_name } => {
                assert_eq!(source_name, "psu-datasheet.pdf");
                assert!(text.contains("Rated input"), "got {:?}", text);
                assert!(text.contains("240"));
                assert!(!text.contains("data extraction failed"));
            }
            other => panic!("expected document block, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extraction_fault_is_an_extraction_error() {
        let result = extract_pdf_text(b"%PDF-1.4 truncated".to_vec()).await;
        assert!(matches!(result, Err(ComplianceError::Extraction(_))));
    }

    #[test]
    fn test_pdf_document_is_capped_at_budget() {
        let raw = format!("{}\u{c}{}", "a".repeat(PDF_TEXT_BUDGET), "b".repeat(100));
        match pdf_document(&raw, "long.pdf") {
            ContentBlock::Document { text, source_name } => {
                assert_eq!(text.chars().count(), PDF_TEXT_BUDGET);
                assert!(!text.contains('b'));
                assert_eq!(source_name, "long.pdf");
            }
            other => panic!("expected document block, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_attachment_is_ignored() {
        let blocks = ContentNormalizer::new()
            .normalize(&with_attachment("application/zip", b"PK\x03\x04", "bundle.zip"))
            .await;

        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");

        let long = "ñ".repeat(PDF_TEXT_BUDGET + 100);
        assert_eq!(truncate_chars(&long, PDF_TEXT_BUDGET).chars().count(), PDF_TEXT_BUDGET);
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("Datasheet.PDF"), PDF_MIME_TYPE);
        assert_eq!(mime_type_for("label.jpeg"), "image/jpeg");
        assert_eq!(mime_type_for("README"), "application/octet-stream");
    }

    #[test]
    fn test_join_pages_drops_blank_pages() {
        let joined = join_pages("page one\u{c}   \u{c}page three  ");
        assert_eq!(joined, "page one\npage three\n");
    }
}
