use docx_rs::{DocumentChild, ParagraphChild, RunChild, read_docx};
use lopdf::Document as PdfDocument;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::{AppError, Result};

/// Maximum accepted upload size (16 MiB).
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Extensions accepted by every upload path.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md", "json"];

fn filename_sanitizer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap())
}

/// Strip path components and unsafe characters from a client filename.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    filename_sanitizer().replace_all(base, "_").to_string()
}

/// Lowercased extension, or an `UnsupportedFormat` error. Runs before any
/// content I/O so a bad extension never touches the payload.
pub fn validate_extension(filename: &str) -> Result<String> {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| AppError::UnsupportedFormat(filename.to_string()))?;
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(AppError::UnsupportedFormat(format!(
            "'.{ext}' (allowed types: pdf, docx, txt, md, json)"
        )))
    }
}

/// Extract text from an uploaded file, dispatching purely on extension.
///
/// The size cap and extension allow-list are enforced here as well so the
/// extractor is safe to call from any route.
pub async fn extract_text(filename: &str, bytes: &[u8]) -> Result<String> {
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::PayloadTooLarge(format!(
            "file exceeds the {} MiB upload limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }

    let ext = validate_extension(filename)?;
    let text = match ext.as_str() {
        "pdf" => extract_pdf(bytes.to_vec()).await?,
        "docx" => extract_docx(bytes)?,
        // txt, md, json: decoded as UTF-8, tolerating stray bytes.
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::Processing(
            "could not extract any readable text from the file".to_string(),
        ));
    }

    info!(filename = %filename, chars = text.len(), "extracted document text");
    Ok(text)
}

/// PDF extraction is CPU-bound, so it runs on the blocking pool.
async fn extract_pdf(bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        let doc = PdfDocument::load_mem(&bytes)
            .map_err(|e| AppError::Processing(format!("failed to load PDF: {e}")))?;

        let mut pages_text = Vec::new();
        for (page_num, _) in doc.get_pages() {
            match doc.extract_text(&[page_num]) {
                Ok(text) => pages_text.push(text),
                Err(e) => {
                    // A single bad page should not sink the whole document.
                    warn!(page = page_num, error = %e, "failed to extract PDF page");
                }
            }
        }

        Ok(pages_text.join("\n"))
    })
    .await
    .map_err(|e| AppError::Processing(format!("PDF extraction task failed: {e}")))?
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let docx =
        read_docx(bytes).map_err(|e| AppError::Processing(format!("failed to read DOCX: {e}")))?;

    let mut lines = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            let mut line = String::new();
            for pc in &paragraph.children {
                if let ParagraphChild::Run(run) = pc {
                    for rc in &run.children {
                        if let RunChild::Text(text) = rc {
                            line.push_str(&text.text);
                        }
                    }
                }
            }
            lines.push(line);
        }
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_extension_before_io() {
        let err = validate_extension("malware.exe").unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
        assert!(validate_extension("no_extension").is_err());
    }

    #[test]
    fn accepts_allow_listed_extensions_case_insensitively() {
        assert_eq!(validate_extension("Policy.PDF").unwrap(), "pdf");
        assert_eq!(validate_extension("claim.docx").unwrap(), "docx");
        assert_eq!(validate_extension("notes.md").unwrap(), "md");
    }

    #[test]
    fn sanitizes_path_traversal_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(sanitize_filename("my claim (final).pdf"), "my_claim_final_.pdf");
    }

    #[tokio::test]
    async fn plain_text_extraction_round_trips() {
        let text = extract_text("claim.txt", b"water damage in kitchen")
            .await
            .unwrap();
        assert_eq!(text, "water damage in kitchen");
    }

    #[tokio::test]
    async fn empty_file_is_a_processing_error() {
        let err = extract_text("empty.txt", b"  \n ").await.unwrap_err();
        assert!(matches!(err, AppError::Processing(_)));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let big = vec![b'a'; MAX_UPLOAD_BYTES + 1];
        let err = extract_text("big.txt", &big).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }
}
