use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::TextExtractor;

pub const PDF_MIMETYPE: &str = "application/pdf";

/// Reads text documents from disk. Invalid UTF-8 is decoded lossily rather
/// than rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn supports(&self, mimetype: &str) -> bool {
        mimetype.starts_with("text/")
    }

    async fn extract(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::extraction(path.display().to_string(), e))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        debug!(path = %path.display(), chars = text.chars().count(), "extracted text");
        Ok(text)
    }
}

/// Text layer of a PDF via `pdf-extract`. Parsing runs on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    fn supports(&self, mimetype: &str) -> bool {
        mimetype == PDF_MIMETYPE
    }

    async fn extract(&self, path: &Path) -> Result<String> {
        let shown = path.display().to_string();
        let bytes = tokio::fs::read(path).await.map_err(|e| Error::extraction(shown.clone(), e))?;
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| Error::extraction(shown.clone(), format!("extraction task aborted: {e}")))?
            .map_err(|e| Error::extraction(shown.clone(), e))?;
        debug!(path = %shown, chars = text.chars().count(), "extracted pdf text");
        Ok(text)
    }
}

/// Dispatches on the file extension: `.pdf` goes to [`PdfExtractor`],
/// everything else is read as text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor {
    plain: PlainTextExtractor,
    pdf: PdfExtractor,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    fn supports(&self, mimetype: &str) -> bool {
        self.plain.supports(mimetype) || self.pdf.supports(mimetype)
    }

    async fn extract(&self, path: &Path) -> Result<String> {
        if is_pdf(path) {
            self.pdf.extract(path).await
        } else {
            self.plain.extract(path).await
        }
    }
}

/// Best-effort mimetype from a file extension, used when the caller does not
/// supply one.
pub fn guess_mimetype(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("pdf") => PDF_MIMETYPE,
        Some("md" | "markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        Some("txt" | "text" | "log") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_extractor_accepts_text_and_pdf() {
        let ex = DocumentExtractor::new();
        assert!(ex.supports("text/plain"));
        assert!(ex.supports("text/markdown"));
        assert!(ex.supports(PDF_MIMETYPE));
        assert!(!ex.supports("image/png"));
    }

    #[test]
    fn guesses_mimetype_from_extension() {
        assert_eq!(guess_mimetype(Path::new("a/b/report.PDF")), PDF_MIMETYPE);
        assert_eq!(guess_mimetype(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_mimetype(Path::new("README")), "application/octet-stream");
    }

    #[tokio::test]
    async fn pdf_extractor_reports_garbage_as_extraction_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").expect("write");
        let err = DocumentExtractor::new().extract(&path).await.expect_err("garbage pdf");
        assert!(matches!(err, Error::Extraction { .. }), "{err:?}");
    }
}
