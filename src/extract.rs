//! Text extraction for uploaded documents.
//!
//! Dispatches on file extension over a closed set of formats. Extraction is
//! best-effort at the page level (a PDF page that yields no text is skipped)
//! but an unreadable or corrupt file is fatal to the ingestion call.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::core::errors::EngineError;

/// Supported document formats, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
    Unsupported,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => DocumentFormat::Pdf,
            Some("docx") => DocumentFormat::Docx,
            Some("txt") => DocumentFormat::Txt,
            _ => DocumentFormat::Unsupported,
        }
    }
}

/// Extract plain text from a stored file.
///
/// Unsupported extensions yield an empty string so the caller can skip the
/// document without failing the upload.
pub async fn extract_text(path: &Path) -> Result<String, EngineError> {
    let format = DocumentFormat::from_path(path);
    debug!("Extracting {:?} as {:?}", path, format);

    match format {
        DocumentFormat::Pdf => {
            let bytes = tokio::fs::read(path).await?;
            tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
                .await
                .map_err(|e| EngineError::Extraction(format!("task join error: {e}")))?
        }
        DocumentFormat::Docx => {
            let bytes = tokio::fs::read(path).await?;
            tokio::task::spawn_blocking(move || extract_docx_text(&bytes))
                .await
                .map_err(|e| EngineError::Extraction(format!("task join error: {e}")))?
        }
        DocumentFormat::Txt => Ok(tokio::fs::read_to_string(path).await?),
        DocumentFormat::Unsupported => Ok(String::new()),
    }
}

/// Per-page text, pages joined with a space. Pages the parser cannot read
/// contribute the empty string.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, EngineError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| EngineError::Extraction(format!("pdf parse failed: {e}")))?;

    Ok(pages.join(" "))
}

/// Paragraph text from `word/document.xml`, paragraphs joined with spaces.
fn extract_docx_text(bytes: &[u8]) -> Result<String, EngineError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| EngineError::Extraction(format!("docx open failed: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| EngineError::Extraction(format!("docx missing document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| EngineError::Extraction(format!("docx read failed: {e}")))?;

    Ok(document_xml_to_text(&xml))
}

/// Collect the text of `<w:t>` runs; a paragraph close becomes a space.
fn document_xml_to_text(xml: &str) -> String {
    let mut result = String::new();
    let mut rest = xml;

    while let Some(start) = rest.find("<w:t") {
        let after_tag = &rest[start + 4..];

        // Only text runs: <w:t> or <w:t xml:space="...">. Other tags that
        // share the prefix (<w:tc>, <w:tbl>, <w:tab/>) are skipped.
        if !(after_tag.starts_with('>')
            || after_tag.starts_with(' ')
            || after_tag.starts_with('/'))
        {
            rest = after_tag;
            continue;
        }

        let Some(close) = after_tag.find('>') else {
            break;
        };
        if after_tag[..close].ends_with('/') {
            rest = &after_tag[close + 1..];
            continue;
        }

        let body = &after_tag[close + 1..];
        let Some(end) = body.find("</w:t>") else {
            break;
        };

        // Paragraph boundaries between the previous run and this one
        // separate words in the flattened text.
        let gap = &rest[..start];
        if !result.is_empty() && gap.contains("</w:p>") {
            result.push(' ');
        }

        result.push_str(&decode_entities(&body[..end]));
        rest = &body[end + 6..];
    }

    result
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_dispatch_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("report.PDF")),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.docx")),
            DocumentFormat::Docx
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("readme.txt")),
            DocumentFormat::Txt
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("archive.zip")),
            DocumentFormat::Unsupported
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("no_extension")),
            DocumentFormat::Unsupported
        );
    }

    #[tokio::test]
    async fn txt_files_are_read_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.txt");
        std::fs::write(&path, "alpha beta\ngamma").unwrap();

        let text = extract_text(&path).await.unwrap();
        assert_eq!(text, "alpha beta\ngamma");
    }

    #[tokio::test]
    async fn unsupported_extension_yields_empty_text() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.csv");
        std::fs::write(&path, "a,b,c").unwrap();

        let text = extract_text(&path).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let result = extract_text(Path::new("/nonexistent/doc.txt")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn corrupt_docx_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.docx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let result = extract_text(&path).await;
        assert!(matches!(result, Err(EngineError::Extraction(_))));
    }

    #[test]
    fn document_xml_flattens_paragraphs() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second &amp; third</w:t></w:r></w:p>
        </w:body></w:document>"#;

        assert_eq!(document_xml_to_text(xml), "Hello world Second & third");
    }

    #[test]
    fn document_xml_skips_self_closing_runs() {
        let xml = "<w:p><w:r><w:t/></w:r><w:r><w:t>text</w:t></w:r></w:p>";
        assert_eq!(document_xml_to_text(xml), "text");
    }
}
