//! PDF loading, one document per page

use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::PageDocument;

/// Upper bound for the whole-document fallback extraction
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Load every PDF under `dir` as page documents
///
/// Files are visited in path order. A file that cannot be read or parsed is
/// logged and skipped; a missing directory yields no pages.
pub fn load_documents(dir: &Path) -> Result<Vec<PageDocument>> {
    if !dir.exists() {
        tracing::info!("No documents found in {}", dir.display());
        return Ok(Vec::new());
    }

    tracing::info!("Load pdf documents from {}", dir.display());

    let mut pages = Vec::new();
    let entries = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_pdf(e.path()));

    for entry in entries {
        let path = entry.path();
        let source = path.display().to_string();

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("[{}] Failed to read: {}", source, e);
                continue;
            }
        };

        match extract_pages(&source, &data) {
            Ok(texts) => {
                tracing::debug!("[{}] Extracted {} pages", source, texts.len());
                pages.extend(
                    texts
                        .into_iter()
                        .enumerate()
                        .map(|(i, text)| PageDocument::new(text, source.clone(), i as u32 + 1)),
                );
            }
            Err(e) => tracing::warn!("[{}] Skipping: {}", source, e),
        }
    }

    Ok(pages)
}

/// Whether a path has a `.pdf` extension (any case)
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Extract the text of each page, in page order
///
/// lopdf gives per-page text. When it cannot load the file or finds no text
/// at all, pdf-extract's whole-document text is used as a single page.
pub fn extract_pages(filename: &str, data: &[u8]) -> Result<Vec<String>> {
    match extract_with_lopdf(filename, data) {
        Ok(pages) if pages.iter().any(|p| !p.trim().is_empty()) => Ok(pages),
        Ok(_) => {
            tracing::warn!("[{}] lopdf found no text, trying pdf-extract", filename);
            extract_whole_document(filename, data).map(|text| vec![text])
        }
        Err(e) => {
            tracing::warn!("[{}] lopdf failed: {}, trying pdf-extract", filename, e);
            extract_whole_document(filename, data).map(|text| vec![text])
        }
    }
}

fn extract_with_lopdf(filename: &str, data: &[u8]) -> Result<Vec<String>> {
    let doc = lopdf::Document::load_mem(data)
        .map_err(|e| Error::file_parse(filename, format!("Failed to load PDF: {}", e)))?;

    let mut pages = Vec::new();
    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                // Keep numbering aligned with the document
                tracing::debug!("[{}] Could not extract page {}: {}", filename, page_num, e);
                pages.push(String::new());
            }
        }
    }

    Ok(pages)
}

/// pdf-extract can stall on unusual fonts, so it runs on its own thread
fn extract_whole_document(filename: &str, data: &[u8]) -> Result<String> {
    let data_vec = data.to_vec();
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let result = pdf_extract::extract_text_from_mem(&data_vec);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(FALLBACK_TIMEOUT) {
        Ok(Ok(text)) => {
            let _ = handle.join();
            if text.trim().is_empty() {
                Err(Error::file_parse(
                    filename,
                    "PDF has no extractable text (image-based or encrypted)",
                ))
            } else {
                Ok(text)
            }
        }
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(Error::file_parse(filename, e.to_string()))
        }
        Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::file_parse(
            filename,
            format!("extraction timed out after {}s", FALLBACK_TIMEOUT.as_secs()),
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Error::file_parse(filename, "extraction thread crashed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pdf_bytes;

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(Path::new("a/report.pdf")));
        assert!(is_pdf(Path::new("REPORT.PDF")));
        assert!(!is_pdf(Path::new("notes.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pages = load_documents(&dir.path().join("source").join("nobody")).unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn test_invalid_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain text").unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf at all").unwrap();

        let pages = load_documents(dir.path()).unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn test_pages_are_numbered_from_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("guide.pdf"),
            pdf_bytes(&["rust alpha", "ocean beta"]),
        )
        .unwrap();

        let pages = load_documents(dir.path()).unwrap();
        assert_eq!(pages.len(), 2);

        assert_eq!(pages[0].metadata.page, 1);
        assert!(pages[0].content.contains("rust alpha"));
        assert_eq!(pages[1].metadata.page, 2);
        assert!(pages[1].content.contains("ocean beta"));

        let expected = dir.path().join("guide.pdf").display().to_string();
        assert!(pages.iter().all(|p| p.metadata.source == expected));
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(extract_pages("x.pdf", b"garbage").is_err());
    }
}
