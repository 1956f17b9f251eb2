use log::{info, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes a PDF header may be preceded by before readers give up on it.
const HEADER_SEARCH_WINDOW: usize = 1024;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{0} is not a PDF file")]
    NotPdf(String),
    #[error("Failed to extract text from {filename}: {reason}")]
    Extraction { filename: String, reason: String },
    #[error("No extractable text found in {0}")]
    Empty(String),
}

/// An uploaded file, read once and handed to the loader.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub path: PathBuf,
    pub content: Vec<u8>,
}

impl Document {
    pub async fn read<P: AsRef<Path>>(path: P) -> Result<Self, DocumentError> {
        let path = path.as_ref().to_path_buf();
        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| DocumentError::Read {
                path: path.display().to_string(),
                source: e,
            })?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            filename,
            path,
            content,
        })
    }

    pub fn has_pdf_header(&self) -> bool {
        let window = &self.content[..self.content.len().min(HEADER_SEARCH_WINDOW)];
        window.windows(5).any(|w| w == b"%PDF-")
    }
}

/// Extracts plain text from a PDF document.
///
/// Extraction runs on the blocking pool; a panic inside the parser on a
/// malformed file is reported as an extraction error.
pub async fn extract_text(document: &Document) -> Result<String, DocumentError> {
    if !document.has_pdf_header() {
        return Err(DocumentError::NotPdf(document.filename.clone()));
    }

    let filename = document.filename.clone();
    let content = document.content.clone();
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&content))
        .await
        .map_err(|e| {
            warn!("PDF parser aborted on {}: {}", filename, e);
            DocumentError::Extraction {
                filename: filename.clone(),
                reason: "the PDF parser aborted on malformed input".to_string(),
            }
        })?
        .map_err(|e| DocumentError::Extraction {
            filename: filename.clone(),
            reason: e.to_string(),
        })?;

    if extracted.trim().is_empty() {
        return Err(DocumentError::Empty(filename));
    }

    info!("Extracted {} characters from {}", extracted.chars().count(), filename);
    Ok(extracted)
}

/// Reads and extracts a PDF in one step.
pub async fn load_pdf<P: AsRef<Path>>(path: P) -> Result<(Document, String), DocumentError> {
    let document = Document::read(path).await?;
    let text = extract_text(&document).await?;
    Ok((document, text))
}
