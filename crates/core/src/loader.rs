use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::models::DocumentInfo;
use chrono::Utc;
use lopdf::Document;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension().and_then(|ext| ext.to_str())?;
        if extension.eq_ignore_ascii_case("txt") {
            Some(Self::Text)
        } else if extension.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else {
            None
        }
    }
}

/// Document text with line breaks collapsed into single spaces.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub info: DocumentInfo,
    pub text: String,
}

pub fn load_document(path: &Path) -> Result<LoadedDocument, IngestError> {
    if !path.is_file() {
        return Err(IngestError::FileNotFound(path.display().to_string()));
    }
    let format = DocumentFormat::from_path(path)
        .ok_or_else(|| IngestError::UnsupportedFormat(path.display().to_string()))?;

    let bytes = fs::read(path)?;
    let text = match format {
        DocumentFormat::Text => text_from_bytes(&bytes)?,
        DocumentFormat::Pdf => text_from_pdf(&bytes)?,
    };

    Ok(LoadedDocument {
        info: describe(path, &bytes),
        text,
    })
}

fn text_from_bytes(bytes: &[u8]) -> Result<String, IngestError> {
    let raw = std::str::from_utf8(bytes).map_err(|error| {
        IngestError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, error))
    })?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IngestError::EmptyContent("The TXT file is empty.".to_string()));
    }
    Ok(trimmed.lines().collect::<Vec<_>>().join(" "))
}

fn text_from_pdf(bytes: &[u8]) -> Result<String, IngestError> {
    let document =
        Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(IngestError::EmptyContent(
            "The PDF file has no readable pages.".to_string(),
        ));
    }

    let mut texts = Vec::new();
    for page_no in pages.keys() {
        let text = document
            .extract_text(&[*page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;
        if !text.trim().is_empty() {
            texts.push(normalize_whitespace(&text));
        }
    }

    let joined = texts.join(" ");
    if joined.trim().is_empty() {
        return Err(IngestError::EmptyContent(
            "No readable text found in the PDF file.".to_string(),
        ));
    }
    Ok(joined)
}

fn describe(path: &Path, bytes: &[u8]) -> DocumentInfo {
    let source_path = path.to_string_lossy().to_string();
    let title = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| source_path.clone());

    DocumentInfo {
        document_id: hex_digest(source_path.as_bytes()),
        title,
        source_path,
        checksum: hex_digest(bytes),
        ingested_at: Utc::now(),
    }
}

pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
