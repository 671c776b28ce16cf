//! The document being read: extracted text plus the latest transform output.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ReadEasyError, Result};
use crate::transform::{TransformKind, TransformResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    file_name: String,
    extracted: String,
    processed: Option<String>,
    last_transform: Option<TransformKind>,
}

impl Document {
    pub fn new(file_name: impl Into<String>, extracted: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            extracted: extracted.into(),
            processed: None,
            last_transform: None,
        }
    }

    /// Load a plain-text file. Extraction from PDFs or images happens upstream.
    pub fn from_file(path: &Path) -> Result<Self> {
        let extracted = fs::read_to_string(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.txt".to_string());
        info!("Loaded {} ({} chars)", file_name, extracted.chars().count());
        Ok(Self::new(file_name, extracted))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn extracted(&self) -> &str {
        &self.extracted
    }

    pub fn processed(&self) -> Option<&str> {
        self.processed.as_deref()
    }

    pub fn last_transform(&self) -> Option<TransformKind> {
        self.last_transform
    }

    /// What gets read aloud, transformed and exported: the processed text if
    /// there is any, the extracted text otherwise.
    pub fn active_text(&self) -> &str {
        match self.processed.as_deref() {
            Some(processed) if !processed.is_empty() => processed,
            _ => &self.extracted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active_text().trim().is_empty()
    }

    pub fn apply(&mut self, kind: TransformKind, result: TransformResult) {
        debug!("Document {} via {kind} ({} chars)", self.file_name, result.text.chars().count());
        self.processed = Some(result.text);
        self.last_transform = Some(kind);
    }

    /// Drop the transform output and go back to the extracted text.
    pub fn revert(&mut self) {
        self.processed = None;
        self.last_transform = None;
    }

    /// `report.pdf` → `report_processed.txt`
    pub fn export_file_name(&self) -> String {
        let stem = match self.file_name.rsplit_once('.') {
            Some((stem, ext)) if !ext.is_empty() && !ext.contains('/') => stem,
            _ => self.file_name.as_str(),
        };
        format!("{stem}_processed.txt")
    }

    /// Write the active text next to other exports in `dir`.
    pub fn export(&self, dir: &Path) -> Result<PathBuf> {
        if self.is_empty() {
            return Err(ReadEasyError::InputInvalid("nothing to export".into()));
        }
        fs::create_dir_all(dir)?;
        let path = dir.join(self.export_file_name());
        fs::write(&path, self.active_text())?;
        info!("Exported {} chars to {}", self.active_text().chars().count(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(text: &str) -> TransformResult {
        TransformResult {
            text: text.to_string(),
            truncated: false,
        }
    }

    #[test]
    fn test_active_text_prefers_processed() {
        let mut doc = Document::new("notes.txt", "Original text.");
        assert_eq!(doc.active_text(), "Original text.");

        doc.apply(TransformKind::Summarize, summary("Short."));
        assert_eq!(doc.active_text(), "Short.");
        assert_eq!(doc.last_transform(), Some(TransformKind::Summarize));

        doc.revert();
        assert_eq!(doc.active_text(), "Original text.");
    }

    #[test]
    fn test_empty_processed_falls_back() {
        let mut doc = Document::new("notes.txt", "Original");
        doc.apply(TransformKind::Simplify, summary(""));
        assert_eq!(doc.active_text(), "Original");
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(Document::new("report.pdf", "x").export_file_name(), "report_processed.txt");
        assert_eq!(Document::new("a.tar.gz", "x").export_file_name(), "a.tar_processed.txt");
        assert_eq!(Document::new("README", "x").export_file_name(), "README_processed.txt");
    }

    #[test]
    fn test_export_writes_active_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = Document::new("scan.png", "Extracted");
        doc.apply(TransformKind::Translate, summary("Extrait"));

        let path = doc.export(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "scan_processed.txt");
        assert_eq!(fs::read_to_string(path).unwrap(), "Extrait");
    }

    #[test]
    fn test_export_empty_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Document::new("empty.txt", "  ").export(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "input_invalid");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letter.txt");
        fs::write(&path, "Dear reader").unwrap();
        let doc = Document::from_file(&path).unwrap();
        assert_eq!(doc.file_name(), "letter.txt");
        assert_eq!(doc.active_text(), "Dear reader");
        assert!(Document::from_file(&dir.path().join("missing.txt")).is_err());
    }
}
