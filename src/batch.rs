//! Turns the staged entries of one request into an [`UploadBatch`]:
//! either loose documents or exactly one container, never both.

use std::path::Path;

use tracing::{debug, info};

use crate::config::ConvertConfig;
use crate::contract::{FileKind, SourceFile, UploadedEntry};
use crate::error::PipelineError;

pub const NO_FILES_UPLOADED: &str = "No files were uploaded.";
pub const MIXED_SUBMISSION: &str = "Submit either one container or loose documents, not both.";

const ZIP_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-zip",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadBatch {
    /// Loose uploads. Unsupported entries are kept here and skipped when the
    /// job set is built.
    Loose(Vec<SourceFile>),
    /// A single compressed bundle to unpack.
    Bundle(SourceFile),
}

impl UploadBatch {
    pub fn classify(
        entries: Vec<UploadedEntry>,
        config: &ConvertConfig,
    ) -> Result<UploadBatch, PipelineError> {
        if entries.is_empty() {
            return Err(PipelineError::validation(NO_FILES_UPLOADED));
        }

        let total = entries.len();
        let files: Vec<SourceFile> = entries
            .into_iter()
            .map(|entry| {
                let kind = classify_entry(&entry, config);
                debug!(name = %entry.original_name, ?kind, "Classified upload");
                SourceFile::from_entry(entry, kind)
            })
            .collect();

        let containers = files
            .iter()
            .filter(|f| f.kind == FileKind::Container)
            .count();

        match (containers, total) {
            (0, _) => {
                info!(files = total, "Received loose documents");
                Ok(UploadBatch::Loose(files))
            }
            (1, 1) => {
                let mut files = files;
                let bundle = files.swap_remove(0);
                info!(name = %bundle.original_name, "Received container");
                Ok(UploadBatch::Bundle(bundle))
            }
            _ => Err(PipelineError::validation(MIXED_SUBMISSION)),
        }
    }
}

/// Decides what an uploaded entry is. The MIME type only ever promotes an
/// entry to a container; documents are recognised by extension.
pub fn classify_entry(entry: &UploadedEntry, config: &ConvertConfig) -> FileKind {
    let zip_mime = entry
        .mime_type
        .as_deref()
        .map(|m| ZIP_MIME_TYPES.iter().any(|z| m.eq_ignore_ascii_case(z)))
        .unwrap_or(false);
    if zip_mime {
        return FileKind::Container;
    }
    classify_name(&entry.original_name, config)
}

/// Extension-based classification, case-insensitive.
pub fn classify_name(name: &str, config: &ConvertConfig) -> FileKind {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) if config.is_container_extension(ext) => FileKind::Container,
        Some(ext) if config.is_source_extension(ext) => FileKind::Document,
        _ => FileKind::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(name: &str, mime: Option<&str>) -> UploadedEntry {
        UploadedEntry {
            path: PathBuf::from(format!("/ws/uploads/{name}")),
            original_name: name.to_string(),
            mime_type: mime.map(str::to_string),
            size_bytes: 1,
        }
    }

    #[test]
    fn empty_submission_is_rejected() {
        let err = UploadBatch::classify(vec![], &ConvertConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), NO_FILES_UPLOADED);
    }

    #[test]
    fn single_zip_becomes_a_bundle() {
        let config = ConvertConfig::default();
        let batch = UploadBatch::classify(vec![entry("bundle.ZIP", None)], &config).unwrap();
        assert!(matches!(batch, UploadBatch::Bundle(ref f) if f.original_name == "bundle.ZIP"));

        let by_mime =
            UploadBatch::classify(vec![entry("upload.bin", Some("application/zip"))], &config)
                .unwrap();
        assert!(matches!(by_mime, UploadBatch::Bundle(_)));
    }

    #[test]
    fn container_mixed_with_documents_is_rejected() {
        let config = ConvertConfig::default();
        let err = UploadBatch::classify(
            vec![entry("bundle.zip", None), entry("report.docx", None)],
            &config,
        )
        .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), MIXED_SUBMISSION);

        let two_bundles = UploadBatch::classify(
            vec![entry("a.zip", None), entry("b.zip", None)],
            &config,
        );
        assert!(two_bundles.unwrap_err().is_validation());
    }

    #[test]
    fn loose_uploads_keep_their_kind() {
        let config = ConvertConfig::default();
        let batch = UploadBatch::classify(
            vec![entry("Report.DOCX", None), entry("notes.txt", None)],
            &config,
        )
        .unwrap();
        let UploadBatch::Loose(files) = batch else {
            panic!("expected loose batch");
        };
        assert_eq!(files[0].kind, FileKind::Document);
        assert_eq!(files[1].kind, FileKind::Unsupported);
    }
}
