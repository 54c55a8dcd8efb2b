//! Upload staging: writes incoming files into the request workspace and
//! reports them as [`UploadedEntry`] values for the pipeline.
//!
//! Staged names are `<index>-<sanitised original name>`, so duplicate client
//! names within one request land in different files and nothing a client
//! sends can point outside `uploads/`.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::contract::UploadedEntry;
use crate::workspace::Workspace;

const FALLBACK_NAME: &str = "upload";

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._ -]").expect("static regex is valid"))
}

/// Reduces a client-supplied name to a safe single path component.
pub fn sanitize_file_name(original: &str) -> String {
    // Clients may send either separator regardless of our platform.
    let last = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = unsafe_chars().replace_all(last, "_");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// The final path component of a client-supplied name, used as the
/// `original_name` the rest of the pipeline sees.
pub fn display_name(original: &str) -> String {
    let last = original.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if last.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        last.to_string()
    }
}

/// A file being written chunk by chunk into the workspace.
pub struct StagedUpload {
    file: File,
    entry: UploadedEntry,
}

impl StagedUpload {
    pub async fn create(
        workspace: &Workspace,
        index: usize,
        original_name: &str,
        mime_type: Option<String>,
    ) -> std::io::Result<Self> {
        let path = workspace.uploads_dir().join(format!("{index}-{}", sanitize_file_name(original_name)));
        let file = File::create(&path).await?;
        Ok(Self {
            file,
            entry: UploadedEntry {
                path,
                original_name: display_name(original_name),
                mime_type,
                size_bytes: 0,
            },
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await?;
        self.entry.size_bytes += chunk.len() as u64;
        Ok(())
    }

    pub async fn finish(mut self) -> std::io::Result<UploadedEntry> {
        self.file.flush().await?;
        debug!(
            path = %self.entry.path.display(),
            original_name = %self.entry.original_name,
            size = self.entry.size_bytes,
            "Staged upload"
        );
        Ok(self.entry)
    }
}

/// Copies a local file into the workspace, as the CLI does for its inputs.
pub async fn stage_local_file(
    workspace: &Workspace,
    index: usize,
    source: &Path,
) -> std::io::Result<UploadedEntry> {
    let original_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let path = workspace.uploads_dir().join(format!("{index}-{}", sanitize_file_name(&original_name)));
    let size_bytes = tokio::fs::copy(source, &path).await?;
    debug!(source = %source.display(), path = %path.display(), size = size_bytes, "Staged local file");
    Ok(UploadedEntry {
        path,
        original_name,
        mime_type: None,
        size_bytes,
    })
}
