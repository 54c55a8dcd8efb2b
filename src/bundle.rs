//! Bundle resolution: unpack one uploaded container into the workspace and
//! find every eligible document inside it, however deeply nested.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::batch::classify_name;
use crate::config::ConvertConfig;
use crate::contract::{FileKind, SourceFile};
use crate::error::PipelineError;
use crate::workspace::Workspace;

pub const NO_ELIGIBLE_DOCUMENTS: &str = "No eligible documents found.";
pub const UNREADABLE_CONTAINER: &str = "The uploaded container could not be read.";
pub const TOO_MANY_ENTRIES: &str = "The uploaded container has too many entries.";
pub const TOO_LARGE_EXTRACTED: &str = "The uploaded container is too large once extracted.";

/// Folder some archivers add for resource forks; never user content.
const METADATA_DIR: &str = "__MACOSX";

/// Extracts `bundle` below the workspace's extraction directory and returns the
/// documents found there, ordered by path.
///
/// The blocking task holds a workspace guard, so a dropped request cannot
/// remove the directory underneath it. The extracted tree is left in place for
/// workspace cleanup to remove.
pub async fn resolve_bundle(
    bundle: &SourceFile,
    workspace: &Workspace,
    config: &ConvertConfig,
) -> Result<Vec<SourceFile>, PipelineError> {
    let container = bundle.path.clone();
    let dest = workspace.extract_dir();
    let config = config.clone();
    let guard = workspace.guard();
    info!(
        container = %bundle.original_name,
        dest = %dest.display(),
        "Resolving bundle"
    );

    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let extracted = extract_container(&container, &dest, &config)?;
        let documents = discover_documents(&dest, &config);
        info!(
            extracted,
            documents = documents.len(),
            "Bundle extracted"
        );
        if documents.is_empty() {
            return Err(PipelineError::validation(NO_ELIGIBLE_DOCUMENTS));
        }
        Ok(documents)
    })
    .await?
}

fn malformed(e: impl std::fmt::Display, what: &str) -> PipelineError {
    warn!(error = %e, "{what}");
    PipelineError::validation(UNREADABLE_CONTAINER)
}

/// Unpacks a zip container into `dest`, whose parent must exist.
///
/// Entries that would land outside `dest` are skipped. Entry count and total
/// extracted bytes are capped by `config`; a container over either cap, or
/// one whose paths contradict each other (a file where a folder should be),
/// is rejected as a validation error. Returns the number of files written.
pub fn extract_container(
    container: &Path,
    dest: &Path,
    config: &ConvertConfig,
) -> Result<usize, PipelineError> {
    let reader = BufReader::new(File::open(container)?);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| malformed(e, "Container is not a readable archive"))?;
    if archive.len() > config.max_container_entries {
        warn!(
            entries = archive.len(),
            limit = config.max_container_entries,
            "Container exceeds entry limit"
        );
        return Err(PipelineError::validation(TOO_MANY_ENTRIES));
    }

    match fs::create_dir(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dest.is_dir() => {}
        Err(e) => return Err(e.into()),
    }

    let mut budget = config.max_extracted_bytes;
    let mut extracted = 0;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| malformed(e, "Corrupt container entry"))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(name = %entry.name(), "Skipping container entry outside extraction root");
            continue;
        };
        if relative.components().any(|c| c.as_os_str() == METADATA_DIR) {
            continue;
        }
        // Stop instead of recreating a workspace that has gone away.
        if !dest.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("extraction root {} disappeared", dest.display()),
            )
            .into());
        }
        if let Some(conflict) = path_conflict(dest, &relative, entry.is_dir()) {
            return Err(malformed(conflict.display(), "Container paths conflict"));
        }

        let dest_path = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest_path)?;
        // One byte over the budget is enough to know the cap was exceeded.
        let written = io::copy(&mut entry.take(budget.saturating_add(1)), &mut out)?;
        if written > budget {
            warn!(
                limit = config.max_extracted_bytes,
                path = %relative.display(),
                "Container exceeds extracted size limit"
            );
            return Err(PipelineError::validation(TOO_LARGE_EXTRACTED));
        }
        budget -= written;
        debug!(path = %relative.display(), bytes = written, "Extracted entry");
        extracted += 1;
    }
    Ok(extracted)
}

/// First path below `dest` that already exists with the wrong type for
/// `relative`: an ancestor that is a file, or a file entry that is a folder.
fn path_conflict(dest: &Path, relative: &Path, is_dir: bool) -> Option<PathBuf> {
    let mut ancestors: Vec<&Path> = relative
        .ancestors()
        .skip(1)
        .filter(|a| !a.as_os_str().is_empty())
        .collect();
    ancestors.reverse();
    if let Some(file) = ancestors
        .into_iter()
        .map(|a| dest.join(a))
        .find(|p| p.is_file())
    {
        return Some(file);
    }
    let target = dest.join(relative);
    let wrong_type = if is_dir { target.is_file() } else { target.is_dir() };
    wrong_type.then_some(target)
}

/// Walks `root` recursively and keeps files whose extension is a configured
/// source extension. Everything else is ignored.
pub fn discover_documents(root: &Path, config: &ConvertConfig) -> Vec<SourceFile> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path during discovery");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if classify_name(&name, config) != FileKind::Document {
            debug!(path = %entry.path().display(), "Ignoring non-document");
            continue;
        }
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        documents.push(SourceFile {
            path: PathBuf::from(entry.path()),
            original_name: name,
            size_bytes,
            kind: FileKind::Document,
        });
    }
    documents
}
