//! Request-scoped temporary storage.
//!
//! Every request gets one [`Workspace`]: a fresh directory under the configured
//! root, named after a generated request id. Uploads, extracted bundles,
//! per-job outputs and the final archive all live beneath it, so two requests
//! can never touch each other's files, even with identical upload names.
//!
//! The directory is owned by a shared root. It is removed once the last holder
//! lets go: [`Workspace::cleanup`] on the normal path, or the drop of the
//! final [`WorkspaceGuard`] when blocking work (extraction, archiving) outlives
//! a cancelled request. Removal failures are logged and swallowed.
//!
//! The `uploads`, `extracted` and `outputs` directories are created up front,
//! and nothing below the workspace creates missing ancestors, so late writers
//! fail instead of recreating a removed workspace.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CleanupError;

pub const UPLOADS_DIR: &str = "uploads";
pub const EXTRACT_DIR: &str = "extracted";
pub const OUTPUTS_DIR: &str = "outputs";

#[derive(Debug)]
struct WorkspaceRoot {
    request_id: Uuid,
    dir: Option<TempDir>,
}

impl Drop for WorkspaceRoot {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let request_id = self.request_id;
        debug!(%request_id, "Workspace released without explicit cleanup");
        // Recursive removal blocks; keep it off the async workers when we can.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || report_removal(request_id, try_remove(dir)));
            }
            Err(_) => report_removal(request_id, try_remove(dir)),
        }
    }
}

/// Keeps the workspace directory alive while blocking work runs inside it.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    _root: Arc<WorkspaceRoot>,
}

#[derive(Debug)]
pub struct Workspace {
    request_id: Uuid,
    path: PathBuf,
    root: Arc<WorkspaceRoot>,
}

impl Workspace {
    /// Creates a new workspace under `root` (created if missing).
    pub fn create(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let request_id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("batch-convert-{request_id}-"))
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        for sub in [UPLOADS_DIR, EXTRACT_DIR, OUTPUTS_DIR] {
            std::fs::create_dir(path.join(sub))?;
        }
        debug!(%request_id, path = %path.display(), "Created request workspace");
        Ok(Self {
            request_id,
            path,
            root: Arc::new(WorkspaceRoot {
                request_id,
                dir: Some(dir),
            }),
        })
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.path.join(UPLOADS_DIR)
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.path.join(EXTRACT_DIR)
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.path.join(OUTPUTS_DIR)
    }

    /// Output directory reserved for a single job. Not created here.
    pub fn job_dir(&self, job_id: usize) -> PathBuf {
        self.outputs_dir().join(format!("job-{job_id:04}"))
    }

    /// A handle to move into blocking tasks. The directory outlives every
    /// guard, even if the request itself is dropped first.
    pub fn guard(&self) -> WorkspaceGuard {
        WorkspaceGuard {
            _root: Arc::clone(&self.root),
        }
    }

    /// Removes the workspace and everything in it. Never fails; problems are
    /// logged. If a guard is still held, removal happens when it is dropped.
    pub async fn cleanup(self) {
        let request_id = self.request_id;
        let mut root = match Arc::try_unwrap(self.root) {
            Ok(root) => root,
            Err(_) => {
                debug!(%request_id, "Workspace still in use; removal deferred to last holder");
                return;
            }
        };
        let Some(dir) = root.dir.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || try_remove(dir)).await {
            Ok(result) => report_removal(request_id, result),
            Err(e) => warn!(%request_id, error = %e, "Workspace cleanup task failed"),
        }
    }
}

fn report_removal(request_id: Uuid, result: Result<(), CleanupError>) {
    match result {
        Ok(()) => info!(%request_id, "Workspace removed"),
        Err(e) => warn!(%request_id, error = %e, "Workspace cleanup failed"),
    }
}

fn try_remove(dir: TempDir) -> Result<(), CleanupError> {
    let path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => Ok(()),
        // Someone beat us to it; the goal is reached.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanupError { path, source }),
    }
}
