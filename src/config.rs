use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Top-level configuration: the HTTP surface plus the conversion pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub convert: ConvertConfig,
}

impl AppConfig {
    pub fn trace_loaded(&self) {
        info!(
            listen = %self.server.listen,
            max_upload_bytes = self.server.max_upload_bytes,
            "Loaded server config"
        );
        self.convert.trace_loaded();
        debug!(?self, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Upper bound for a whole multipart request body.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

/// How a batch is turned into an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Extension of converted outputs, without the dot.
    pub target_extension: String,
    /// Extensions (case-insensitive, no dot) treated as convertible documents.
    pub source_extensions: Vec<String>,
    /// Extensions treated as containers to unpack.
    pub container_extensions: Vec<String>,
    /// Ceiling on simultaneously running conversions within one request.
    pub max_concurrency: usize,
    /// Per-document time limit; `0` means no limit.
    pub conversion_timeout_secs: u64,
    /// Upper bound on entries in an uploaded container.
    pub max_container_entries: usize,
    /// Upper bound on the total bytes a container may extract to.
    pub max_extracted_bytes: u64,
    pub include_failure_manifest: bool,
    pub manifest_name: String,
    /// File name offered to the client for the result archive.
    pub archive_name: String,
    /// Parent directory under which request workspaces are created.
    pub workspace_root: PathBuf,
    pub converter: ConverterConfig,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            target_extension: "pdf".to_string(),
            source_extensions: vec!["docx".to_string(), "doc".to_string()],
            container_extensions: vec!["zip".to_string()],
            max_concurrency: 4,
            conversion_timeout_secs: 120,
            max_container_entries: 10_000,
            max_extracted_bytes: 1024 * 1024 * 1024,
            include_failure_manifest: true,
            manifest_name: "conversion_failures.json".to_string(),
            archive_name: "converted_files.zip".to_string(),
            workspace_root: std::env::temp_dir(),
            converter: ConverterConfig::default(),
        }
    }
}

impl ConvertConfig {
    pub fn conversion_timeout(&self) -> Option<Duration> {
        (self.conversion_timeout_secs > 0).then(|| Duration::from_secs(self.conversion_timeout_secs))
    }

    pub fn is_source_extension(&self, ext: &str) -> bool {
        self.source_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn is_container_extension(&self, ext: &str) -> bool {
        self.container_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn trace_loaded(&self) {
        info!(
            target_extension = %self.target_extension,
            source_extensions = ?self.source_extensions,
            max_concurrency = self.max_concurrency,
            timeout_secs = self.conversion_timeout_secs,
            workspace_root = %self.workspace_root.display(),
            converter = %self.converter.program,
            "Loaded conversion config"
        );
    }
}

/// External program invocation. `{input}`, `{output}`, `{outdir}` and `{ext}`
/// (the target extension) in `args` are replaced per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "soffice".to_string(),
            args: [
                "-env:UserInstallation=file://{outdir}/.lo-profile",
                "--headless",
                "--norestore",
                "--convert-to",
                "{ext}",
                "--outdir",
                "{outdir}",
                "{input}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}
