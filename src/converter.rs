//! [`DocumentConverter`] backed by an external program, LibreOffice by default.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::ConverterConfig;
use crate::contract::{ConverterError, DocumentConverter};

/// How much of the child's stderr is kept in an error message.
const STDERR_TAIL: usize = 512;

pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    target_extension: String,
}

impl CommandConverter {
    /// `target_extension` fills `{ext}`, so the program writes the same
    /// extension the worker expects to find.
    pub fn new(config: &ConverterConfig, target_extension: &str) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            target_extension: target_extension.trim_start_matches('.').to_string(),
        }
    }

    /// Arguments for one invocation with placeholders filled in.
    pub fn render_args(&self, source: &Path, output: &Path) -> Vec<String> {
        let outdir = output.parent().unwrap_or_else(|| Path::new("."));
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &source.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{outdir}", &outdir.to_string_lossy())
                    .replace("{ext}", &self.target_extension)
            })
            .collect()
    }
}

#[async_trait]
impl DocumentConverter for CommandConverter {
    async fn convert(&self, source: &Path, output: &Path) -> Result<(), ConverterError> {
        let args = self.render_args(source, output);
        debug!(program = %self.program, ?args, "Spawning converter");

        // Dropping the future (client gone, timeout) kills the child.
        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                error!(error = ?e, program = %self.program, "Failed to launch converter");
                return Err(format!("failed to launch {}: {e}", self.program).into());
            }
        };

        if out.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&out.stderr);
        let tail: String = {
            let trimmed = stderr.trim();
            let skip = trimmed.chars().count().saturating_sub(STDERR_TAIL);
            trimmed.chars().skip(skip).collect()
        };
        Err(format!("{} exited with {}: {}", self.program, out.status, tail).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let converter = CommandConverter::new(&ConverterConfig::default(), "pdf");
        let args = converter.render_args(
            Path::new("/ws/uploads/0-report.docx"),
            Path::new("/ws/outputs/job-0000/0-report.pdf"),
        );
        assert!(args.contains(&"/ws/outputs/job-0000".to_string()));
        assert!(args.contains(&"/ws/uploads/0-report.docx".to_string()));
        assert!(args
            .iter()
            .any(|a| a == "-env:UserInstallation=file:///ws/outputs/job-0000/.lo-profile"));
        assert!(args.windows(2).any(|w| w == ["--convert-to", "pdf"]));
    }

    #[test]
    fn default_args_follow_the_target_extension() {
        let converter = CommandConverter::new(&ConverterConfig::default(), ".odt");
        let args = converter.render_args(
            Path::new("/ws/uploads/0-report.docx"),
            Path::new("/ws/outputs/job-0000/0-report.odt"),
        );
        assert!(args.windows(2).any(|w| w == ["--convert-to", "odt"]));
        assert!(!args.iter().any(|a| a.contains("pdf") || a.contains("{ext}")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copies_with_cp_and_reports_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.docx");
        let output = dir.path().join("in.pdf");
        std::fs::write(&source, b"body").unwrap();

        let cp = CommandConverter::new(
            &ConverterConfig {
                program: "cp".into(),
                args: vec!["{input}".into(), "{output}".into()],
            },
            "pdf",
        );
        cp.convert(&source, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"body");

        let missing = dir.path().join("missing.docx");
        let err = cp.convert(&missing, &output).await.unwrap_err();
        assert!(err.to_string().contains("cp exited with"));
    }

    #[tokio::test]
    async fn unknown_program_is_a_converter_error() {
        let converter = CommandConverter::new(
            &ConverterConfig {
                program: "definitely-not-a-real-converter-binary".into(),
                args: vec![],
            },
            "pdf",
        );
        let err = converter
            .convert(Path::new("a.docx"), Path::new("a.pdf"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to launch"));
    }
}
