//! Command-line interface: run the HTTP service, or convert local files
//! straight into an archive through the same pipeline.

use crate::converter::CommandConverter;
use crate::load_config::load_config;
use crate::pipeline::run_request;
use crate::server;
use crate::staging::stage_local_file;
use crate::workspace::Workspace;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for batch-convert: convert document batches into one archive.
#[derive(Parser)]
#[clap(
    name = "batch-convert",
    version,
    about = "Convert batches of documents (loose files or one zip bundle) and package the results"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve POST /convert over HTTP
    Serve {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Convert local files (documents, or a single zip bundle) into an archive
    Convert {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Where to write the resulting archive
        #[clap(long, short)]
        output: PathBuf,
        /// Documents to convert, or exactly one zip bundle
        #[clap(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { config } => {
            let config = load_config(config.as_deref())?;
            tracing::info!(command = "serve", "Starting HTTP service");
            let converter = Arc::new(CommandConverter::new(
                &config.convert.converter,
                &config.convert.target_extension,
            ));
            server::serve(config, converter).await
        }
        Commands::Convert {
            config,
            output,
            inputs,
        } => {
            let config = load_config(config.as_deref())?;
            tracing::info!(command = "convert", inputs = inputs.len(), "Starting conversion");
            println!("Conversion starting...");

            let converter =
                CommandConverter::new(&config.convert.converter, &config.convert.target_extension);
            let workspace = Workspace::create(&config.convert.workspace_root)
                .context("Failed to create workspace")?;

            let mut entries = Vec::with_capacity(inputs.len());
            for (index, input) in inputs.iter().enumerate() {
                match stage_local_file(&workspace, index, input).await {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        workspace.cleanup().await;
                        return Err(anyhow::anyhow!("Failed to read input {:?}: {e}", input));
                    }
                }
            }

            match run_request(&config.convert, &converter, workspace, entries).await {
                Ok((report, archive)) => {
                    tokio::fs::write(&output, &archive)
                        .await
                        .with_context(|| format!("Failed to write archive to {:?}", output))?;
                    tracing::info!(command = "convert", ?report, "Conversion complete");
                    println!("Conversion complete: {}.", report.summary());
                    println!("Archive written to {}", output.display());
                    for failure in &report.failures {
                        eprintln!("[FAILED] {}: {}", failure.source, failure.reason);
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "convert", error = %e, "Conversion failed");
                    eprintln!("[ERROR] Conversion failed: {e}");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
