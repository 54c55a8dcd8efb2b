#![doc = "batch-convert: convert uploaded document batches and package the results as one archive."]

//! A request is either a set of loose documents or a single zip bundle. Every
//! eligible document becomes a job, jobs run through an external converter
//! under a concurrency ceiling, and all successful outputs (plus a manifest of
//! failures) are packed into one archive. Each request works in its own
//! workspace, which is removed whatever the outcome.
//!
//! Entry points: [`pipeline::convert_batch`] / [`pipeline::run_request`] for
//! library use, [`server::router`] for the HTTP surface, [`cli::run`] for the
//! binary.

pub mod archive;
pub mod batch;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod contract;
pub mod converter;
pub mod error;
pub mod jobs;
pub mod load_config;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod staging;
pub mod worker;
pub mod workspace;
