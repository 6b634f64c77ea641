//! Batch execution of external raster-loading commands.
//!
//! This crate is the engine behind the `rasterload` tool: it reads a batch
//! of external commands (one `raster2pgsql … | psql …` pipeline per line,
//! or jobs built programmatically from raster paths), runs them on a
//! bounded worker pool, classifies each job's free-text output into
//! `Success`/`Warning`/`Error`, and writes the artifacts an operator needs
//! to resubmit only the failed subset.
//!
//! # Components
//!
//! - [`source`] — turns input files and path lists into [`Job`]s, routing
//!   malformed lines to [`InvalidLine`]s.
//! - [`classify`] — ordered keyword classification of raw process output.
//! - [`executor`] — the rayon-backed worker pool with a per-job error
//!   boundary.
//! - [`report`] — the per-batch aggregator: counts, progress log, error
//!   log, and the rerun file.
//! - [`output`] — JSON/YAML/table rendering of [`RunSummary`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use rasterload_engine::{BatchOptions, run_batch};
//!
//! let options = BatchOptions::default();
//! let summary = run_batch(Path::new("commands.txt"), &options).unwrap();
//! println!("{} of {} jobs failed", summary.error, summary.total);
//! ```
//!
//! [`Job`]: rasterload_core::Job
//! [`InvalidLine`]: rasterload_core::InvalidLine
//! [`RunSummary`]: rasterload_core::RunSummary

pub mod classify;
pub mod executor;
pub mod output;
pub mod report;
pub mod source;

use std::path::Path;
use std::time::Duration;

use rasterload_core::{Job, RunSummary};

use classify::{Classifier, ClassifierConfig};
use executor::{CommandRunner, Executor, JobRunner};
use report::{ArtifactPaths, Reporter};
use source::{ParsedBatch, SourceConfig, SourceError};

/// Errors from a whole-batch invocation.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Fatal setup error; no job was executed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Artifact or accounting failure from the report aggregator.
    #[error(transparent)]
    Report(#[from] report::ReportError),
}

/// Options for one batch invocation.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Command-file parsing rules.
    pub source: SourceConfig,
    /// Classification keyword list and policy.
    pub classifier: ClassifierConfig,
    /// Worker pool bound; `None` = available CPUs.
    pub max_parallelism: Option<usize>,
    /// Optional per-command timeout; `None` = wait indefinitely.
    pub timeout: Option<Duration>,
}

/// Parses a command file and executes the whole batch with the production
/// command runner, writing artifacts next to the input file.
///
/// # Errors
///
/// [`BatchError::Source`] when the input cannot be read (fatal, reported
/// once); [`BatchError::Report`] when artifacts cannot be written or the
/// outcome counts fail to reconcile.
pub fn run_batch(input: &Path, options: &BatchOptions) -> Result<RunSummary, BatchError> {
    let batch = source::parse(input, &options.source)?;
    if batch.jobs.is_empty() {
        return Err(SourceError::EmptyBatch(input.display().to_string()).into());
    }
    let runner = CommandRunner::with_timeout(options.timeout);
    run_parsed_batch(&batch, ArtifactPaths::for_input(input), options, &runner)
}

/// Executes an already-parsed batch with a caller-supplied runner.
///
/// This is the seam the integration tests use to substitute stub runners
/// for real external processes.
pub fn run_parsed_batch<R: JobRunner>(
    batch: &ParsedBatch,
    paths: ArtifactPaths,
    options: &BatchOptions,
    runner: &R,
) -> Result<RunSummary, BatchError> {
    let mut reporter = Reporter::create(paths, batch.jobs.len(), &batch.invalid)?;
    let executor = Executor::new(
        Classifier::new(options.classifier.clone()),
        options.max_parallelism,
    );

    let mut record_error: Option<report::ReportError> = None;
    executor.run(&batch.jobs, runner, |job: Job, outcome| {
        if record_error.is_none() {
            if let Err(err) = reporter.record(&job, &outcome) {
                record_error = Some(err);
            }
        }
    });
    if let Some(err) = record_error {
        return Err(err.into());
    }

    Ok(reporter.finalize()?)
}
