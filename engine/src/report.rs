//! Report aggregation: per-outcome counts, progress logging, and the
//! rerun-file mechanism.
//!
//! The reporter is the single collector for a batch. It is driven from the
//! executor's collecting thread, so outcomes arrive in completion order and
//! no internal locking is needed; the channel between workers and collector
//! provides the mutual exclusion for counters and file appends.
//!
//! Artifacts are colocated with the input file: a progress log appended per
//! completed job, a rerun file holding failed commands verbatim (valid
//! input for a subsequent run), an error log with the extracted message
//! fragments, and a skipped-lines file when the source rejected input
//! lines.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rasterload_core::{InvalidLine, Job, Outcome, OutcomeKind, RunSummary, SummaryError};
use tracing::{error, info, warn};

/// Errors raised while producing batch artifacts or closing the books.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Artifact file could not be created or written.
    #[error("failed to write report artifact: {0}")]
    Io(#[from] std::io::Error),

    /// Accounting defect: counts do not reconcile. This is an engine bug,
    /// distinct from any job failure.
    #[error(transparent)]
    Defect(#[from] SummaryError),
}

/// Locations of the per-batch artifacts.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use rasterload_engine::report::ArtifactPaths;
///
/// let paths = ArtifactPaths::for_input(Path::new("/data/batch/commands.txt"));
/// assert!(paths.rerun.ends_with("commands.rerun.txt"));
/// assert!(paths.progress_log.ends_with("commands.log"));
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    /// Progress log, appended per completed job.
    pub progress_log: PathBuf,
    /// Failed commands verbatim, in original submission order.
    pub rerun: PathBuf,
    /// Message fragments of failed jobs.
    pub errors: PathBuf,
    /// Invalid input lines, when any were skipped.
    pub skipped: PathBuf,
}

impl ArtifactPaths {
    /// Derives artifact paths colocated with the input file.
    pub fn for_input(input: &Path) -> Self {
        let dir = input.parent().unwrap_or_else(|| Path::new("."));
        let stem = input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("batch");
        Self {
            progress_log: dir.join(format!("{stem}.log")),
            rerun: dir.join(format!("{stem}.rerun.txt")),
            errors: dir.join(format!("{stem}.errors.log")),
            skipped: dir.join(format!("{stem}.skipped.txt")),
        }
    }

    /// Same layout rooted in an explicit directory.
    pub fn in_dir(dir: &Path, stem: &str) -> Self {
        Self::for_input(&dir.join(format!("{stem}.txt")))
    }
}

/// Stateful per-batch aggregator.
///
/// Feed it every `(Job, Outcome)` pair the executor emits, then call
/// [`finalize`](Reporter::finalize) to reconcile counts and obtain the
/// [`RunSummary`].
pub struct Reporter {
    paths: ArtifactPaths,
    summary: RunSummary,
    failed: Vec<Job>,
    progress_log: File,
    rerun_log: Option<File>,
    errors_log: Option<File>,
    started: Instant,
}

impl Reporter {
    /// Creates the aggregator for a batch of `total` submitted jobs,
    /// writing the skipped-lines artifact up front when the source rejected
    /// any input.
    pub fn create(
        paths: ArtifactPaths,
        total: usize,
        invalid: &[InvalidLine],
    ) -> Result<Self, ReportError> {
        let progress_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&paths.progress_log)?;

        // Stale artifacts from a previous run of the same input must not
        // leak into this batch's results.
        for stale in [&paths.rerun, &paths.errors] {
            if stale.exists() {
                fs::remove_file(stale)?;
            }
        }

        if invalid.is_empty() {
            if paths.skipped.exists() {
                fs::remove_file(&paths.skipped)?;
            }
        } else {
            let mut out = String::new();
            for line in invalid {
                out.push_str(&format!(
                    "line {} [{}]: {}\n",
                    line.line_number, line.reason, line.text
                ));
            }
            fs::write(&paths.skipped, out)?;
        }

        let mut summary = RunSummary::new(total);
        summary.invalid_lines = invalid.len();

        Ok(Self {
            paths,
            summary,
            failed: Vec::new(),
            progress_log,
            rerun_log: None,
            errors_log: None,
            started: Instant::now(),
        })
    }

    /// Records one completed job: bumps the counter, appends a progress
    /// line, and routes `Error` outcomes to the rerun and error artifacts.
    pub fn record(&mut self, job: &Job, outcome: &Outcome) -> Result<(), ReportError> {
        self.summary.count(outcome.kind);

        let timestamp = Utc::now().to_rfc3339();
        let fragment = outcome.message.as_deref().unwrap_or_default();
        match outcome.kind {
            OutcomeKind::Success => {
                info!(label = %outcome.label, "job succeeded");
                writeln!(self.progress_log, "[{timestamp}] {}: success", outcome.label)?;
            }
            OutcomeKind::Warning => {
                warn!(label = %outcome.label, fragment, "job completed with warning");
                writeln!(
                    self.progress_log,
                    "[{timestamp}] {}: warning: {fragment}",
                    outcome.label
                )?;
            }
            OutcomeKind::Error => {
                error!(label = %outcome.label, fragment, "job failed");
                writeln!(
                    self.progress_log,
                    "[{timestamp}] {}: error: {fragment}",
                    outcome.label
                )?;

                if self.errors_log.is_none() {
                    let file = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&self.paths.errors)?;
                    self.errors_log = Some(file);
                }
                if let Some(errors_log) = self.errors_log.as_mut() {
                    writeln!(errors_log, "{}: {fragment}", outcome.label)?;
                }

                // Appended in completion order so a partial artifact exists
                // even if the batch dies; finalize rewrites it in original
                // submission order.
                if self.rerun_log.is_none() {
                    let file = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&self.paths.rerun)?;
                    self.rerun_log = Some(file);
                }
                if let Some(rerun_log) = self.rerun_log.as_mut() {
                    writeln!(rerun_log, "{}", job.command)?;
                }

                self.failed.push(job.clone());
            }
        }

        Ok(())
    }

    /// Progress counts so far: `(recorded, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.summary.recorded(), self.summary.total)
    }

    /// Closes the batch: writes the rerun file (failed commands verbatim,
    /// restored to original submission order), checks the reconciliation
    /// invariant, and returns the summary.
    ///
    /// # Errors
    ///
    /// [`ReportError::Defect`] when `success + warning + error != total`,
    /// which indicates a classifier or executor bug rather than a job
    /// failure.
    pub fn finalize(mut self) -> Result<RunSummary, ReportError> {
        drop(self.rerun_log.take());
        if self.failed.is_empty() {
            // An empty rerun file would be a valid (no-op) input, but its
            // absence is the clearer signal that nothing failed.
            if self.paths.rerun.exists() {
                fs::remove_file(&self.paths.rerun)?;
            }
        } else {
            self.failed.sort_by_key(|job| job.index);
            let mut out = String::new();
            for job in &self.failed {
                out.push_str(&job.command);
                out.push('\n');
            }
            fs::write(&self.paths.rerun, out)?;
        }

        self.summary.set_elapsed(self.started.elapsed());
        self.summary.reconcile()?;

        let timestamp = Utc::now().to_rfc3339();
        writeln!(
            self.progress_log,
            "[{timestamp}] batch complete: {} total, {} success, {} warning, {} error, {} skipped line(s)",
            self.summary.total,
            self.summary.success,
            self.summary.warning,
            self.summary.error,
            self.summary.invalid_lines,
        )?;

        Ok(self.summary)
    }
}
