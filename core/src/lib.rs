//! Core types for the rasterload batch execution engine.
//!
//! This crate defines the data model shared by the engine and the CLI:
//!
//! - [`Job`] — one external-command unit of work with its label and
//!   original command text.
//! - [`JobResult`] — the raw capture of one execution (stdout, stderr, exit
//!   code, elapsed time).
//! - [`Outcome`] / [`OutcomeKind`] — the classified result of a job
//!   (`Success`, `Warning`, or `Error`) with an optional message fragment.
//! - [`InvalidLine`] — an input line that was skipped rather than submitted.
//! - [`RunSummary`] — per-batch totals with the reconciliation invariant
//!   `success + warning + error == total`.
//! - [`LoadParams`] — fixed per-batch loader parameters (SRID, tile size,
//!   target table, connection settings) used when jobs are built
//!   programmatically instead of parsed from a command file.
//!
//! Validation ([`validate_load_params`]) catches bad batch parameters before
//! any job is constructed.
//!
//! # Example
//!
//! ```
//! use rasterload_core::*;
//!
//! let job = Job::new(0, "n38w077", "raster2pgsql -s 4326 n38w077.tif elev.dem");
//! let outcome = Outcome::success(&job);
//! assert_eq!(outcome.kind, OutcomeKind::Success);
//! assert!(outcome.message.is_none());
//! ```

mod params;
mod summary;
mod types;

pub use params::{ConnectionParams, LoadParams, ParamError, validate_load_params};
pub use summary::{RunSummary, SummaryError};
pub use types::{InvalidLine, InvalidReason, Job, JobResult, Outcome, OutcomeKind};
