//! Job, result, and outcome type definitions for batch runs.
//!
//! This module defines the data model carried through one batch: jobs flow
//! from the command source into the executor, their raw captures come back
//! as [`JobResult`]s, and the classifier reduces each to exactly one
//! [`Outcome`]. All types serialize with [`serde`] so summaries and reports
//! round-trip through JSON and YAML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One external-command unit of work.
///
/// A job is immutable after construction. Its identity is its position in
/// the input sequence (`index`); the `command` field keeps the original
/// command text verbatim so a failed job can be written back to a rerun
/// file unchanged.
///
/// # Examples
///
/// ```
/// use rasterload_core::Job;
///
/// let job = Job::new(3, "n41w090", "raster2pgsql -s 4326 n41w090.tif elev.dem");
/// assert_eq!(job.index, 3);
/// assert_eq!(job.label, "n41w090");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Position in the input sequence (0-based).
    pub index: usize,
    /// Human-readable label used in log messages, typically a file stem.
    pub label: String,
    /// Original command text, preserved verbatim for rerun files.
    pub command: String,
}

impl Job {
    /// Creates a job from its index, label, and command text.
    pub fn new(index: usize, label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
            command: command.into(),
        }
    }
}

/// Raw capture of one job execution.
///
/// Owned by the worker that produced it until handed to the classifier;
/// never mutated after capture. `exit_code` is `None` when the process was
/// terminated by a signal or could not be launched at all, in which case
/// `launch_error` carries the spawn failure text.
#[derive(Debug, Clone, Default)]
pub struct JobResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code; `None` on signal termination or launch failure.
    pub exit_code: Option<i32>,
    /// Wall-clock time spent waiting on the process.
    pub elapsed: Duration,
    /// Description of a spawn failure, when the process never started.
    pub launch_error: Option<String>,
}

impl JobResult {
    /// Returns `true` when the process ran and exited with code 0.
    pub fn exited_ok(&self) -> bool {
        self.launch_error.is_none() && self.exit_code == Some(0)
    }
}

/// Classification of a [`JobResult`].
///
/// # Examples
///
/// ```
/// use rasterload_core::OutcomeKind;
///
/// assert_eq!(OutcomeKind::Warning.to_string(), "warning");
/// let json = serde_json::to_string(&OutcomeKind::Error).unwrap();
/// assert_eq!(json, "\"error\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Process exited 0 and no heuristic matched.
    Success,
    /// Process exited 0 but its output matched the warning heuristic.
    Warning,
    /// Non-zero exit, failure keyword match, or the process never started.
    Error,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Classified result of running one job.
///
/// Every job submitted to the executor produces exactly one outcome, even
/// when the external process could not be started. The `message` fragment
/// is present only for `Warning` and `Error` kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Label of the originating job.
    pub label: String,
    /// Classified kind.
    pub kind: OutcomeKind,
    /// Extracted message fragment for `Warning`/`Error` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Outcome {
    /// Creates a `Success` outcome for a job.
    pub fn success(job: &Job) -> Self {
        Self {
            label: job.label.clone(),
            kind: OutcomeKind::Success,
            message: None,
        }
    }

    /// Creates a `Warning` outcome carrying an isolated warning fragment.
    pub fn warning(job: &Job, message: impl Into<String>) -> Self {
        Self {
            label: job.label.clone(),
            kind: OutcomeKind::Warning,
            message: Some(message.into()),
        }
    }

    /// Creates an `Error` outcome carrying a message fragment.
    pub fn error(job: &Job, message: impl Into<String>) -> Self {
        Self {
            label: job.label.clone(),
            kind: OutcomeKind::Error,
            message: Some(message.into()),
        }
    }
}

/// Why an input line was skipped instead of becoming a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Line was empty or whitespace-only.
    Empty,
    /// Line contained the placeholder marker for an undeterminable value.
    Placeholder,
    /// Line did not begin with an expected command token.
    UnexpectedCommand,
    /// Record had too few fields or a field failed to parse.
    MalformedRecord,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Placeholder => write!(f, "placeholder"),
            Self::UnexpectedCommand => write!(f, "unexpected_command"),
            Self::MalformedRecord => write!(f, "malformed_record"),
        }
    }
}

/// An input line that was rejected by the command source.
///
/// Invalid lines are never submitted as jobs; they are recorded in input
/// order so the operator can inspect and fix the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidLine {
    /// 1-based line number in the input file.
    pub line_number: usize,
    /// Raw line text.
    pub text: String,
    /// Why the line was rejected.
    pub reason: InvalidReason,
}

impl InvalidLine {
    /// Creates an invalid-line record.
    pub fn new(line_number: usize, text: impl Into<String>, reason: InvalidReason) -> Self {
        Self {
            line_number,
            text: text.into(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_kind_display_matches_serde() {
        let kinds = [
            (OutcomeKind::Success, "success"),
            (OutcomeKind::Warning, "warning"),
            (OutcomeKind::Error, "error"),
        ];

        for (kind, expected) in kinds {
            assert_eq!(kind.to_string(), expected);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{expected}\""));
        }
    }

    #[test]
    fn test_outcome_omits_none_message() {
        let job = Job::new(0, "tile", "raster2pgsql tile.tif");
        let json = serde_json::to_string(&Outcome::success(&job)).unwrap();
        assert!(!json.contains("message"));

        let json = serde_json::to_string(&Outcome::error(&job, "boom")).unwrap();
        assert!(json.contains("\"message\":\"boom\""));
    }

    #[test]
    fn test_job_result_exited_ok() {
        let ok = JobResult {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(ok.exited_ok());

        let failed = JobResult {
            exit_code: Some(2),
            ..Default::default()
        };
        assert!(!failed.exited_ok());

        let unlaunched = JobResult {
            exit_code: None,
            launch_error: Some("spawn failed".to_string()),
            ..Default::default()
        };
        assert!(!unlaunched.exited_ok());
    }

    #[test]
    fn test_invalid_reason_serde_snake_case() {
        let json = serde_json::to_string(&InvalidReason::UnexpectedCommand).unwrap();
        assert_eq!(json, "\"unexpected_command\"");
        let back: InvalidReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InvalidReason::UnexpectedCommand);
    }
}
