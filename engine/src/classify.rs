//! Outcome classification of raw process output.
//!
//! External loader tools emit unstructured, human-readable text with no
//! stable schema, so classification is ordered keyword matching with
//! exit-code confirmation. This can false-positive when legitimate data
//! contains a keyword; that is a documented limitation of the approach, not
//! a defect to silently work around.
//!
//! The keyword list is an explicit construction parameter so behavior
//! differences between callers show up as configuration, not code drift.

use rasterload_core::{Job, JobResult, Outcome};

/// Failure-indicating substrings matched against normalized output.
pub const DEFAULT_ERROR_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "abort",
    "cannot",
    "syntax",
    "unable",
    "not recognized",
    "inoperable",
    "uncommit",
    "memory",
];

/// Classification policy.
///
/// In the default (lenient) policy a failure keyword only escalates to
/// `Error` when the exit code is also non-zero; exit code wins otherwise.
/// The strict policy treats any failure-keyword match as `Error` regardless
/// of exit code.
///
/// # Examples
///
/// ```
/// use rasterload_engine::classify::ClassifierConfig;
///
/// let config = ClassifierConfig::default();
/// assert!(!config.strict);
/// assert!(config.error_keywords.iter().any(|k| k == "syntax"));
///
/// let strict = ClassifierConfig::strict();
/// assert!(strict.strict);
/// ```
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Ordered failure-indicating substrings.
    pub error_keywords: Vec<String>,
    /// Classify keyword matches as `Error` even when the exit code is 0.
    pub strict: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            error_keywords: DEFAULT_ERROR_KEYWORDS
                .iter()
                .map(|&kw| kw.to_string())
                .collect(),
            strict: false,
        }
    }
}

impl ClassifierConfig {
    /// Strict variant: a failure keyword is an error regardless of exit code.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

/// Reduces a [`JobResult`] to exactly one [`Outcome`].
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classifies one raw result. First match wins, in this order: launch
    /// failure, failure keyword, warning heuristic, non-zero exit fallback,
    /// success.
    pub fn classify(&self, job: &Job, result: &JobResult) -> Outcome {
        // A process that never started can carry no meaningful output.
        if let Some(ref launch_error) = result.launch_error {
            return Outcome::error(job, format!("launch failed: {launch_error}"));
        }

        // Matching happens on a normalized single-line lowercase view; the
        // fragment is extracted from that same normalized text.
        let normalized = normalize(&result.stderr);
        let exited_ok = result.exited_ok();

        let keyword_hit = self
            .config
            .error_keywords
            .iter()
            .any(|keyword| normalized.contains(keyword.as_str()));
        if keyword_hit && (!exited_ok || self.config.strict) {
            return Outcome::error(job, normalized);
        }

        if exited_ok {
            if let Some(fragment) = warning_fragment(&normalized) {
                return Outcome::warning(job, fragment);
            }
            return Outcome::success(job);
        }

        // Non-zero exit with no keyword match must never pass as success;
        // fall back to the raw stderr as the fragment.
        let fragment = if result.stderr.trim().is_empty() {
            format!("exit code {}", describe_exit(result.exit_code))
        } else {
            result.stderr.trim().to_string()
        };
        Outcome::error(job, fragment)
    }
}

/// Joins output into a single line and lowercases it for matching.
fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Isolates one warning message: the text from the first occurrence of
/// "warning" up to (but not including) the second occurrence, or to the end
/// when the tool emitted it only once.
fn warning_fragment(normalized: &str) -> Option<String> {
    let first = normalized.find("warning")?;
    let rest = &normalized[first..];
    let fragment = match rest["warning".len()..].find("warning") {
        Some(second) => &rest[..second + "warning".len()],
        None => rest,
    };
    Some(fragment.trim().to_string())
}

fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}
