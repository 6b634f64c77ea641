//! Command source: turning input files and path lists into jobs.
//!
//! The source is a pure parse step. It reads a line-oriented input file and
//! routes every line either to a [`Job`] or to an [`InvalidLine`]; nothing
//! here executes anything. A missing or unreadable input file is a single
//! fatal error for the whole batch, reported once rather than per line.
//!
//! Two alternate construction modes build the same `Job` shape without a
//! pre-built command file: [`jobs_from_paths`] takes raster file paths plus
//! fixed [`LoadParams`], and [`jobs_from_records`] reads comma-separated
//! records whose fields are addressed by fixed numeric offsets.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use rasterload_core::{InvalidLine, InvalidReason, Job, LoadParams};
use regex::Regex;
use tracing::debug;

/// Typed error for batch setup failures.
///
/// Anything raised here aborts the run before a single job executes.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Input file missing or unreadable.
    #[error("failed to read input '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Batch parameters failed validation.
    #[error("invalid batch parameters: {0}")]
    InvalidParams(String),

    /// The input produced no jobs at all.
    #[error("input '{0}' contains no runnable commands")]
    EmptyBatch(String),
}

/// Configuration for parsing a command file.
///
/// # Examples
///
/// ```
/// use rasterload_engine::source::SourceConfig;
///
/// let config = SourceConfig::default();
/// assert_eq!(config.placeholder, '#');
/// assert!(config.expected_commands.iter().any(|c| c == "raster2pgsql"));
/// ```
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Command names a valid line may begin with.
    pub expected_commands: Vec<String>,
    /// Marker character standing in for an undeterminable parameter; any
    /// line containing it is skipped.
    pub placeholder: char,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            expected_commands: vec!["raster2pgsql".to_string()],
            placeholder: '#',
        }
    }
}

/// Result of parsing one input source: jobs in input order plus the lines
/// that were skipped.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    /// Valid jobs, ordered by first appearance among valid lines.
    pub jobs: Vec<Job>,
    /// Skipped lines, in input order.
    pub invalid: Vec<InvalidLine>,
}

/// Fixed numeric field offsets for record-mode input.
///
/// Record files carry no header row; fields are addressed positionally.
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    /// Offset of the raster file path field.
    pub path_field: usize,
    /// Offset of the SRID field.
    pub srid_field: usize,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            path_field: 0,
            srid_field: 1,
        }
    }
}

/// Parses a command file into jobs and invalid lines.
///
/// A line is invalid when it is empty, contains the placeholder marker, or
/// does not begin with one of the expected command tokens. Valid lines
/// become jobs labelled by the file stem of the command's first path-like
/// operand.
///
/// # Errors
///
/// Returns [`SourceError::Io`] once for the whole batch when the input file
/// cannot be read.
pub fn parse(path: &Path, config: &SourceConfig) -> Result<ParsedBatch, SourceError> {
    let raw = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(parse_lines(raw.lines(), config))
}

/// Parses already-read command lines; the line-classification core shared
/// by [`parse`] and the rerun-file round trip.
pub fn parse_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    config: &SourceConfig,
) -> ParsedBatch {
    let mut batch = ParsedBatch::default();

    for (offset, line) in lines.into_iter().enumerate() {
        let line_number = offset + 1;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            batch
                .invalid
                .push(InvalidLine::new(line_number, line, InvalidReason::Empty));
            continue;
        }
        if trimmed.contains(config.placeholder) {
            debug!(line_number, "skipping line with placeholder marker");
            batch
                .invalid
                .push(InvalidLine::new(line_number, line, InvalidReason::Placeholder));
            continue;
        }

        let first_token = trimmed.split_whitespace().next().unwrap_or_default();
        let command_name = Path::new(first_token)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(first_token);
        if !config
            .expected_commands
            .iter()
            .any(|expected| expected == command_name)
        {
            debug!(line_number, token = first_token, "skipping unexpected command");
            batch.invalid.push(InvalidLine::new(
                line_number,
                line,
                InvalidReason::UnexpectedCommand,
            ));
            continue;
        }

        let index = batch.jobs.len();
        let label = derive_label(trimmed).unwrap_or_else(|| format!("job-{index}"));
        batch.jobs.push(Job::new(index, label, trimmed));
    }

    batch
}

/// Builds jobs from raster file paths plus fixed per-batch parameters.
///
/// Routes through the same `Job` shape and label derivation as [`parse`].
/// Parameters are validated once; a validation failure aborts before any
/// job is built.
pub fn jobs_from_paths(
    paths: &[impl AsRef<Path>],
    params: &LoadParams,
) -> Result<Vec<Job>, SourceError> {
    validate_params(params)?;

    Ok(paths
        .iter()
        .enumerate()
        .map(|(index, path)| build_load_job(index, path.as_ref(), params.srid, params))
        .collect())
}

/// Builds jobs from a comma-separated record file with fixed field offsets.
///
/// Each record supplies its own raster path and SRID; the remaining loader
/// parameters come from `params`. Malformed records (too few fields,
/// non-numeric SRID, placeholder marker) are routed to [`InvalidLine`],
/// mirroring the command-file parse path.
pub fn jobs_from_records(
    path: &Path,
    layout: &RecordLayout,
    params: &LoadParams,
    placeholder: char,
) -> Result<ParsedBatch, SourceError> {
    validate_params(params)?;

    let raw = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut batch = ParsedBatch::default();
    let needed_fields = layout.path_field.max(layout.srid_field) + 1;

    for (offset, line) in raw.lines().enumerate() {
        let line_number = offset + 1;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            batch
                .invalid
                .push(InvalidLine::new(line_number, line, InvalidReason::Empty));
            continue;
        }
        if trimmed.contains(placeholder) {
            batch
                .invalid
                .push(InvalidLine::new(line_number, line, InvalidReason::Placeholder));
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() < needed_fields {
            batch.invalid.push(InvalidLine::new(
                line_number,
                line,
                InvalidReason::MalformedRecord,
            ));
            continue;
        }

        let raster_path = fields[layout.path_field];
        let srid = match fields[layout.srid_field].parse::<i32>() {
            Ok(srid) if srid > 0 => srid,
            _ => {
                debug!(line_number, "skipping record with unparseable SRID");
                batch.invalid.push(InvalidLine::new(
                    line_number,
                    line,
                    InvalidReason::MalformedRecord,
                ));
                continue;
            }
        };

        let index = batch.jobs.len();
        batch
            .jobs
            .push(build_load_job(index, Path::new(raster_path), srid, params));
    }

    Ok(batch)
}

fn validate_params(params: &LoadParams) -> Result<(), SourceError> {
    let errors = rasterload_core::validate_load_params(params);
    if let Some(first) = errors.first() {
        return Err(SourceError::InvalidParams(first.to_string()));
    }
    Ok(())
}

fn build_load_job(index: usize, raster: &Path, srid: i32, params: &LoadParams) -> Job {
    let mode = if params.append { "-a" } else { "-c" };
    let command = format!(
        "raster2pgsql -s {srid} {mode} -t {tile} {raster} {table} | psql -h {host} -p {port} -U {user} -d {dbname}",
        tile = params.tile_size,
        raster = raster.display(),
        table = params.qualified_table(),
        host = params.connection.host,
        port = params.connection.port,
        user = params.connection.user,
        dbname = params.connection.dbname,
    );

    let label = raster
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("job-{index}"));

    Job::new(index, label, command)
}

/// Extracts a filename-like label from a command line: the file stem of the
/// first operand that looks like a file path.
fn derive_label(command: &str) -> Option<String> {
    static PATH_TOKEN: OnceLock<Regex> = OnceLock::new();
    let path_token = PATH_TOKEN
        .get_or_init(|| Regex::new(r"^[^|<>&;]*[/\\][^|<>&;]*$|^\S+\.\w{1,8}$").expect("valid regex"));

    let mut tokens = command.split_whitespace();
    // Skip the command name itself.
    tokens.next()?;

    let mut skip_value = false;
    for token in tokens {
        if skip_value {
            skip_value = false;
            continue;
        }
        if token.starts_with('-') {
            // Loader flags that take a separate value argument.
            skip_value = matches!(token, "-s" | "-t" | "-N" | "-f" | "-l");
            continue;
        }
        if token == "|" {
            break;
        }
        if path_token.is_match(token) {
            return Path::new(token)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(ToOwned::to_owned);
        }
    }

    None
}
