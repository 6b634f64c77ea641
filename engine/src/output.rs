//! Output formatting for batch summaries.

use rasterload_core::{InvalidLine, RunSummary};

/// Supported output formats.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

/// Formats a run summary in the requested output format.
pub fn format_summary(summary: &RunSummary, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(summary)
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => {
            serde_yaml::to_string(summary).map_err(|e| format!("YAML serialization failed: {e}"))
        }
        OutputFormat::Table => Ok(summary_to_table(summary)),
    }
}

/// Formats skipped input lines as a plain listing.
pub fn format_invalid_lines(invalid: &[InvalidLine]) -> String {
    let mut out = String::new();
    for line in invalid {
        out.push_str(&format!(
            "line {:>4} [{}]: {}\n",
            line.line_number, line.reason, line.text
        ));
    }
    out
}

fn summary_to_table(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!("Submitted: {}\n", summary.total));
    out.push_str(&format!("  success: {}\n", summary.success));
    out.push_str(&format!("  warning: {}\n", summary.warning));
    out.push_str(&format!("  error:   {}\n", summary.error));
    if summary.invalid_lines > 0 {
        out.push_str(&format!("Skipped input lines: {}\n", summary.invalid_lines));
    }
    if let Some(elapsed) = summary.elapsed_secs {
        out.push_str(&format!("Elapsed: {elapsed:.1}s\n"));
    }

    out
}
