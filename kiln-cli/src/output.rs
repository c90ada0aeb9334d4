//! Output formatting for the Kiln CLI.
//!
//! Two formats: a colored table for humans and JSON for machine
//! consumption.

use clap::ValueEnum;
use colored::Colorize;
use kiln_core::scanner::ScanResult;
use kiln_core::{ChunkStatus, RunSummary};
use tabled::{builder::Builder, settings::Style};

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format (default)
    #[default]
    Table,
    /// JSON format for machine consumption
    Json,
}

/// Render a run summary in the requested format.
pub fn render_summary(summary: &RunSummary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(summary).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
        }
        OutputFormat::Table => summary_table(summary),
    }
}

fn summary_table(summary: &RunSummary) -> String {
    let mut builder = Builder::default();
    builder.push_record(["CHUNK", "STATUS", "ARTIFACT", "SIZE"]);

    for outcome in &summary.outcomes {
        let (status, artifact, size) = match &outcome.status {
            ChunkStatus::Compiled {
                artifact, bytes, ..
            } => (
                "compiled".green().to_string(),
                artifact.clone(),
                format_size(*bytes),
            ),
            ChunkStatus::Skipped => ("skipped".dimmed().to_string(), String::new(), String::new()),
            ChunkStatus::Failed { reason } => {
                ("failed".red().to_string(), reason.clone(), String::new())
            }
        };
        builder.push_record([outcome.chunk.clone(), status, artifact, size]);
    }

    let table = builder.build().with(Style::sharp()).to_string();
    format!(
        "{table}\n\n{} compiled, {} skipped, {} failed in {:.1}s\n",
        summary.compiled(),
        summary.skipped(),
        summary.failed(),
        summary.duration.as_secs_f64()
    )
}

/// Render a scan result in the requested format.
pub fn render_scan(scan: &ScanResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(scan).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
        }
        OutputFormat::Table => scan_table(scan),
    }
}

fn scan_table(scan: &ScanResult) -> String {
    if scan.chunks.is_empty() {
        return "(no chunks found)\n".to_string();
    }

    let mut builder = Builder::default();
    builder.push_record(["CHUNK", "ELIGIBLE", "SIZE", "HASH"]);

    for chunk in &scan.chunks {
        let eligible = if chunk.eligible {
            "yes".green().to_string()
        } else {
            "no".dimmed().to_string()
        };
        builder.push_record([
            chunk.id.clone(),
            eligible,
            format_size(chunk.source.len() as u64),
            chunk.source_hash.clone(),
        ]);
    }

    let eligible_count = scan.chunks.iter().filter(|c| c.eligible).count();
    let table = builder.build().with(Style::sharp()).to_string();
    format!(
        "{table}\n\n{} chunks, {} eligible\n",
        scan.chunks.len(),
        eligible_count
    )
}

/// Human-readable byte size.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::ChunkOutcome;
    use std::time::Duration;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_summary_table_lists_chunks() {
        colored::control::set_override(false);
        let summary = RunSummary {
            outcomes: vec![
                ChunkOutcome {
                    chunk: "foo".to_string(),
                    status: ChunkStatus::Compiled {
                        artifact: "foo.jsc".to_string(),
                        artifact_hash: "xxh3:0".to_string(),
                        bytes: 512,
                    },
                },
                ChunkOutcome {
                    chunk: "index".to_string(),
                    status: ChunkStatus::Skipped,
                },
            ],
            duration: Duration::from_millis(100),
        };

        let out = render_summary(&summary, OutputFormat::Table);
        assert!(out.contains("foo.jsc"));
        assert!(out.contains("1 compiled, 1 skipped, 0 failed"));
    }

    #[test]
    fn test_summary_json_is_valid() {
        let summary = RunSummary::default();
        let out = render_summary(&summary, OutputFormat::Json);
        assert!(serde_json::from_str::<serde_json::Value>(&out).is_ok());
    }
}
