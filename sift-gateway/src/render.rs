//! Batch report rendering.

use crate::batch::{BatchOutcome, BatchReport};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Document shape chosen by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputShape {
    /// One block per query plus summary statistics.
    #[default]
    Structured,
    /// Answers concatenated into a single document.
    Plain,
    /// The report itself, pretty-printed.
    Json,
}

/// Render a batch report.
pub fn render_batch(report: &BatchReport, shape: OutputShape) -> sift_common::Result<String> {
    match shape {
        OutputShape::Structured => Ok(render_structured(report)),
        OutputShape::Plain => Ok(render_plain(report)),
        OutputShape::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn render_structured(report: &BatchReport) -> String {
    let mut out = String::new();
    let total = report.total();

    for (index, outcome) in report.outcomes.iter().enumerate() {
        let _ = writeln!(out, "## Query {}/{}: {}", index + 1, total, outcome.query());
        match outcome {
            BatchOutcome::Success { text, .. } => {
                let _ = writeln!(out, "\n{}\n", text.trim_end());
            }
            BatchOutcome::Failure { error, .. } => {
                let _ = writeln!(out, "\n**Error:** {}\n", error);
            }
        }
    }

    let _ = writeln!(out, "---");
    let _ = write!(
        out,
        "Completed {} of {} queries ({} failed) in {:.1}s",
        report.succeeded,
        total,
        report.failed,
        report.elapsed_ms as f64 / 1000.0
    );
    out
}

fn render_plain(report: &BatchReport) -> String {
    report
        .outcomes
        .iter()
        .map(|outcome| match outcome {
            BatchOutcome::Success { query, text } => format!("{}\n\n{}", query, text.trim_end()),
            BatchOutcome::Failure { query, error } => format!("{}\n\nError: {}", query, error),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
