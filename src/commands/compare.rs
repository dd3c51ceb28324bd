use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::cli::CompareArgs;
use crate::model::{ComparisonReport, QuestionDelta, TokenChanges};
use crate::util::{read_json, round_to, round2};

pub const MATCH_DELTA_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Deserialize)]
pub struct RunSnapshot {
    pub metadata: SnapshotMetadata,
    pub results: Vec<SnapshotRecord>,
    pub summary: SnapshotSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotMetadata {
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRecord {
    pub question_id: String,
    pub keyword_match: SnapshotKeywordMatch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotKeywordMatch {
    pub match_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotSummary {
    pub avg_input_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchChange {
    Regression,
    Improvement,
}

pub fn run(args: CompareArgs) -> Result<()> {
    let report = compare_files(&args.baseline, &args.current)?;
    info!(
        baseline = %report.baseline_label,
        current = %report.current_label,
        regressions = report.regressions.len(),
        improvements = report.improvements.len(),
        "comparison complete"
    );

    if args.json {
        write_json_report(&report)
    } else {
        write_text_report(&report)
    }
}

pub fn compare_files(baseline_path: &Path, current_path: &Path) -> Result<ComparisonReport> {
    let baseline: RunSnapshot = read_json(baseline_path)?;
    let current: RunSnapshot = read_json(current_path)?;
    Ok(compare_results(&baseline, &current))
}

pub fn compare_results(baseline: &RunSnapshot, current: &RunSnapshot) -> ComparisonReport {
    let current_ratios: HashMap<&str, f64> = current
        .results
        .iter()
        .map(|record| (record.question_id.as_str(), record.keyword_match.match_ratio))
        .collect();

    let mut regressions = Vec::new();
    let mut improvements = Vec::new();

    for record in &baseline.results {
        let Some(&current_match) = current_ratios.get(record.question_id.as_str()) else {
            continue;
        };
        let baseline_match = record.keyword_match.match_ratio;
        let delta = round2(current_match - baseline_match);

        let entry = QuestionDelta {
            question_id: record.question_id.clone(),
            baseline_match,
            current_match,
            delta,
        };
        match classify_delta(delta) {
            Some(MatchChange::Regression) => regressions.push(entry),
            Some(MatchChange::Improvement) => improvements.push(entry),
            None => {}
        }
    }

    ComparisonReport {
        baseline_label: baseline.metadata.label.clone(),
        current_label: current.metadata.label.clone(),
        regressions,
        improvements,
        token_changes: token_changes(
            baseline.summary.avg_input_tokens,
            current.summary.avg_input_tokens,
        ),
    }
}

pub fn classify_delta(delta: f64) -> Option<MatchChange> {
    if delta < -MATCH_DELTA_THRESHOLD {
        Some(MatchChange::Regression)
    } else if delta > MATCH_DELTA_THRESHOLD {
        Some(MatchChange::Improvement)
    } else {
        None
    }
}

pub fn token_changes(baseline_avg: u64, current_avg: u64) -> TokenChanges {
    let change_tokens = current_avg as i64 - baseline_avg as i64;
    let change_percent = round_to(
        change_tokens as f64 / baseline_avg.max(1) as f64 * 100.0,
        1,
    );

    TokenChanges {
        baseline_avg_input_tokens: baseline_avg,
        current_avg_input_tokens: current_avg,
        change_tokens,
        change_percent,
    }
}

fn write_json_report(report: &ComparisonReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, report)
        .context("failed to serialize comparison json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_report(report: &ComparisonReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    render_text_report(&mut output, report)?;
    output.flush()?;
    Ok(())
}

fn render_text_report<W: Write>(output: &mut W, report: &ComparisonReport) -> io::Result<()> {
    let tokens = &report.token_changes;

    writeln!(output, "Comparison Results:")?;
    writeln!(output, "  Baseline: {}", report.baseline_label)?;
    writeln!(output, "  Current:  {}", report.current_label)?;
    writeln!(output)?;
    writeln!(output, "Token Changes:")?;
    writeln!(
        output,
        "  Baseline avg input tokens: {}",
        tokens.baseline_avg_input_tokens
    )?;
    writeln!(
        output,
        "  Current avg input tokens:  {}",
        tokens.current_avg_input_tokens
    )?;
    writeln!(
        output,
        "  Change: {} ({}%)",
        tokens.change_tokens, tokens.change_percent
    )?;
    writeln!(output)?;

    writeln!(output, "Regressions: {}", report.regressions.len())?;
    for entry in &report.regressions {
        write_delta_line(output, entry)?;
    }
    writeln!(output, "Improvements: {}", report.improvements.len())?;
    for entry in &report.improvements {
        write_delta_line(output, entry)?;
    }
    Ok(())
}

fn write_delta_line<W: Write>(output: &mut W, entry: &QuestionDelta) -> io::Result<()> {
    writeln!(
        output,
        "  {}: {} -> {} ({:+.2})",
        entry.question_id, entry.baseline_match, entry.current_match, entry.delta
    )
}
