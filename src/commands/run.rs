use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use crate::cli::RunArgs;
use crate::config::{HarnessPaths, load_quality_config, load_questions};
use crate::invoke::Invocation;
use crate::model::{Answer, Question, ResultRecord, RunMetadata, RunResults, RunSummary};
use crate::scoring::check_keywords;
use crate::util::{char_prefix, local_compact_string, now_utc_string, round2, write_json_pretty};

const PROGRESS_PREVIEW_CHARS: usize = 60;

pub fn run(args: RunArgs) -> Result<()> {
    let paths = HarnessPaths::from_config_dir(&args.config_dir);
    info!(
        sandbox = %args.sandbox.display(),
        label = %args.label,
        "running Q&A quality tests"
    );

    let invocation = Invocation::default();
    let results = run_tests(&paths, &args.sandbox, &args.label, |question| {
        invocation.ask(&args.sandbox, question)
    })?;

    let stamp = local_compact_string(Local::now());
    let output_path = result_file_path(&paths.results_dir, &args.label, &stamp);
    write_json_pretty(&output_path, &results)?;
    info!(
        path = %output_path.display(),
        questions = results.summary.total_questions,
        errors = results.summary.errors,
        "saved results"
    );

    write_summary_report(&output_path, &results.summary)
}

pub fn run_tests<F>(
    paths: &HarnessPaths,
    sandbox: &Path,
    label: &str,
    ask: F,
) -> Result<RunResults>
where
    F: FnMut(&str) -> Answer,
{
    let questions = load_questions(&paths.questions_path)?;
    let quality = load_quality_config(&paths.quality_path)?;

    let metadata = RunMetadata {
        label: label.to_string(),
        timestamp: now_utc_string(),
        sandbox_path: sandbox.display().to_string(),
        questions_version: questions.value.version.clone(),
        quality_version: quality.value.version.clone(),
        total_questions: questions.value.questions.len(),
        questions_sha256: Some(questions.sha256),
        quality_sha256: Some(quality.sha256),
    };

    let results = collect_results(&questions.value.questions, ask);
    let summary = summarize(&results);

    Ok(RunResults {
        metadata,
        results,
        summary,
    })
}

pub fn collect_results<F>(questions: &[Question], mut ask: F) -> Vec<ResultRecord>
where
    F: FnMut(&str) -> Answer,
{
    let mut results = Vec::with_capacity(questions.len());
    for question in questions {
        info!(
            question_id = %question.id,
            "{}...",
            char_prefix(&question.question, PROGRESS_PREVIEW_CHARS)
        );

        let answer = ask(&question.question);
        let keyword_match = check_keywords(&answer.response, &question.expected_keywords);
        results.push(ResultRecord::new(question, answer, keyword_match));
    }
    results
}

pub fn summarize(results: &[ResultRecord]) -> RunSummary {
    let count = results.len();
    let divisor = count.max(1);

    let total_time: f64 = results.iter().map(|record| record.elapsed_seconds).sum();
    let total_input: u64 = results.iter().map(|record| record.input_tokens).sum();
    let total_output: u64 = results.iter().map(|record| record.output_tokens).sum();
    let errors = results
        .iter()
        .filter(|record| record.error.is_some())
        .count();
    let total_ratio: f64 = results
        .iter()
        .map(|record| record.keyword_match.match_ratio)
        .sum();

    RunSummary {
        total_questions: count,
        errors,
        total_elapsed_seconds: round2(total_time),
        avg_elapsed_seconds: round2(total_time / divisor as f64),
        total_input_tokens: total_input,
        total_output_tokens: total_output,
        avg_input_tokens: total_input / divisor as u64,
        avg_keyword_match_ratio: round2(total_ratio / divisor as f64),
    }
}

pub fn result_file_path(results_dir: &Path, label: &str, stamp: &str) -> PathBuf {
    results_dir.join(format!("{label}_{stamp}.json"))
}

fn write_summary_report(output_path: &Path, summary: &RunSummary) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output)?;
    writeln!(output, "Results saved to {}", output_path.display())?;
    writeln!(output)?;
    writeln!(output, "Summary:")?;
    writeln!(output, "  total_questions: {}", summary.total_questions)?;
    writeln!(output, "  errors: {}", summary.errors)?;
    writeln!(output, "  total_elapsed_seconds: {}", summary.total_elapsed_seconds)?;
    writeln!(output, "  avg_elapsed_seconds: {}", summary.avg_elapsed_seconds)?;
    writeln!(output, "  total_input_tokens: {}", summary.total_input_tokens)?;
    writeln!(output, "  total_output_tokens: {}", summary.total_output_tokens)?;
    writeln!(output, "  avg_input_tokens: {}", summary.avg_input_tokens)?;
    writeln!(
        output,
        "  avg_keyword_match_ratio: {}",
        summary.avg_keyword_match_ratio
    )?;
    writeln!(output)?;
    writeln!(
        output,
        "NOTE: Manual scoring (accuracy, completeness, citation_quality) must be filled in by reviewing each response in the results file."
    )?;
    output.flush().context("failed to write run summary")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{collect_results, result_file_path, run_tests, summarize};
    use crate::config::HarnessPaths;
    use crate::model::{Answer, Question};

    fn question(id: &str, text: &str, keywords: &[&str]) -> Question {
        Question {
            id: id.to_string(),
            category: "general".to_string(),
            question: text.to_string(),
            expected_keywords: keywords.iter().map(|kw| kw.to_string()).collect(),
        }
    }

    fn answer(response: &str, elapsed: f64, input: u64, output: u64) -> Answer {
        Answer {
            response: response.to_string(),
            elapsed_seconds: elapsed,
            input_tokens: input,
            output_tokens: output,
            error: None,
        }
    }

    #[test]
    fn successful_run_has_no_errors_and_counts_every_question() {
        let questions = vec![
            question("Q1", "What is the capital of France?", &["Paris"]),
            question("Q2", "Which river flows through Paris?", &["Seine", "river"]),
            question("Q3", "Name a French cheese.", &["brie"]),
        ];

        let results = collect_results(&questions, |text| {
            answer(&format!("answer to {text}: Paris, Seine"), 1.0, 100, 10)
        });
        let summary = summarize(&results);

        assert_eq!(summary.total_questions, 3);
        assert_eq!(summary.errors, 0);
        assert_eq!(
            results.iter().map(|r| r.question_id.as_str()).collect::<Vec<_>>(),
            vec!["Q1", "Q2", "Q3"]
        );
    }

    #[test]
    fn summary_uses_floor_token_average_and_rounded_means() {
        let questions = vec![
            question("Q1", "one", &["alpha"]),
            question("Q2", "two", &["beta", "gamma", "delta"]),
            question("Q3", "three", &[]),
        ];
        let mut answers = vec![
            answer("alpha", 1.111, 10, 1),
            answer("beta", 2.222, 11, 2),
            Answer {
                response: String::new(),
                elapsed_seconds: 120.0,
                input_tokens: 0,
                output_tokens: 0,
                error: Some("Timeout after 120 seconds".to_string()),
            },
        ]
        .into_iter();

        let results = collect_results(&questions, |_| answers.next().expect("one answer per question"));
        let summary = summarize(&results);

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.total_input_tokens, 21);
        assert_eq!(summary.total_output_tokens, 3);
        assert_eq!(summary.avg_input_tokens, 7);
        assert_eq!(summary.total_elapsed_seconds, 123.33);
        assert_eq!(summary.avg_elapsed_seconds, 41.11);
        // ratios: 1.0, 0.33, 0.0
        assert_eq!(summary.avg_keyword_match_ratio, 0.44);
        assert!(results[2].response.is_empty());
        assert_eq!(results[2].input_tokens, 0);
    }

    #[test]
    fn failed_exit_with_blank_stderr_counts_as_error() {
        let questions = vec![question("Q1", "one", &["alpha"])];
        let results = collect_results(&questions, |_| Answer {
            error: Some(String::new()),
            ..answer("alpha", 0.4, 5, 1)
        });

        assert_eq!(summarize(&results).errors, 1);
        assert_eq!(results[0].error.as_deref(), Some(""));
    }

    #[test]
    fn empty_question_set_summarizes_to_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_questions, 0);
        assert_eq!(summary.avg_elapsed_seconds, 0.0);
        assert_eq!(summary.avg_input_tokens, 0);
        assert_eq!(summary.avg_keyword_match_ratio, 0.0);
    }

    #[test]
    fn result_file_is_named_by_label_and_stamp() {
        let path = result_file_path(Path::new("results"), "new-config", "20260101_120000");
        assert_eq!(path, Path::new("results").join("new-config_20260101_120000.json"));
    }

    #[test]
    fn run_tests_records_metadata_from_config_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("questions.json"),
            r#"{"version": "q-3", "questions": [
                {"id": "Q1", "category": "facts", "question": "Capital of France?", "expected_keywords": ["Paris"]},
                {"id": "Q2", "category": "facts", "question": "Capital of Spain?", "expected_keywords": ["Madrid"]}
            ]}"#,
        )
        .expect("write questions");
        fs::write(
            dir.path().join("expected_quality.json"),
            r#"{"version": "s-1"}"#,
        )
        .expect("write quality");

        let paths = HarnessPaths::from_config_dir(dir.path());
        let mut asked = Vec::new();
        let results = run_tests(&paths, Path::new("/srv/sandbox"), "baseline", |text| {
            asked.push(text.to_string());
            answer("Paris", 0.5, 40, 4)
        })
        .expect("run should succeed");

        assert_eq!(asked, vec!["Capital of France?", "Capital of Spain?"]);
        assert_eq!(results.metadata.label, "baseline");
        assert_eq!(results.metadata.sandbox_path, "/srv/sandbox");
        assert_eq!(results.metadata.questions_version, "q-3");
        assert_eq!(results.metadata.quality_version, "s-1");
        assert_eq!(results.metadata.total_questions, 2);
        assert!(results.metadata.questions_sha256.is_some());
        assert_eq!(results.results[0].keyword_match.match_ratio, 1.0);
        assert_eq!(results.results[1].keyword_match.match_ratio, 0.0);
        assert_eq!(results.summary.avg_keyword_match_ratio, 0.5);
        assert!(results.results.iter().all(|r| r.manual_scores.accuracy.is_none()));
    }

    #[test]
    fn run_tests_fails_when_quality_config_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("questions.json"),
            r#"{"version": "1", "questions": []}"#,
        )
        .expect("write questions");

        let paths = HarnessPaths::from_config_dir(dir.path());
        let err = run_tests(&paths, Path::new("."), "test", |_| answer("", 0.0, 0, 0))
            .expect_err("missing quality config must fail");
        assert!(format!("{err:#}").contains("expected_quality.json"));
    }
}
