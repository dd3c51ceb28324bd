use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub category: String,
    pub question: String,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub version: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    pub elapsed_seconds: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub found: Vec<String>,
    pub missing: Vec<String>,
    pub match_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualScores {
    pub accuracy: Option<f64>,
    pub completeness: Option<f64>,
    pub citation_quality: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub question_id: String,
    pub category: String,
    pub question: String,
    pub response: String,
    pub elapsed_seconds: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub error: Option<String>,
    pub keyword_match: KeywordMatch,
    #[serde(default)]
    pub manual_scores: ManualScores,
}

impl ResultRecord {
    pub fn new(question: &Question, answer: Answer, keyword_match: KeywordMatch) -> Self {
        Self {
            question_id: question.id.clone(),
            category: question.category.clone(),
            question: question.question.clone(),
            response: answer.response,
            elapsed_seconds: answer.elapsed_seconds,
            input_tokens: answer.input_tokens,
            output_tokens: answer.output_tokens,
            error: answer.error,
            keyword_match,
            manual_scores: ManualScores::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub label: String,
    pub timestamp: String,
    pub sandbox_path: String,
    pub questions_version: String,
    pub quality_version: String,
    pub total_questions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_sha256: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_questions: usize,
    pub errors: usize,
    pub total_elapsed_seconds: f64,
    pub avg_elapsed_seconds: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub avg_input_tokens: u64,
    pub avg_keyword_match_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub metadata: RunMetadata,
    pub results: Vec<ResultRecord>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenChanges {
    pub baseline_avg_input_tokens: u64,
    pub current_avg_input_tokens: u64,
    pub change_tokens: i64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDelta {
    pub question_id: String,
    pub baseline_match: f64,
    pub current_match: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub baseline_label: String,
    pub current_label: String,
    pub regressions: Vec<QuestionDelta>,
    pub improvements: Vec<QuestionDelta>,
    pub token_changes: TokenChanges,
}
