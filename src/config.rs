use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::info;

use crate::model::{QualityConfig, QuestionSet};
use crate::util::{read_json, sha256_file};

pub const QUESTIONS_FILE: &str = "questions.json";
pub const QUALITY_FILE: &str = "expected_quality.json";
pub const RESULTS_DIR: &str = "results";

#[derive(Debug, Clone)]
pub struct HarnessPaths {
    pub questions_path: PathBuf,
    pub quality_path: PathBuf,
    pub results_dir: PathBuf,
}

impl HarnessPaths {
    pub fn from_config_dir(config_dir: &Path) -> Self {
        Self {
            questions_path: config_dir.join(QUESTIONS_FILE),
            quality_path: config_dir.join(QUALITY_FILE),
            results_dir: config_dir.join(RESULTS_DIR),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: T,
    pub sha256: String,
}

pub fn load_questions(path: &Path) -> Result<Loaded<QuestionSet>> {
    let value: QuestionSet = read_json(path)?;

    let mut seen = HashSet::new();
    for question in &value.questions {
        if !seen.insert(question.id.as_str()) {
            bail!(
                "duplicate question id '{}' in {}",
                question.id,
                path.display()
            );
        }
    }

    let sha256 = sha256_file(path)?;
    info!(
        path = %path.display(),
        version = %value.version,
        questions = value.questions.len(),
        "loaded question set"
    );

    Ok(Loaded { value, sha256 })
}

pub fn load_quality_config(path: &Path) -> Result<Loaded<QualityConfig>> {
    let value: QualityConfig = read_json(path)?;
    let sha256 = sha256_file(path)?;
    info!(path = %path.display(), version = %value.version, "loaded quality config");

    Ok(Loaded { value, sha256 })
}
