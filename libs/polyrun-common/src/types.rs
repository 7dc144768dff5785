use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single request to execute source text in a declared language.
///
/// Field names follow the HTTP contract (`sourceText`, `fileNameHint`); the
/// shorter `code` / `filename` spellings are accepted as well.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(default, alias = "code", alias = "source_text")]
    pub source_text: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, alias = "filename", alias = "fileName", alias = "file_name_hint")]
    pub file_name_hint: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            language: language.into(),
            file_name_hint: None,
        }
    }

    pub fn with_file_name(mut self, hint: impl Into<String>) -> Self {
        self.file_name_hint = Some(hint.into());
        self
    }
}

/// How a toolchain turns a source file into something runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeShape {
    /// Run the interpreter directly on the source file.
    Interpreted,
    /// Compile to an artifact path chosen from the job id, then run it.
    PathAddressed,
    /// Compile, then run by an entry name taken from the file name hint.
    NameAddressed,
}

impl RecipeShape {
    pub fn is_compiled(&self) -> bool {
        !matches!(self, RecipeShape::Interpreted)
    }
}

impl fmt::Display for RecipeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeShape::Interpreted => write!(f, "interpreted"),
            RecipeShape::PathAddressed => write!(f, "path_addressed"),
            RecipeShape::NameAddressed => write!(f, "name_addressed"),
        }
    }
}

/// Terminal classification of a job that reached the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    CompileError,
    RuntimeError,
    Timeout,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::CompileError => "compile_error",
            Outcome::RuntimeError => "runtime_error",
            Outcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The step of a job a process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Compile,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Compile => write!(f, "compile"),
            Phase::Run => write!(f, "run"),
        }
    }
}

/// Result of one job. Produced exactly once for every job that reached the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub success: bool,
    pub outcome: Outcome,
    /// Set only when `outcome` is `Timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out_in: Option<Phase>,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub language: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// True when either stream hit the output cap.
    #[serde(default)]
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn is_timeout(&self) -> bool {
        self.outcome == Outcome::Timeout
    }
}

/// Public description of a registered language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub id: String,
    pub aliases: Vec<String>,
    pub extension: String,
    pub shape: RecipeShape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_contract_field_names() {
        let json = r#"{"sourceText":"print(1)","language":"Python","fileNameHint":"a.py"}"#;
        let req: ExecutionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.source_text, "print(1)");
        assert_eq!(req.language, "Python");
        assert_eq!(req.file_name_hint.as_deref(), Some("a.py"));
    }

    #[test]
    fn test_request_accepts_short_aliases() {
        let json = r#"{"code":"class Hello {}","language":"java","filename":"Hello.java"}"#;
        let req: ExecutionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.source_text, "class Hello {}");
        assert_eq!(req.file_name_hint.as_deref(), Some("Hello.java"));
    }

    #[test]
    fn test_request_missing_fields_default_to_empty() {
        let req: ExecutionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.source_text.is_empty());
        assert!(req.language.is_empty());
        assert!(req.file_name_hint.is_none());
    }

    #[test]
    fn test_outcome_wire_format() {
        assert_eq!(serde_json::to_string(&Outcome::CompileError).unwrap(), "\"compile_error\"");
        assert_eq!(Outcome::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_result_omits_absent_timeout_phase() {
        let now = Utc::now();
        let result = ExecutionResult {
            job_id: Uuid::new_v4(),
            success: true,
            outcome: Outcome::Success,
            timed_out_in: None,
            stdout: "4\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            language: "python".to_string(),
            started_at: now,
            finished_at: now,
            duration_ms: 12,
            truncated: false,
        };

        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("timedOutIn").is_none());
        assert_eq!(value["exitCode"], 0);
        assert_eq!(value["outcome"], "success");
        assert!(!result.is_timeout());
    }

    #[test]
    fn test_recipe_shape_compiled() {
        assert!(!RecipeShape::Interpreted.is_compiled());
        assert!(RecipeShape::PathAddressed.is_compiled());
        assert!(RecipeShape::NameAddressed.is_compiled());
    }
}
