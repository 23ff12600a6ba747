//! Result hierarchy and the plain-text report writer.

use crate::model::StepKind;
use serde::Serialize;
use std::io::{self, Write};

/// Failure message for an index past the end of a row set or part list.
pub const OUT_OF_BOUNDS: &str = "There are not enough results for the given index";

/// Common view over every level of the result hierarchy.
pub trait Outcome {
    fn success(&self) -> bool;

    fn message(&self) -> Option<&str> {
        None
    }
}

/// Outcome of a single validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorResult {
    /// Name of the validator that produced this result.
    pub validator: String,
    pub success: bool,
    pub message: Option<String>,
}

impl ValidatorResult {
    pub fn success(validator: &str) -> Self {
        Self {
            validator: validator.to_string(),
            success: true,
            message: None,
        }
    }

    pub fn failure(validator: &str, message: impl Into<String>) -> Self {
        Self {
            validator: validator.to_string(),
            success: false,
            message: Some(message.into()),
        }
    }
}

impl Outcome for ValidatorResult {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Outcome of a single after-action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AfterResult {
    pub action: String,
    pub success: bool,
    pub message: Option<String>,
}

impl AfterResult {
    pub fn success(action: &str) -> Self {
        Self {
            action: action.to_string(),
            success: true,
            message: None,
        }
    }

    pub fn failure(action: &str, message: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            success: false,
            message: Some(message.into()),
        }
    }
}

impl Outcome for AfterResult {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Outcome of one step: the execution plus every validator that ran.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: Option<String>,
    pub kind: StepKind,
    pub request_success: bool,
    /// Execution failure message; validators never run when set.
    pub error: Option<String>,
    pub validation_results: Vec<ValidatorResult>,
    pub after_results: Vec<AfterResult>,
    pub duration_ms: u64,
}

impl StepResult {
    /// Display name: `name (KIND)`, or just the kind for unnamed steps.
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => format!("{name} ({})", self.kind),
            _ => self.kind.to_string(),
        }
    }
}

impl Outcome for StepResult {
    fn success(&self) -> bool {
        self.request_success && self.validation_results.iter().all(|r| r.success)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub steps: Vec<StepResult>,
    pub duration_ms: u64,
}

impl Outcome for TestResult {
    fn success(&self) -> bool {
        self.steps.iter().all(Outcome::success)
    }
}

/// Results of a complete run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Results {
    pub tests: Vec<TestResult>,
    /// Set when a fatal error interrupted the run.
    pub aborted: Option<String>,
}

impl Outcome for Results {
    fn success(&self) -> bool {
        self.aborted.is_none() && self.tests.iter().all(Outcome::success)
    }
}

fn success_text(outcome: &dyn Outcome) -> &'static str {
    if outcome.success() {
        " OK "
    } else {
        "FAIL"
    }
}

/// Renders [`Results`] as an indented plain-text report.
pub struct TextResultWriter<W: Write> {
    writer: W,
}

impl<W: Write> TextResultWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write(&mut self, results: &Results) -> io::Result<()> {
        self.line("")?;
        self.line("======== RESULTS ========")?;
        for test in &results.tests {
            self.line(&format!("[ {} ] Test: {}", success_text(test), test.name))?;
            for step in &test.steps {
                self.line(&format!(
                    "[ {} ] - Step: {}",
                    success_text(step),
                    step.display_name()
                ))?;
                if let Some(error) = &step.error {
                    self.line(&format!("            {error}"))?;
                }
                for validation in &step.validation_results {
                    self.line(&format!(
                        "[ {} ]  * Validator: {}",
                        success_text(validation),
                        validation.validator
                    ))?;
                    if let Some(message) = &validation.message {
                        self.line(&format!("            {message}"))?;
                    }
                }
                for after in &step.after_results {
                    self.line(&format!(
                        "[ {} ]  > After: {}",
                        success_text(after),
                        after.action
                    ))?;
                    if let Some(message) = &after.message {
                        self.line(&format!("            {message}"))?;
                    }
                }
            }
        }
        if let Some(reason) = &results.aborted {
            self.line(&format!("[ABORT] {reason}"))?;
        }
        self.line("=========================")?;
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "{text}")
    }
}

/// Render `results` to a string.
pub fn render_text(results: &Results) -> io::Result<String> {
    let mut writer = TextResultWriter::new(Vec::new());
    writer.write(results)?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(success: bool) -> StepResult {
        StepResult {
            name: Some("lookup".into()),
            kind: StepKind::Rest,
            request_success: true,
            error: None,
            validation_results: vec![
                ValidatorResult::success("HttpStatusValidator"),
                if success {
                    ValidatorResult::success("JsonPathValidator")
                } else {
                    ValidatorResult::failure("JsonPathValidator", "Expected: 3 but was: 2")
                },
            ],
            after_results: vec![],
            duration_ms: 1,
        }
    }

    #[test]
    fn success_is_conjunction_of_children() {
        let ok = TestResult {
            name: "t".into(),
            steps: vec![step(true), step(true)],
            duration_ms: 0,
        };
        let bad = TestResult {
            name: "u".into(),
            steps: vec![step(true), step(false)],
            duration_ms: 0,
        };
        assert!(ok.success());
        assert!(!bad.success());

        let results = Results {
            tests: vec![ok.clone(), bad],
            aborted: None,
        };
        assert!(!results.success());

        let all_ok = Results {
            tests: vec![ok],
            aborted: None,
        };
        assert!(all_ok.success());
    }

    #[test]
    fn failed_request_fails_step_without_validators() {
        let failed = StepResult {
            name: None,
            kind: StepKind::Jdbc,
            request_success: false,
            error: Some("SQLException: no such table".into()),
            validation_results: vec![],
            after_results: vec![],
            duration_ms: 0,
        };
        assert!(!failed.success());
        assert_eq!(failed.display_name(), "JDBC");
    }

    #[test]
    fn abort_fails_the_run() {
        let results = Results {
            tests: vec![],
            aborted: Some("Failed to load file: x".into()),
        };
        assert!(!results.success());
    }

    #[test]
    fn text_report_layout() {
        let results = Results {
            tests: vec![TestResult {
                name: "Weather".into(),
                steps: vec![step(false)],
                duration_ms: 0,
            }],
            aborted: None,
        };
        let text = render_text(&results).unwrap();
        let expected = "\n======== RESULTS ========\n\
                        [ FAIL ] Test: Weather\n\
                        [ FAIL ] - Step: lookup (REST)\n\
                        [  OK  ]  * Validator: HttpStatusValidator\n\
                        [ FAIL ]  * Validator: JsonPathValidator\n            \
                        Expected: 3 but was: 2\n\
                        =========================\n";
        assert_eq!(text, expected);
    }
}
