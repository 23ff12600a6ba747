//! JSONPath evaluation and structural JSON comparison.

use jsonpath_lib::select;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

const LENGTH_SUFFIX: &str = ".length()";
const WILDCARD: &str = "**";

#[derive(Debug, Error, PartialEq)]
pub enum JsonPathError {
    #[error("JSON failure, response is empty")]
    EmptyDocument,

    #[error("JSON failure, no valid JSON supplied")]
    InvalidJson,

    #[error("Incorrect Json Path: {path} ({reason})")]
    InvalidPath { path: String, reason: String },

    #[error("The given JSON path returned no results: {0}")]
    NoResults(String),
}

/// Parse `document` and evaluate `path` against it.
pub fn read(document: &str, path: &str) -> Result<Value, JsonPathError> {
    if document.trim().is_empty() {
        return Err(JsonPathError::EmptyDocument);
    }
    let parsed: Value = serde_json::from_str(document).map_err(|_| JsonPathError::InvalidJson)?;
    read_value(&parsed, path)
}

/// Evaluate `path` against a parsed document.
///
/// A definite path yields the single matched value; an indefinite one
/// (wildcards, deep scan, filters, unions, slices) yields an array. A path
/// that matches nothing is reported as [`JsonPathError::NoResults`], which
/// keeps it apart from a present `null`.
pub fn read_value(document: &Value, path: &str) -> Result<Value, JsonPathError> {
    if let Some(base) = path.strip_suffix(LENGTH_SUFFIX) {
        let target = read_value(document, base)?;
        let length = match &target {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            Value::String(text) => text.chars().count(),
            other => {
                return Err(JsonPathError::InvalidPath {
                    path: path.to_string(),
                    reason: format!("length() is not defined for {other}"),
                })
            }
        };
        return Ok(Value::from(length));
    }

    let selected = select(document, path).map_err(|e| JsonPathError::InvalidPath {
        path: path.to_string(),
        reason: format!("{e:?}"),
    })?;

    if is_definite(path) {
        selected
            .into_iter()
            .next()
            .cloned()
            .ok_or_else(|| JsonPathError::NoResults(path.to_string()))
    } else if selected.is_empty() {
        Err(JsonPathError::NoResults(path.to_string()))
    } else {
        Ok(Value::Array(selected.into_iter().cloned().collect()))
    }
}

fn is_definite(path: &str) -> bool {
    if path.contains("..") || path.contains('*') {
        return false;
    }
    let mut rest = path;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else {
            return true;
        };
        let inner = &rest[open + 1..open + close];
        if inner.starts_with('?') || inner.contains(',') || inner.contains(':') {
            return false;
        }
        rest = &rest[open + close + 1..];
    }
    true
}

/// Render a JSON value the way it is compared and stored in properties:
/// strings without quotes, everything else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Strictness of a [`JsonComparator`].
///
/// | mode | extra fields allowed | array order checked |
/// |---|---|---|
/// | strict | no | yes |
/// | lenient | yes | no |
/// | non_extensible | no | no |
/// | strict_order | yes | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    #[default]
    Strict,
    Lenient,
    NonExtensible,
    StrictOrder,
}

impl CompareMode {
    fn extensible(self) -> bool {
        matches!(self, CompareMode::Lenient | CompareMode::StrictOrder)
    }

    fn ordered(self) -> bool {
        matches!(self, CompareMode::Strict | CompareMode::StrictOrder)
    }
}

/// Structural comparison of two JSON documents.
///
/// The string `"**"` in the expected document matches any actual value.
/// Regex overrides are keyed by field path (`items[0].id`) and replace
/// exact comparison at that position.
pub struct JsonComparator {
    mode: CompareMode,
    overrides: HashMap<String, Regex>,
}

impl JsonComparator {
    pub fn new(mode: CompareMode) -> Self {
        Self {
            mode,
            overrides: HashMap::new(),
        }
    }

    /// Compile and attach path overrides.
    pub fn with_overrides(
        mut self,
        overrides: &HashMap<String, String>,
    ) -> Result<Self, regex::Error> {
        for (path, pattern) in overrides {
            let anchored = Regex::new(&format!("^(?:{pattern})$"))?;
            self.overrides.insert(path.clone(), anchored);
        }
        Ok(self)
    }

    /// Every difference found, as human readable lines. Empty when equal.
    pub fn compare(&self, expected: &Value, actual: &Value) -> Vec<String> {
        let mut failures = Vec::new();
        self.compare_value("", expected, actual, &mut failures);
        failures
    }

    fn compare_value(
        &self,
        path: &str,
        expected: &Value,
        actual: &Value,
        failures: &mut Vec<String>,
    ) {
        if expected.as_str() == Some(WILDCARD) {
            return;
        }
        if let Some(pattern) = self.overrides.get(path) {
            if !pattern.is_match(&render(actual)) {
                failures.push(format!(
                    "{}: Expected value matching {} but got {}",
                    display_path(path),
                    pattern.as_str(),
                    actual
                ));
            }
            return;
        }

        match (expected, actual) {
            (Value::Object(expected), Value::Object(actual)) => {
                self.compare_objects(path, expected, actual, failures)
            }
            (Value::Array(expected), Value::Array(actual)) => {
                self.compare_arrays(path, expected, actual, failures)
            }
            (Value::Number(e), Value::Number(a)) if e.as_f64() == a.as_f64() => {}
            (e, a) if e == a => {}
            (e, a) => failures.push(format!(
                "{}\nExpected: {}\n     got: {}",
                display_path(path),
                e,
                a
            )),
        }
    }

    fn compare_objects(
        &self,
        path: &str,
        expected: &Map<String, Value>,
        actual: &Map<String, Value>,
        failures: &mut Vec<String>,
    ) {
        for (key, expected_value) in expected {
            let child = child_path(path, key);
            match actual.get(key) {
                Some(actual_value) => {
                    self.compare_value(&child, expected_value, actual_value, failures)
                }
                None => failures.push(format!(
                    "{}\nExpected: {}\n     but none found",
                    display_path(path),
                    key
                )),
            }
        }
        if !self.mode.extensible() {
            for key in actual.keys().filter(|key| !expected.contains_key(*key)) {
                failures.push(format!("{}\nUnexpected: {}", display_path(path), key));
            }
        }
    }

    fn compare_arrays(
        &self,
        path: &str,
        expected: &[Value],
        actual: &[Value],
        failures: &mut Vec<String>,
    ) {
        if expected.len() != actual.len() {
            failures.push(format!(
                "{}[]: Expected {} values but got {}",
                path,
                expected.len(),
                actual.len()
            ));
            return;
        }

        if self.mode.ordered() {
            for (idx, (e, a)) in expected.iter().zip(actual).enumerate() {
                self.compare_value(&format!("{path}[{idx}]"), e, a, failures);
            }
            return;
        }

        let mut used = vec![false; actual.len()];
        for (idx, e) in expected.iter().enumerate() {
            let element_path = format!("{path}[{idx}]");
            let found = actual.iter().enumerate().position(|(candidate, a)| {
                if used[candidate] {
                    return false;
                }
                let mut scratch = Vec::new();
                self.compare_value(&element_path, e, a, &mut scratch);
                scratch.is_empty()
            });
            match found {
                Some(candidate) => used[candidate] = true,
                None => failures.push(format!("{path}[]: Could not find match for element {e}")),
            }
        }
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "$"
    } else {
        path
    }
}
