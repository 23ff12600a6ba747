use super::{JdbcRequest, JdbcResponse, Row};
use crate::context::ExecutionContext;
use crate::engine::Validator;
use crate::expression::{interpolate, Expression};
use crate::result::{ValidatorResult, OUT_OF_BOUNDS};
use crate::timestamp::{self, Inequality};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const NO_RESULTS: &str = "The given query returned no results";

fn default_true() -> bool {
    true
}

/// Checks available on JDBC steps. Column names match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JdbcValidator {
    /// Without `row`, succeeds when any row matches.
    Column {
        column: String,
        #[serde(default)]
        row: Option<usize>,
        value: Option<Expression>,
        #[serde(default)]
        regex: bool,
    },
    /// Counts all rows, or only rows where `column` is non-empty.
    RowCount {
        expected: usize,
        #[serde(default)]
        column: Option<String>,
    },
    IsNull {
        column: String,
        #[serde(default)]
        row: usize,
        #[serde(default = "default_true")]
        is_null: bool,
    },
    CompareTime {
        first: String,
        #[serde(default)]
        first_row: usize,
        second: String,
        #[serde(default)]
        second_row: usize,
        interval: i64,
        inequality: Inequality,
    },
}

impl Validator<JdbcRequest, JdbcResponse> for JdbcValidator {
    fn name(&self) -> &'static str {
        match self {
            JdbcValidator::Column { .. } => "QueryValidator",
            JdbcValidator::RowCount { .. } => "RowCountValidator",
            JdbcValidator::IsNull { .. } => "BooleanValidator",
            JdbcValidator::CompareTime { .. } => "CompareTimeValidator",
        }
    }

    fn validate(
        &self,
        context: &ExecutionContext,
        _request: &JdbcRequest,
        response: &JdbcResponse,
    ) -> ValidatorResult {
        match self.check(context, &response.rows) {
            Ok(()) => self.success(),
            Err(message) => self.failure(message),
        }
    }
}

impl JdbcValidator {
    fn check(&self, context: &ExecutionContext, rows: &[Row]) -> Result<(), String> {
        match self {
            JdbcValidator::Column {
                column,
                row,
                value,
                regex,
            } => {
                let expected = value
                    .as_ref()
                    .and_then(|value| value.evaluate(context))
                    .ok_or_else(|| format!("{}: missing expected value", self.name()))?;
                let expected = interpolate(&expected, context).map_err(|e| e.to_string())?;
                if rows.is_empty() {
                    return Err(NO_RESULTS.to_string());
                }
                let matcher = Matcher::new(&expected, *regex)?;
                let no_match = || format!("{}: No match found for: {column}", self.name());

                match row {
                    None => rows
                        .iter()
                        .any(|r| matcher.matches(cell(r, column)))
                        .then_some(())
                        .ok_or_else(no_match),
                    Some(idx) => {
                        let r = rows.get(*idx).ok_or_else(|| OUT_OF_BOUNDS.to_string())?;
                        let actual = r.get(column).ok_or_else(no_match)?.as_deref();
                        if matcher.matches(actual) {
                            Ok(())
                        } else {
                            Err(format!(
                                "{}: Column: {column}\nExpected:\n\t{expected}\nActual:\n\t{}",
                                self.name(),
                                actual.unwrap_or("null")
                            ))
                        }
                    }
                }
            }
            JdbcValidator::RowCount { expected, column } => match column {
                None if rows.len() == *expected => Ok(()),
                None => Err(format!(
                    "there were {} row(s) instead of {expected} row(s)",
                    rows.len()
                )),
                Some(column) => {
                    let first = rows.first().ok_or_else(|| NO_RESULTS.to_string())?;
                    if !first.contains_key(column) {
                        return Err(format!("Column '{column}' does not exist."));
                    }
                    let filled = rows
                        .iter()
                        .filter(|r| cell(r, column).is_some_and(|v| !v.is_empty()))
                        .count();
                    if filled == *expected {
                        Ok(())
                    } else {
                        Err(format!("Expected: {expected} but was {filled}"))
                    }
                }
            },
            JdbcValidator::IsNull {
                column,
                row,
                is_null,
            } => {
                if rows.is_empty() {
                    return Err(NO_RESULTS.to_string());
                }
                let r = rows.get(*row).ok_or_else(|| OUT_OF_BOUNDS.to_string())?;
                let value = r
                    .get(column)
                    .ok_or_else(|| format!("Column '{column}' does not exist."))?;
                let empty = value.as_deref().map_or(true, str::is_empty);
                match (is_null, empty) {
                    (true, false) => Err(format!("The column {column} is not null")),
                    (false, true) => Err(format!("The column {column} is null")),
                    _ => Ok(()),
                }
            }
            JdbcValidator::CompareTime {
                first,
                first_row,
                second,
                second_row,
                interval,
                inequality,
            } => {
                if rows.is_empty() {
                    return Err(NO_RESULTS.to_string());
                }
                let first = timestamp_cell(context, rows, first, *first_row)?;
                let second = timestamp_cell(context, rows, second, *second_row)?;
                timestamp::check_interval(first, second, *interval, *inequality)
            }
        }
    }
}

fn cell<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|value| value.as_deref())
}

fn timestamp_cell(
    context: &ExecutionContext,
    rows: &[Row],
    column: &str,
    index: usize,
) -> Result<chrono::NaiveDateTime, String> {
    let row = rows.get(index).ok_or_else(|| {
        format!("Out of bounds. There are only {} results", rows.len())
    })?;
    let value = row
        .get(column)
        .ok_or_else(|| format!("Column '{column}' does not exist."))?
        .as_deref()
        .unwrap_or_default();
    let value = interpolate(value, context).map_err(|e| e.to_string())?;
    timestamp::parse(&value).ok_or_else(|| "There was a error with parsing the time".to_string())
}

enum Matcher<'a> {
    Exact(&'a str),
    Pattern(Regex),
}

impl<'a> Matcher<'a> {
    fn new(expected: &'a str, regex: bool) -> Result<Self, String> {
        if !regex {
            return Ok(Matcher::Exact(expected));
        }
        Regex::new(&format!("^(?:{expected})$"))
            .map(Matcher::Pattern)
            .map_err(|e| format!("Invalid regex '{expected}': {e}"))
    }

    /// `NULL` never matches.
    fn matches(&self, actual: Option<&str>) -> bool {
        match (self, actual) {
            (_, None) => false,
            (Matcher::Exact(expected), Some(actual)) => *expected == actual,
            (Matcher::Pattern(regex), Some(actual)) => regex.is_match(actual),
        }
    }
}
