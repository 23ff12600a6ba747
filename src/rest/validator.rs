use super::{RestRequest, RestResponse};
use crate::context::ExecutionContext;
use crate::engine::Validator;
use crate::expression::{interpolate, Expression};
use crate::http::{self, StatusRange};
use crate::json::{self, CompareMode, JsonComparator, JsonPathError};
use crate::result::ValidatorResult;
use crate::timestamp::{self, Inequality};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

/// Checks available on REST steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestValidator {
    HttpStatus(StatusRange),
    HttpHeader {
        name: String,
        value: String,
    },
    /// Whole-body comparison.
    Json {
        #[serde(default)]
        mode: CompareMode,
        expected: Expression,
        /// Field path to regex; replaces exact comparison at that path.
        #[serde(default)]
        overrides: HashMap<String, String>,
    },
    /// Compares the sub-document at `path` with the sub-document of
    /// `expected` at `expected_path` (defaults to `path`).
    JsonWithPath {
        path: String,
        expected: Expression,
        #[serde(default)]
        expected_path: Option<String>,
        #[serde(default)]
        mode: CompareMode,
    },
    JsonPath {
        path: String,
        #[serde(default)]
        value: Option<Expression>,
        #[serde(default)]
        regex: bool,
    },
    JsonPathIsNull {
        path: String,
        #[serde(default = "default_true")]
        is_null: bool,
    },
    /// Null check on a JSON document stored in a property.
    JsonPathFromPropertyIsNull {
        property: Expression,
        path: String,
        #[serde(default = "default_true")]
        is_null: bool,
    },
    /// Dates written as `[y, m, d, ...]` arrays or strings, compared as
    /// `YYYY-MM-DD`.
    JsonPathDate {
        path: String,
        value: Expression,
    },
    Contains(Vec<String>),
    CompareTime {
        first: String,
        second: String,
        interval: i64,
        inequality: Inequality,
    },
}

impl Validator<RestRequest, RestResponse> for RestValidator {
    fn name(&self) -> &'static str {
        match self {
            RestValidator::HttpStatus(_) => "HttpStatusValidator",
            RestValidator::HttpHeader { .. } => "HttpHeaderValidator",
            RestValidator::Json { .. } => "JsonValidator",
            RestValidator::JsonWithPath { .. } => "JsonWithPathValidator",
            RestValidator::JsonPath { .. } => "JsonPathValidator",
            RestValidator::JsonPathIsNull { .. } => "JsonPathIsNullValidator",
            RestValidator::JsonPathFromPropertyIsNull { .. } => {
                "JsonPathFromPropertyIsNullValidator"
            }
            RestValidator::JsonPathDate { .. } => "JsonPathDateValidator",
            RestValidator::Contains(_) => "ContainsValidator",
            RestValidator::CompareTime { .. } => "CompareTimeValidator",
        }
    }

    fn validate(
        &self,
        context: &ExecutionContext,
        _request: &RestRequest,
        response: &RestResponse,
    ) -> ValidatorResult {
        match self.check(context, response) {
            Ok(()) => self.success(),
            Err(message) => self.failure(message),
        }
    }
}

impl RestValidator {
    fn check(&self, context: &ExecutionContext, response: &RestResponse) -> Result<(), String> {
        match self {
            RestValidator::HttpStatus(range) => {
                let http = response.http.as_ref().ok_or("Missing response")?;
                http::check_status(range, http)
            }
            RestValidator::HttpHeader { name, value } => {
                let http = response.http.as_ref().ok_or("Missing response")?;
                http::check_header(&http.headers, name, value)
            }
            RestValidator::Json {
                mode,
                expected,
                overrides,
            } => {
                let expected = expected_value(expected, context, self.name())?;
                let expected: Value = serde_json::from_str(&expected)
                    .map_err(|_| JsonPathError::InvalidJson.to_string())?;
                let actual: Value = serde_json::from_str(&response.body)
                    .map_err(|_| JsonPathError::InvalidJson.to_string())?;
                let comparator = JsonComparator::new(*mode)
                    .with_overrides(overrides)
                    .map_err(|e| format!("Invalid override pattern: {e}"))?;
                let failures = comparator.compare(&expected, &actual);
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(format!("JSON failure:\n{}", failures.join("\n")))
                }
            }
            RestValidator::JsonWithPath {
                path,
                expected,
                expected_path,
                mode,
            } => {
                let expected = expected_value(expected, context, self.name())?;
                let expected: Value = serde_json::from_str(&expected)
                    .map_err(|_| JsonPathError::InvalidJson.to_string())?;
                let path = resolve(path, context)?;
                let expected_path = match expected_path {
                    Some(other) => resolve(other, context)?,
                    None => path.clone(),
                };
                let expected = json::read_value(&expected, &expected_path)
                    .map_err(|e| e.to_string())?;
                let actual = json::read(&response.body, &path).map_err(|e| e.to_string())?;
                let failures = JsonComparator::new(*mode).compare(&expected, &actual);
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(format!("JSON failure at {path}:\n{}", failures.join("\n")))
                }
            }
            RestValidator::JsonPath { path, value, regex } => {
                let expected = match value {
                    Some(value) => expected_value(value, context, self.name())?,
                    None => return Err(format!("{} is missing expected value", self.name())),
                };
                let path = resolve(path, context)?;
                let actual = json::read(&response.body, &path).map_err(|e| e.to_string())?;
                if *regex {
                    let pattern = Regex::new(&format!("^(?:{expected})$"))
                        .map_err(|e| format!("Invalid regex '{expected}': {e}"))?;
                    if pattern.is_match(&json::render(&actual)) {
                        return Ok(());
                    }
                } else if json_matches(&expected, &actual) {
                    return Ok(());
                }
                Err(format!("Expected: {expected} but was: {}", json::render(&actual)))
            }
            RestValidator::JsonPathIsNull { path, is_null } => {
                let path = resolve(path, context)?;
                let actual = json::read(&response.body, &path).map_err(|e| e.to_string())?;
                check_null(&path, &actual, *is_null)
            }
            RestValidator::JsonPathFromPropertyIsNull {
                property,
                path,
                is_null,
            } => {
                let document = expected_value(property, context, self.name())?;
                let path = resolve(path, context)?;
                let actual = json::read(&document, &path).map_err(|e| e.to_string())?;
                check_null(&path, &actual, *is_null)
            }
            RestValidator::JsonPathDate { path, value } => {
                let expected = expected_value(value, context, self.name())?;
                let path = resolve(path, context)?;
                let actual = json::read(&response.body, &path).map_err(|e| e.to_string())?;
                let rendered = match &actual {
                    Value::Array(_) => timestamp::from_json(&actual)
                        .map(|ts| ts.format("%Y-%m-%d").to_string())
                        .ok_or_else(|| format!("Can not parse date: {actual}"))?,
                    Value::String(text) => text.clone(),
                    other => return Err(format!("Expected: {expected} but was: {other}")),
                };
                if rendered == expected {
                    Ok(())
                } else {
                    Err(format!("Expected: {expected} but was: {rendered}"))
                }
            }
            RestValidator::Contains(fragments) => {
                let mut missing = Vec::new();
                for fragment in fragments {
                    let fragment = resolve(fragment, context)?;
                    if !response.body.contains(&fragment) {
                        missing.push(fragment);
                    }
                }
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(format!("Response does not contain {missing:?}"))
                }
            }
            RestValidator::CompareTime {
                first,
                second,
                interval,
                inequality,
            } => {
                let read_time = |path: &str| -> Result<_, String> {
                    let path = resolve(path, context)?;
                    Ok(json::read(&response.body, &path)
                        .ok()
                        .and_then(|value| timestamp::from_json(&value)))
                };
                match (read_time(first)?, read_time(second)?) {
                    (Some(first), Some(second)) => {
                        timestamp::check_interval(first, second, *interval, *inequality)
                    }
                    _ => Err(
                        "The result can not be compared because it is not a known date format or the value is null"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

fn resolve(text: &str, context: &ExecutionContext) -> Result<String, String> {
    interpolate(text, context).map_err(|e| e.to_string())
}

fn expected_value(
    expression: &Expression,
    context: &ExecutionContext,
    validator: &str,
) -> Result<String, String> {
    let value = expression
        .evaluate(context)
        .ok_or_else(|| format!("{validator} is missing expected value"))?;
    resolve(&value, context)
}

fn json_matches(expected: &str, actual: &Value) -> bool {
    json::render(actual) == expected
        || actual.to_string() == expected
        || serde_json::from_str::<Value>(expected).is_ok_and(|parsed| &parsed == actual)
}

fn check_null(path: &str, actual: &Value, expect_null: bool) -> Result<(), String> {
    match (expect_null, actual.is_null()) {
        (true, true) | (false, false) => Ok(()),
        (true, false) => Err(format!("Expected {path} to be null but was: {actual}")),
        (false, true) => Err(format!("Expected {path} not to be null")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestConfiguration;
    use crate::http::{HttpHeader, HttpResponse};
    use crate::model::Step;

    const BODY: &str = r#"[{"foo":{"bar":[2018,29,10]},"test":null,"day":[2018,10,29],
        "created":"2018-10-29 10:15:00","updated":"2018-10-29 10:15:01","name":"alice"}]"#;

    fn response() -> RestResponse {
        RestResponse::received(HttpResponse {
            status: 200,
            headers: vec![HttpHeader::new("content-type", "application/json")],
            data: BODY.as_bytes().to_vec(),
            parts: vec![],
        })
    }

    fn run(validator: RestValidator) -> ValidatorResult {
        let context = ExecutionContext::new(TestConfiguration::default());
        validator.validate(&context, &RestRequest::default(), &response())
    }

    #[test]
    fn status_and_header() {
        assert!(run(RestValidator::HttpStatus(StatusRange::exact(200))).success);
        assert!(!run(RestValidator::HttpStatus(StatusRange::exact(404))).success);
        assert!(run(RestValidator::HttpHeader {
            name: "Content-Type".into(),
            value: "application/json".into()
        })
        .success);
    }

    #[test]
    fn json_sub_documents_compared_by_path() {
        let same = run(RestValidator::JsonWithPath {
            path: "$[0].foo".into(),
            expected: Expression::constant(r#"{"data":{"bar":[2018,29,10]}}"#),
            expected_path: Some("$.data".into()),
            mode: CompareMode::Strict,
        });
        assert!(same.success, "{:?}", same.message);

        let shared_path = run(RestValidator::JsonWithPath {
            path: "$[0].foo".into(),
            expected: Expression::constant(r#"[{"foo":{"bar":[2018,29,11]}}]"#),
            expected_path: None,
            mode: CompareMode::Strict,
        });
        assert!(shared_path.message.unwrap().starts_with("JSON failure at $[0].foo"));

        let missing = run(RestValidator::JsonWithPath {
            path: "$[0].absent".into(),
            expected: Expression::constant(r#"{"absent":1}"#),
            expected_path: Some("$.absent".into()),
            mode: CompareMode::Lenient,
        });
        assert!(missing.message.unwrap().contains("no results"));
    }

    #[test]
    fn json_path_length_and_values() {
        let length = run(RestValidator::JsonPath {
            path: "$[0].foo.bar.length()".into(),
            value: Some(Expression::constant("3")),
            regex: false,
        });
        assert!(length.success, "{:?}", length.message);

        let wrong = run(RestValidator::JsonPath {
            path: "$[0].name".into(),
            value: Some(Expression::constant("bob")),
            regex: false,
        });
        assert_eq!(wrong.message.as_deref(), Some("Expected: bob but was: alice"));

        assert!(run(RestValidator::JsonPath {
            path: "$[0].name".into(),
            value: Some(Expression::constant("al.*")),
            regex: true,
        })
        .success);

        assert!(run(RestValidator::JsonPath {
            path: "$[0].foo.bar".into(),
            value: Some(Expression::constant("[2018, 29, 10]")),
            regex: false,
        })
        .success);
    }

    #[test]
    fn json_path_missing_expected_and_no_results() {
        let missing = run(RestValidator::JsonPath {
            path: "$[0].name".into(),
            value: Some(Expression::property("unset")),
            regex: false,
        });
        assert!(missing.message.unwrap().contains("missing expected value"));

        let none = run(RestValidator::JsonPath {
            path: "$[5].name".into(),
            value: Some(Expression::constant("x")),
            regex: false,
        });
        assert!(none.message.unwrap().contains("returned no results"));
    }

    #[test]
    fn null_checks() {
        assert!(run(RestValidator::JsonPathIsNull {
            path: "$[0].test".into(),
            is_null: true
        })
        .success);
        assert!(!run(RestValidator::JsonPathIsNull {
            path: "$[0].name".into(),
            is_null: true
        })
        .success);
        assert!(run(RestValidator::JsonPathIsNull {
            path: "$[0].name".into(),
            is_null: false
        })
        .success);
    }

    #[test]
    fn null_check_on_property_document() {
        let mut context = ExecutionContext::new(TestConfiguration::default());
        context
            .properties
            .set("saved", Some(r#"{"a":null,"b":1}"#.to_string()));
        let validator = RestValidator::JsonPathFromPropertyIsNull {
            property: Expression::property("saved"),
            path: "$.a".into(),
            is_null: true,
        };
        assert!(validator
            .validate(&context, &RestRequest::default(), &response())
            .success);
    }

    #[test]
    fn date_arrays_and_contains() {
        assert!(run(RestValidator::JsonPathDate {
            path: "$[0].day".into(),
            value: Expression::constant("2018-10-29"),
        })
        .success);
        assert!(run(RestValidator::Contains(vec!["alice".into(), "foo".into()])).success);
        let missing = run(RestValidator::Contains(vec!["bob".into()]));
        assert!(missing.message.unwrap().contains("bob"));
    }

    #[test]
    fn compare_time_between_fields() {
        let within = run(RestValidator::CompareTime {
            first: "$[0].updated".into(),
            second: "$[0].created".into(),
            interval: 1001,
            inequality: Inequality::LessThan,
        });
        assert!(within.success);
        let outside = run(RestValidator::CompareTime {
            first: "$[0].created".into(),
            second: "$[0].updated".into(),
            interval: 999,
            inequality: Inequality::LessThan,
        });
        assert!(outside.message.unwrap().contains("1000 ms"));
    }

    #[test]
    fn whole_document_comparison() {
        let lenient = run(RestValidator::Json {
            mode: CompareMode::Lenient,
            expected: Expression::constant(r#"[{"name":"alice","foo":"**"}]"#),
            overrides: HashMap::new(),
        });
        assert!(lenient.success, "{:?}", lenient.message);

        let strict = run(RestValidator::Json {
            mode: CompareMode::Strict,
            expected: Expression::constant(r#"[{"name":"alice"}]"#),
            overrides: HashMap::new(),
        });
        assert!(strict.message.unwrap().starts_with("JSON failure"));
    }

    #[test]
    fn validators_from_yaml() {
        let yaml = r#"
type: rest
request: {method: GET, path: /items}
validate:
- http_status: {min: 200, max: 299}
- json_path_is_null: {path: "$[0].test"}
- contains: [alice]
- compare_time: {first: "$.a", second: "$.b", interval: 10, inequality: greater_than}
- json: {mode: non_extensible, expected: "{}", overrides: {"id": ".*"}}
"#;
        let validators = match serde_yaml::from_str::<Step>(yaml).unwrap() {
            Step::Rest(step) => step.validate,
            other => panic!("unexpected step {other:?}"),
        };
        assert_eq!(validators.len(), 5);
        assert!(matches!(
            validators[1],
            RestValidator::JsonPathIsNull { is_null: true, .. }
        ));
    }
}
