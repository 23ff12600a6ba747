//! Expression model, evaluation and `#{name}` / `%{path}` token
//! interpolation.

use crate::context::ExecutionContext;
use crate::error::EngineError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Add;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

static PROPERTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\{([0-9a-zA-Z_-]+)\}")
        .expect("failed to compile property token regex")
});

static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\{([0-9a-zA-Z./_-]+)\}")
        .expect("failed to compile file token regex")
});

/// A value that may be resolved at execution time.
///
/// In suite files an expression is written as a plain scalar
/// (constant), `{property: name}` or `{concat: [first, second]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ExpressionRepr", into = "ExpressionRepr")]
pub enum Expression {
    Constant(String),
    Property(String),
    Composite(Box<Expression>, Box<Expression>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ExpressionRepr {
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Property { property: String },
    Concat { concat: (Expression, Expression) },
}

impl From<ExpressionRepr> for Expression {
    fn from(repr: ExpressionRepr) -> Self {
        match repr {
            ExpressionRepr::Text(s) => Expression::Constant(s),
            ExpressionRepr::Bool(b) => Expression::Constant(b.to_string()),
            ExpressionRepr::Int(i) => Expression::Constant(i.to_string()),
            ExpressionRepr::Float(f) => Expression::Constant(f.to_string()),
            ExpressionRepr::Property { property } => Expression::Property(property),
            ExpressionRepr::Concat {
                concat: (first, second),
            } => Expression::Composite(Box::new(first), Box::new(second)),
        }
    }
}

impl From<Expression> for ExpressionRepr {
    fn from(expression: Expression) -> Self {
        match expression {
            Expression::Constant(s) => ExpressionRepr::Text(s),
            Expression::Property(property) => ExpressionRepr::Property { property },
            Expression::Composite(first, second) => ExpressionRepr::Concat {
                concat: (*first, *second),
            },
        }
    }
}

impl Expression {
    pub fn constant(value: impl Into<String>) -> Self {
        Expression::Constant(value.into())
    }

    pub fn property(name: impl Into<String>) -> Self {
        Expression::Property(name.into())
    }

    /// Resolve against the two-tier property scope of `context`.
    ///
    /// Returns `None` only when a referenced property is unset.
    pub fn evaluate(&self, context: &ExecutionContext) -> Option<String> {
        match self {
            Expression::Constant(value) => Some(value.clone()),
            Expression::Property(name) => context.property(name).map(str::to_string),
            Expression::Composite(first, second) => {
                let first = first.evaluate(context)?;
                let second = second.evaluate(context)?;
                Some(first + &second)
            }
        }
    }
}

impl Add for Expression {
    type Output = Expression;

    fn add(self, other: Expression) -> Expression {
        Expression::Composite(Box::new(self), Box::new(other))
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::Constant(value.to_string())
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Expression::Constant(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(value) => write!(f, "{value}"),
            Expression::Property(name) => write!(f, "#{{{name}}}"),
            Expression::Composite(first, second) => write!(f, "{first}{second}"),
        }
    }
}

/// Every `%{path}` token in `text`, paired with its path.
pub fn find_files(text: &str) -> Vec<(String, String)> {
    FILE_RE
        .captures_iter(text)
        .map(|caps| (caps[0].to_string(), caps[1].to_string()))
        .collect()
}

/// Replace property tokens, then file tokens, in `text`.
///
/// Unresolved properties become the empty string and log a warning.
/// Each `%{path}` is replaced by the base64 encoding of the file under
/// the configured resource directory; a missing file is fatal.
pub fn interpolate(text: &str, context: &ExecutionContext) -> Result<String, EngineError> {
    let with_properties = PROPERTY_RE
        .replace_all(text, |caps: &regex::Captures| {
            match context.property(&caps[1]) {
                Some(value) => value.to_string(),
                None => {
                    warn!("Property evaluated to empty string: {}", &caps[0]);
                    String::new()
                }
            }
        })
        .into_owned();

    let files = find_files(&with_properties);
    if files.is_empty() {
        return Ok(with_properties);
    }

    let mut encoded: HashMap<String, String> = HashMap::new();
    for (_, path) in files {
        if !encoded.contains_key(&path) {
            let bytes = load_resource(&context.configuration.resource_dir, &path)?;
            debug!("Including file '{}' ({} bytes)", path, bytes.len());
            encoded.insert(path, STANDARD.encode(bytes));
        }
    }

    Ok(FILE_RE
        .replace_all(&with_properties, |caps: &regex::Captures| {
            encoded.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

/// Read a file relative to `resource_dir`.
pub fn load_resource(resource_dir: &Path, path: &str) -> Result<Vec<u8>, EngineError> {
    let full = resource_dir.join(path);
    std::fs::read(&full).map_err(|_| EngineError::MissingFile(full.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestConfiguration;

    fn context_with(pairs: &[(&str, &str)]) -> ExecutionContext {
        let mut context = ExecutionContext::new(TestConfiguration::default());
        for (k, v) in pairs {
            context.properties.set(*k, Some(v.to_string()));
        }
        context
    }

    #[test]
    fn constant_evaluates_to_itself() {
        let context = context_with(&[]);
        assert_eq!(
            Expression::constant("abc").evaluate(&context),
            Some("abc".into())
        );
    }

    #[test]
    fn property_falls_back_to_configuration() {
        let mut configuration = TestConfiguration::default();
        configuration.properties.set("global", Some("g".into()));
        let context = ExecutionContext::new(configuration);
        assert_eq!(
            Expression::property("global").evaluate(&context),
            Some("g".into())
        );
        assert_eq!(Expression::property("unset").evaluate(&context), None);
    }

    #[test]
    fn composite_concatenates_or_is_absent() {
        let context = context_with(&[("name", "world")]);
        let expr = Expression::constant("hello ") + Expression::property("name");
        assert_eq!(expr.evaluate(&context), Some("hello world".into()));

        let missing = Expression::constant("hello ") + Expression::property("nobody");
        assert_eq!(missing.evaluate(&context), None);
    }

    #[test]
    fn only_well_formed_tokens_are_replaced() {
        let context = context_with(&[("one", "1"), ("two-2", "2")]);
        let out = interpolate("a #{one} b #{two-2} c #{bad token}", &context).unwrap();
        assert_eq!(out, "a 1 b 2 c #{bad token}");
    }

    #[test]
    fn interpolation_replaces_every_occurrence() {
        let context = context_with(&[("id", "42")]);
        let out = interpolate("/users/#{id}?again=#{id}", &context).unwrap();
        assert_eq!(out, "/users/42?again=42");
    }

    #[test]
    fn unresolved_property_becomes_empty() {
        let context = context_with(&[]);
        assert_eq!(interpolate("[#{nothing}]", &context).unwrap(), "[]");
    }

    #[test]
    fn interpolation_is_idempotent() {
        let context = context_with(&[("x", "plain")]);
        let once = interpolate("#{x}-#{x}", &context).unwrap();
        let twice = interpolate(&once, &context).unwrap();
        assert_eq!(once, twice);
        assert!(!twice.contains("#{"));
    }

    #[test]
    fn values_are_not_substituted_twice() {
        let context = context_with(&[("a", "#{b}"), ("b", "B")]);
        assert_eq!(interpolate("#{a}", &context).unwrap(), "#{b}");
    }

    #[test]
    fn file_tokens_are_base64_encoded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hello").unwrap();
        let mut context = context_with(&[("file", "hello.txt")]);
        context.configuration.resource_dir = dir.path().to_path_buf();

        let out = interpolate("<data>%{#{file}}</data>", &context).unwrap();
        assert_eq!(out, "<data>aGVsbG8=</data>");
    }

    #[test]
    fn missing_file_is_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = context_with(&[]);
        context.configuration.resource_dir = dir.path().to_path_buf();

        let err = interpolate("%{absent.bin}", &context).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn expressions_deserialize_from_yaml_shapes() {
        let constant: Expression = serde_yaml::from_str("\"abc\"").unwrap();
        assert_eq!(constant, Expression::constant("abc"));

        let number: Expression = serde_yaml::from_str("3").unwrap();
        assert_eq!(number, Expression::constant("3"));

        let property: Expression = serde_yaml::from_str("property: city").unwrap();
        assert_eq!(property, Expression::property("city"));

        let composite: Expression =
            serde_yaml::from_str("concat: [\"id-\", {property: id}]").unwrap();
        assert_eq!(
            composite,
            Expression::constant("id-") + Expression::property("id")
        );
    }
}
