//! Test definition model: suites, test cases and typed steps.

use crate::context::TestConfiguration;
use crate::delay::{DelayRequest, DelayResponse};
use crate::jdbc::{JdbcAfter, JdbcRequest, JdbcResponse, JdbcValidator};
use crate::property::{PropertyRequest, PropertyResponse};
use crate::rest::{RestAfter, RestRequest, RestResponse, RestValidator};
use crate::soap::{SoapAfter, SoapRequest, SoapResponse, SoapValidator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A suite file: shared configuration plus ordered test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: TestConfiguration,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config: TestConfiguration::default(),
            tests: Vec::new(),
        }
    }

    pub fn test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    /// Deserialize a suite from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize the suite to a YAML string.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Named, ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl Into<Step>) -> Self {
        self.steps.push(step.into());
        self
    }
}

/// One request plus the validators and after-actions bound to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    deserialize = "Req: Deserialize<'de>, V: Deserialize<'de>, A: Deserialize<'de>"
))]
pub struct TestStep<Req, V, A> {
    #[serde(default)]
    pub name: Option<String>,
    pub request: Req,
    #[serde(default)]
    pub validate: Vec<V>,
    #[serde(default)]
    pub after: Vec<A>,
}

impl<Req, V, A> TestStep<Req, V, A> {
    pub fn new(request: Req) -> Self {
        Self {
            name: None,
            request,
            validate: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn validate(mut self, validator: V) -> Self {
        self.validate.push(validator);
        self
    }

    pub fn after(mut self, action: A) -> Self {
        self.after.push(action);
        self
    }
}

/// Placeholder for steps that accept no validators or after-actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Nothing {}

/// Document an after-action reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Response,
    Request,
}

pub type SoapStep = TestStep<SoapRequest, SoapValidator, SoapAfter>;
pub type RestStep = TestStep<RestRequest, RestValidator, RestAfter>;
pub type JdbcStep = TestStep<JdbcRequest, JdbcValidator, JdbcAfter>;
pub type DelayStep = TestStep<DelayRequest, Nothing, Nothing>;
pub type PropertyStep = TestStep<PropertyRequest, Nothing, Nothing>;

/// A step of any adapter kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    Soap(SoapStep),
    Rest(RestStep),
    Jdbc(JdbcStep),
    Delay(DelayStep),
    Property(PropertyStep),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Soap(_) => StepKind::Soap,
            Step::Rest(_) => StepKind::Rest,
            Step::Jdbc(_) => StepKind::Jdbc,
            Step::Delay(_) => StepKind::Delay,
            Step::Property(_) => StepKind::Property,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Step::Soap(s) => s.name.as_deref(),
            Step::Rest(s) => s.name.as_deref(),
            Step::Jdbc(s) => s.name.as_deref(),
            Step::Delay(s) => s.name.as_deref(),
            Step::Property(s) => s.name.as_deref(),
        }
    }
}

macro_rules! step_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Step {
            fn from(step: $ty) -> Self {
                Step::$variant(step)
            }
        }
    };
}

step_from!(Soap, SoapStep);
step_from!(Rest, RestStep);
step_from!(Jdbc, JdbcStep);
step_from!(Delay, DelayStep);
step_from!(Property, PropertyStep);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Soap,
    Rest,
    Jdbc,
    Delay,
    Property,
}

impl StepKind {
    pub fn label(self) -> &'static str {
        match self {
            StepKind::Soap => "SOAP",
            StepKind::Rest => "REST",
            StepKind::Jdbc => "JDBC",
            StepKind::Delay => "Delay",
            StepKind::Property => "Property",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The request of the last executed step.
#[derive(Debug, Clone)]
pub enum StepRequest {
    Soap(SoapRequest),
    Rest(RestRequest),
    Jdbc(JdbcRequest),
    Delay(DelayRequest),
    Property(PropertyRequest),
}

/// The response of the last successfully executed step.
#[derive(Debug, Clone)]
pub enum StepResponse {
    Soap(SoapResponse),
    Rest(RestResponse),
    Jdbc(JdbcResponse),
    Delay(DelayResponse),
    Property(PropertyResponse),
}
