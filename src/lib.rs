//! Declarative SOAP, REST and JDBC step testing.
//!
//! A [`TestSuite`] holds ordered test cases whose steps each run one
//! request, check the response with validators and copy values into
//! properties for later steps. The [`Engine`] executes suites and produces
//! [`Results`].

pub mod config;
pub mod context;
pub mod delay;
pub mod engine;
pub mod error;
pub mod expression;
pub mod http;
pub mod jdbc;
pub mod json;
pub mod model;
pub mod properties;
pub mod property;
pub mod rest;
pub mod result;
pub mod soap;
pub mod timestamp;
pub mod xml;

pub use config::SuiteLoader;
pub use context::{Credentials, Endpoint, EndpointRef, ExecutionContext, TestConfiguration};
pub use engine::{After, Engine, Executor, TestRunner, Validator};
pub use error::EngineError;
pub use expression::Expression;
pub use model::*;
pub use properties::PropertyBag;
pub use result::{Outcome, Results, StepResult, TestResult, TextResultWriter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
