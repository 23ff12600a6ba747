//! Step execution pipeline: executors, validators and after-actions.

use crate::context::ExecutionContext;
use crate::delay::DelayExecutor;
use crate::error::EngineError;
use crate::jdbc::JdbcExecutor;
use crate::model::{Nothing, Step, StepKind, TestCase, TestStep, TestSuite};
use crate::property::PropertyExecutor;
use crate::rest::RestExecutor;
use crate::result::{AfterResult, Outcome, Results, StepResult, TestResult, ValidatorResult};
use crate::soap::SoapExecutor;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Performs the protocol action of one step kind.
///
/// Implementations convert every non-fatal failure into a failed
/// response; `Err` is reserved for errors that abort the run.
#[async_trait]
pub trait Executor<Req: Sync, Resp>: Send + Sync {
    async fn execute(
        &self,
        request: &Req,
        context: &mut ExecutionContext,
    ) -> Result<Resp, EngineError>;
}

/// A pure check of a response.
pub trait Validator<Req, Resp> {
    fn name(&self) -> &'static str;

    fn validate(
        &self,
        context: &ExecutionContext,
        request: &Req,
        response: &Resp,
    ) -> ValidatorResult;

    fn success(&self) -> ValidatorResult {
        ValidatorResult::success(self.name())
    }

    fn failure(&self, message: impl Into<String>) -> ValidatorResult
    where
        Self: Sized,
    {
        ValidatorResult::failure(self.name(), message)
    }
}

/// Post-step extraction of a value into a configuration property.
pub trait After<Req, Resp> {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        context: &mut ExecutionContext,
        request: &Req,
        response: &Resp,
    ) -> AfterResult;
}

impl<Req, Resp> Validator<Req, Resp> for Nothing {
    fn name(&self) -> &'static str {
        match *self {}
    }

    fn validate(&self, _: &ExecutionContext, _: &Req, _: &Resp) -> ValidatorResult {
        match *self {}
    }
}

impl<Req, Resp> After<Req, Resp> for Nothing {
    fn name(&self) -> &'static str {
        match *self {}
    }

    fn apply(&self, _: &mut ExecutionContext, _: &Req, _: &Resp) -> AfterResult {
        match *self {}
    }
}

/// Runs whole suites.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, suite: &TestSuite) -> Results;
}

/// Dispatch table from step kind to executor.
#[derive(Debug, Default)]
pub struct Engine {
    soap: SoapExecutor,
    rest: RestExecutor,
    jdbc: JdbcExecutor,
    delay: DelayExecutor,
    property: PropertyExecutor,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tests` in order against a caller-owned context.
    pub async fn run_tests(&self, tests: &[TestCase], context: &mut ExecutionContext) -> Results {
        let mut results = Results::default();

        for test in tests {
            info!("Running {}", test.name);
            let start = Instant::now();
            let mut steps = Vec::with_capacity(test.steps.len());

            for (idx, step) in test.steps.iter().enumerate() {
                info!(
                    "Step {}/{}: {}",
                    idx + 1,
                    test.steps.len(),
                    step.name().unwrap_or(step.kind().label())
                );
                match self.run_step(step, context).await {
                    Ok(result) => steps.push(result),
                    Err(err) => {
                        error!("Aborting run in test '{}': {}", test.name, err);
                        results.tests.push(TestResult {
                            name: test.name.clone(),
                            steps,
                            duration_ms: start.elapsed().as_millis() as u64,
                        });
                        results.aborted = Some(err.to_string());
                        return results;
                    }
                }
            }

            let result = TestResult {
                name: test.name.clone(),
                steps,
                duration_ms: start.elapsed().as_millis() as u64,
            };
            info!(
                "Test finished: {} ({} ms) - Success: {}",
                result.name,
                result.duration_ms,
                result.success()
            );
            results.tests.push(result);
        }

        results
    }

    /// Execute one step of any kind.
    pub async fn run_step(
        &self,
        step: &Step,
        context: &mut ExecutionContext,
    ) -> Result<StepResult, EngineError> {
        match step {
            Step::Soap(s) => run_typed(&self.soap, s, StepKind::Soap, context).await,
            Step::Rest(s) => run_typed(&self.rest, s, StepKind::Rest, context).await,
            Step::Jdbc(s) => run_typed(&self.jdbc, s, StepKind::Jdbc, context).await,
            Step::Delay(s) => run_typed(&self.delay, s, StepKind::Delay, context).await,
            Step::Property(s) => run_typed(&self.property, s, StepKind::Property, context).await,
        }
    }
}

#[async_trait]
impl TestRunner for Engine {
    #[instrument(skip(self, suite), fields(name = %suite.name))]
    async fn run(&self, suite: &TestSuite) -> Results {
        info!("Executing {}", suite.name);
        let mut context = ExecutionContext::new(suite.config.clone());
        self.run_tests(&suite.tests, &mut context).await
    }
}

/// Execute, then validate every validator without short-circuiting, then
/// run after-actions when the step fully succeeded.
async fn run_typed<Req, Resp, V, A, E>(
    executor: &E,
    step: &TestStep<Req, V, A>,
    kind: StepKind,
    context: &mut ExecutionContext,
) -> Result<StepResult, EngineError>
where
    Req: Sync,
    Resp: Outcome + Send,
    V: Validator<Req, Resp> + Sync,
    A: After<Req, Resp> + Sync,
    E: Executor<Req, Resp>,
{
    let start = Instant::now();
    let response = executor.execute(&step.request, context).await?;

    if !response.success() {
        let message = response.message().map(str::to_string);
        warn!(
            "{} step failed: {}",
            kind,
            message.as_deref().unwrap_or("unknown error")
        );
        return Ok(StepResult {
            name: step.name.clone(),
            kind,
            request_success: false,
            error: message,
            validation_results: Vec::new(),
            after_results: Vec::new(),
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }

    let validation_results: Vec<ValidatorResult> = step
        .validate
        .iter()
        .map(|validator| validator.validate(context, &step.request, &response))
        .collect();

    let validated = validation_results.iter().all(|r| r.success);
    let after_results = if validated {
        step.after
            .iter()
            .map(|action| action.apply(context, &step.request, &response))
            .collect()
    } else {
        if !step.after.is_empty() {
            info!("Skipping {} after-action(s) of failed step", step.after.len());
        }
        Vec::new()
    };

    for failed in after_results.iter().filter(|r: &&AfterResult| !r.success) {
        warn!(
            "After-action {} failed: {}",
            failed.action,
            failed.message.as_deref().unwrap_or("")
        );
    }

    Ok(StepResult {
        name: step.name.clone(),
        kind,
        request_success: true,
        error: None,
        validation_results,
        after_results,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestConfiguration;
    use crate::delay::DelayRequest;
    use crate::expression::Expression;
    use crate::jdbc::{JdbcAfter, JdbcRequest, JdbcValidator};
    use crate::model::{DelayStep, JdbcStep, PropertyStep, SoapStep};
    use crate::property::PropertyRequest;
    use crate::soap::SoapRequest;

    #[tokio::test]
    async fn property_steps_chain_values() {
        let test = TestCase::new("chain")
            .step(PropertyStep::new(PropertyRequest::new(
                "first",
                Expression::constant("a"),
            )))
            .step(PropertyStep::new(PropertyRequest::new(
                "second",
                Expression::property("first") + Expression::constant("b"),
            )));
        let mut context = ExecutionContext::new(TestConfiguration::default());

        let results = Engine::new().run_tests(&[test], &mut context).await;

        assert!(results.success());
        assert_eq!(context.properties.get("second"), Some("ab"));
    }

    #[tokio::test]
    async fn failed_execution_skips_validators_and_continues() {
        let soap = SoapStep::new(SoapRequest::default())
            .named("no endpoint")
            .validate(crate::soap::SoapValidator::SoapFault(false));
        let test = TestCase::new("mixed")
            .step(soap)
            .step(DelayStep::new(DelayRequest { millis: 1 }));
        let mut context = ExecutionContext::new(TestConfiguration::default());

        let results = Engine::new().run_tests(&[test], &mut context).await;

        let steps = &results.tests[0].steps;
        assert_eq!(steps.len(), 2);
        assert!(!steps[0].request_success);
        assert!(steps[0].validation_results.is_empty());
        assert!(steps[0].error.as_deref().unwrap().contains("No body configured"));
        assert!(steps[1].success());
        assert!(!results.success());
        assert!(results.aborted.is_none());
    }

    #[tokio::test]
    async fn fatal_error_aborts_but_keeps_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut configuration = TestConfiguration::default();
        configuration.resource_dir = dir.path().to_path_buf();
        configuration.add_endpoint(crate::context::Endpoint::named("svc", "http://127.0.0.1:9"));
        configuration.soap.endpoint = Some(crate::context::EndpointRef::Named("svc".into()));

        let first = TestCase::new("first").step(DelayStep::new(DelayRequest { millis: 0 }));
        let second = TestCase::new("second")
            .step(SoapStep::new(SoapRequest::text("<a>%{missing.bin}</a>")))
            .step(DelayStep::new(DelayRequest { millis: 0 }));
        let third = TestCase::new("third").step(DelayStep::new(DelayRequest { millis: 0 }));
        let mut context = ExecutionContext::new(configuration);

        let results = Engine::new()
            .run_tests(&[first, second, third], &mut context)
            .await;

        assert_eq!(results.tests.len(), 2);
        assert!(results.tests[0].success());
        assert!(results.tests[1].steps.is_empty());
        assert!(results.aborted.as_deref().unwrap().contains("Failed to load file"));
        assert!(!results.success());
    }

    #[tokio::test]
    async fn after_action_is_visible_from_the_next_step_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('x');")
            .unwrap();
        let mut configuration = TestConfiguration::default();
        configuration.jdbc.driver = Some("sqlite".into());
        configuration.jdbc.url = Some(format!("jdbc:sqlite:{}", path.display()));

        // Matches only while `p` is still unset.
        let assign = JdbcStep::new(JdbcRequest::query("SELECT v FROM t"))
            .validate(JdbcValidator::Column {
                column: "v".into(),
                row: None,
                value: Some(Expression::constant("x#{p}")),
                regex: false,
            })
            .after(JdbcAfter::Column {
                column: "v".into(),
                row: 0,
                property: "p".into(),
            });
        let read = PropertyStep::new(PropertyRequest::new("seen", Expression::property("p")));
        let test = TestCase::new("visibility").step(assign).step(read);
        let mut context = ExecutionContext::new(configuration);

        let results = Engine::new().run_tests(&[test], &mut context).await;

        assert!(results.success(), "{:?}", results.tests[0].steps[0]);
        assert_eq!(results.tests[0].steps[0].after_results.len(), 1);
        assert_eq!(context.property("seen"), Some("x"));
    }
}
