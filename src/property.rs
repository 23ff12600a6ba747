//! Steps that assign an evaluated expression to a run-local property.

use crate::context::ExecutionContext;
use crate::engine::Executor;
use crate::error::EngineError;
use crate::expression::Expression;
use crate::model::{StepRequest, StepResponse};
use crate::result::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRequest {
    pub name: String,
    pub value: Expression,
}

impl PropertyRequest {
    pub fn new(name: impl Into<String>, value: Expression) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The evaluated value; `None` when the expression referenced an unset
/// property.
#[derive(Debug, Clone, Default)]
pub struct PropertyResponse {
    pub value: Option<String>,
}

impl Outcome for PropertyResponse {
    fn success(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct PropertyExecutor;

#[async_trait]
impl Executor<PropertyRequest, PropertyResponse> for PropertyExecutor {
    async fn execute(
        &self,
        request: &PropertyRequest,
        context: &mut ExecutionContext,
    ) -> Result<PropertyResponse, EngineError> {
        let value = request.value.evaluate(context);
        info!(
            "Property {} = {}",
            request.name,
            value.as_deref().unwrap_or("null")
        );
        context.properties.set(&request.name, value.clone());
        let response = PropertyResponse { value };
        context.record(
            StepRequest::Property(request.clone()),
            Some(StepResponse::Property(response.clone())),
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestConfiguration;

    #[tokio::test]
    async fn assigns_evaluated_value() {
        let mut configuration = TestConfiguration::default();
        configuration.properties.set("host", Some("example.org".into()));
        let mut context = ExecutionContext::new(configuration);

        let request = PropertyRequest::new(
            "url",
            Expression::constant("https://") + Expression::property("host"),
        );
        let response = PropertyExecutor.execute(&request, &mut context).await.unwrap();

        assert_eq!(response.value.as_deref(), Some("https://example.org"));
        assert_eq!(context.properties.get("url"), Some("https://example.org"));
    }

    #[tokio::test]
    async fn unset_reference_clears_the_property() {
        let mut context = ExecutionContext::new(TestConfiguration::default());
        context.properties.set("target", Some("old".into()));

        let request = PropertyRequest::new("target", Expression::property("missing"));
        let response = PropertyExecutor.execute(&request, &mut context).await.unwrap();

        assert!(response.success());
        assert_eq!(context.property("target"), None);
    }
}
