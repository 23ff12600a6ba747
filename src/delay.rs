//! Pause between steps.

use crate::context::ExecutionContext;
use crate::engine::Executor;
use crate::error::EngineError;
use crate::model::{StepRequest, StepResponse};
use crate::result::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayRequest {
    pub millis: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DelayResponse;

impl Outcome for DelayResponse {
    fn success(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct DelayExecutor;

#[async_trait]
impl Executor<DelayRequest, DelayResponse> for DelayExecutor {
    async fn execute(
        &self,
        request: &DelayRequest,
        context: &mut ExecutionContext,
    ) -> Result<DelayResponse, EngineError> {
        info!("Delay: {} ms", request.millis);
        tokio::time::sleep(Duration::from_millis(request.millis)).await;
        context.record(
            StepRequest::Delay(request.clone()),
            Some(StepResponse::Delay(DelayResponse)),
        );
        Ok(DelayResponse)
    }
}
