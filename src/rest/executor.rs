use super::{RestRequest, RestResponse};
use crate::context::ExecutionContext;
use crate::engine::Executor;
use crate::error::EngineError;
use crate::expression::interpolate;
use crate::http::{self, HttpHeader, HttpResponse, OutgoingRequest};
use crate::model::{StepRequest, StepResponse};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info, instrument};

const KIND: &str = "REST";

#[derive(Debug, Default)]
pub struct RestExecutor;

impl RestExecutor {
    async fn send(
        &self,
        request: &RestRequest,
        context: &ExecutionContext,
    ) -> Result<HttpResponse, EngineError> {
        let body = match &request.body {
            Some(body) => Some(interpolate(body, context)?),
            None if request.method.has_body() => {
                return Err(EngineError::NotConfigured {
                    what: "body",
                    kind: KIND,
                })
            }
            None => None,
        };

        let defaults = &context.configuration.rest;
        let endpoint = request
            .endpoint
            .as_ref()
            .or(defaults.endpoint.as_ref())
            .ok_or(EngineError::NotConfigured {
                what: "endpoint",
                kind: KIND,
            })?
            .resolve(&context.configuration)?;

        let path = request
            .path
            .as_deref()
            .map(|path| interpolate(path, context))
            .transpose()?;
        let url = endpoint.resolve_url(path.as_deref())?;

        let mut headers = http::merge_headers(&defaults.headers, &request.headers, context)?;
        if body.is_some() && !headers.iter().any(|h| h.name.eq_ignore_ascii_case("Content-Type")) {
            headers.push(HttpHeader::new("Content-Type", "application/json"));
        }

        let credentials = request
            .credentials
            .clone()
            .or_else(|| endpoint.credentials.clone())
            .or_else(|| defaults.credentials.clone());

        info!(
            "Sending request:\n URL: {} {}\n Data: {}",
            request.method,
            url,
            http::short_text(body.as_deref().unwrap_or_default())
        );

        http::send(OutgoingRequest {
            method: request.method,
            url,
            headers,
            body,
            credentials,
            timeout: Duration::from_secs(context.configuration.timeout),
        })
        .await
    }
}

#[async_trait]
impl Executor<RestRequest, RestResponse> for RestExecutor {
    #[instrument(skip_all, fields(method = %request.method))]
    async fn execute(
        &self,
        request: &RestRequest,
        context: &mut ExecutionContext,
    ) -> Result<RestResponse, EngineError> {
        match self.send(request, context).await {
            Ok(http) => {
                let response = RestResponse::received(http);
                info!(
                    "Response status: {}, body: {}",
                    response.http.as_ref().map_or(0, |h| h.status),
                    http::short_text(&response.body)
                );
                context.record(
                    StepRequest::Rest(request.clone()),
                    Some(StepResponse::Rest(response.clone())),
                );
                Ok(response)
            }
            Err(err) => {
                context.record(StepRequest::Rest(request.clone()), None);
                if err.is_fatal() {
                    return Err(err);
                }
                error!("REST request failed: {}", err);
                Ok(RestResponse::failed(err.to_string()))
            }
        }
    }
}
