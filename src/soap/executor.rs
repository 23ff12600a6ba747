use super::{SoapRequest, SoapResponse};
use crate::context::{Endpoint, ExecutionContext};
use crate::engine::Executor;
use crate::error::EngineError;
use crate::expression::interpolate;
use crate::http::{self, HttpHeader, HttpMethod, HttpResponse, OutgoingRequest};
use crate::model::{StepRequest, StepResponse};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info, instrument};

const KIND: &str = "SOAP";
const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

#[derive(Debug, Default)]
pub struct SoapExecutor;

impl SoapExecutor {
    async fn send(
        &self,
        request: &SoapRequest,
        context: &ExecutionContext,
    ) -> Result<(HttpResponse, Endpoint), EngineError> {
        let body = request.raw_body(&context.configuration.resource_dir)?;
        let body = interpolate(&body, context)?;

        let defaults = &context.configuration.soap;
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

        let headers = request_headers(request, context)?;

        let credentials = request
            .credentials
            .clone()
            .or_else(|| endpoint.credentials.clone())
            .or_else(|| defaults.credentials.clone());

        info!("Sending request:\n URL: {}\n Data: {}", url, http::short_text(&body));

        let response = http::send(OutgoingRequest {
            method: HttpMethod::Post,
            url,
            headers,
            body: Some(body),
            credentials,
            timeout: Duration::from_secs(context.configuration.timeout),
        })
        .await?;

        if response.content_type().is_none() {
            return Err(EngineError::Protocol("Missing Content-Type header".into()));
        }
        Ok((response, endpoint.clone()))
    }
}

/// Merged headers plus `Content-Type` and `SOAPAction` unless already set.
fn request_headers(
    request: &SoapRequest,
    context: &ExecutionContext,
) -> Result<Vec<HttpHeader>, EngineError> {
    let defaults = &context.configuration.soap.headers;
    let mut headers = http::merge_headers(defaults, &request.headers, context)?;
    let has = |headers: &[HttpHeader], name: &str| {
        headers.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    };
    if !has(&headers, "Content-Type") {
        headers.push(HttpHeader::new("Content-Type", CONTENT_TYPE));
    }
    if let Some(action) = &request.action {
        if !has(&headers, "SOAPAction") {
            headers.push(HttpHeader::new("SOAPAction", interpolate(action, context)?));
        }
    }
    Ok(headers)
}

#[async_trait]
impl Executor<SoapRequest, SoapResponse> for SoapExecutor {
    #[instrument(skip_all)]
    async fn execute(
        &self,
        request: &SoapRequest,
        context: &mut ExecutionContext,
    ) -> Result<SoapResponse, EngineError> {
        match self.send(request, context).await {
            Ok((http, endpoint)) => {
                let response = SoapResponse::received(http, endpoint);
                info!(
                    "Response, status: {}, MTOM: {}, body: {}",
                    response.http.as_ref().map_or(0, |h| h.status),
                    response.mtom(),
                    http::short_text(&response.body_text().unwrap_or_default())
                );
                context.record(
                    StepRequest::Soap(request.clone()),
                    Some(StepResponse::Soap(response.clone())),
                );
                Ok(response)
            }
            Err(err) => {
                context.record(StepRequest::Soap(request.clone()), None);
                if err.is_fatal() {
                    return Err(err);
                }
                error!("SOAP request failed: {}", err);
                Ok(SoapResponse::failed(err.to_string()))
            }
        }
    }
}
