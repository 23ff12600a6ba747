use super::{namespaces, SoapRequest, SoapResponse};
use crate::context::ExecutionContext;
use crate::engine::After;
use crate::expression::interpolate;
use crate::model::Source;
use crate::result::AfterResult;
use crate::xml::{XPathType, XmlDocument};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoapAfter {
    /// Store the string value of `xpath` in `property`.
    #[serde(rename = "xpath")]
    XPath {
        xpath: String,
        property: String,
        #[serde(default)]
        source: Source,
    },
}

impl After<SoapRequest, SoapResponse> for SoapAfter {
    fn name(&self) -> &'static str {
        match self {
            SoapAfter::XPath { .. } => "XPathValue",
        }
    }

    fn apply(
        &self,
        context: &mut ExecutionContext,
        request: &SoapRequest,
        response: &SoapResponse,
    ) -> AfterResult {
        let SoapAfter::XPath {
            xpath,
            property,
            source,
        } = self;

        match extract(context, xpath, *source, request, response) {
            Ok(value) => {
                info!("Assigned '{}' to property {}", value, property);
                context.configuration.properties.set(property, Some(value));
                AfterResult::success(self.name())
            }
            Err(message) => AfterResult::failure(self.name(), message),
        }
    }
}

fn extract(
    context: &ExecutionContext,
    xpath: &str,
    source: Source,
    request: &SoapRequest,
    response: &SoapResponse,
) -> Result<String, String> {
    let xpath = interpolate(xpath, context).map_err(|e| e.to_string())?;
    let document = match source {
        Source::Response => response.document(),
        Source::Request => {
            let body = request
                .raw_body(&context.configuration.resource_dir)
                .and_then(|body| interpolate(&body, context))
                .map_err(|e| e.to_string())?;
            XmlDocument::parse(&body)
        }
    }
    .map_err(|e| e.to_string())?;

    document
        .evaluate(&xpath, &namespaces(context), XPathType::String)
        .map_err(|e| e.to_string())?
        .map(|value| value.text())
        .ok_or_else(|| format!("value is null with xpath: {xpath}"))
}
