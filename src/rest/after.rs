use super::{RestRequest, RestResponse};
use crate::context::ExecutionContext;
use crate::engine::After;
use crate::expression::interpolate;
use crate::json;
use crate::model::Source;
use crate::result::AfterResult;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestAfter {
    /// Store the value at `path` in `property`.
    JsonPath {
        path: String,
        property: String,
        #[serde(default)]
        source: Source,
    },
}

impl After<RestRequest, RestResponse> for RestAfter {
    fn name(&self) -> &'static str {
        match self {
            RestAfter::JsonPath { .. } => "JsonPathValue",
        }
    }

    fn apply(
        &self,
        context: &mut ExecutionContext,
        request: &RestRequest,
        response: &RestResponse,
    ) -> AfterResult {
        let RestAfter::JsonPath {
            path,
            property,
            source,
        } = self;

        let value = extract(context, path, *source, request, response);

        match value {
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
    path: &str,
    source: Source,
    request: &RestRequest,
    response: &RestResponse,
) -> Result<String, String> {
    let path = interpolate(path, context).map_err(|e| e.to_string())?;
    let document = match source {
        Source::Response => response.body.clone(),
        Source::Request => {
            let body = request.body.as_deref().ok_or("The request has no body")?;
            interpolate(body, context).map_err(|e| e.to_string())?
        }
    };
    json::read(&document, &path)
        .map(|value| json::render(&value))
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestConfiguration;
    use crate::http::HttpResponse;

    fn response(body: &str) -> RestResponse {
        RestResponse::received(HttpResponse {
            status: 200,
            data: body.as_bytes().to_vec(),
            ..HttpResponse::default()
        })
    }

    #[test]
    fn stores_response_value_in_configuration_properties() {
        let mut context = ExecutionContext::new(TestConfiguration::default());
        let action = RestAfter::JsonPath {
            path: "$.user.id".into(),
            property: "user_id".into(),
            source: Source::Response,
        };

        let result = action.apply(
            &mut context,
            &RestRequest::default(),
            &response(r#"{"user":{"id":7}}"#),
        );

        assert!(result.success);
        assert_eq!(context.configuration.properties.get("user_id"), Some("7"));
        assert_eq!(context.property("user_id"), Some("7"));
    }

    #[test]
    fn objects_are_stored_as_json_text() {
        let mut context = ExecutionContext::new(TestConfiguration::default());
        let action = RestAfter::JsonPath {
            path: "$.user".into(),
            property: "user".into(),
            source: Source::Response,
        };
        action.apply(
            &mut context,
            &RestRequest::default(),
            &response(r#"{"user":{"id":7}}"#),
        );
        assert_eq!(context.property("user"), Some(r#"{"id":7}"#));
    }

    #[test]
    fn reads_from_the_request_body() {
        let mut context = ExecutionContext::new(TestConfiguration::default());
        context.properties.set("name", Some("carol".into()));
        let request = RestRequest::post("/users", r##"{"name":"#{name}"}"##);
        let action = RestAfter::JsonPath {
            path: "$.name".into(),
            property: "sent".into(),
            source: Source::Request,
        };

        let result = action.apply(&mut context, &request, &response("{}"));

        assert!(result.success);
        assert_eq!(context.property("sent"), Some("carol"));
    }

    #[test]
    fn missing_path_fails() {
        let mut context = ExecutionContext::new(TestConfiguration::default());
        let action = RestAfter::JsonPath {
            path: "$.nope".into(),
            property: "x".into(),
            source: Source::Response,
        };
        let result = action.apply(&mut context, &RestRequest::default(), &response("{}"));
        assert!(!result.success);
        assert!(context.property("x").is_none());
    }
}
