//! REST steps: JSON over HTTP.

mod after;
mod executor;
mod validator;

pub use after::RestAfter;
pub use executor::RestExecutor;
pub use validator::RestValidator;

use crate::context::{Credentials, EndpointRef};
use crate::http::{HttpMethod, HttpResponse};
use crate::result::Outcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestRequest {
    #[serde(default)]
    pub method: HttpMethod,
    /// Appended to the endpoint URL; may contain `#{name}` tokens.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub endpoint: Option<EndpointRef>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl RestRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path).body(body)
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<EndpointRef>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct RestResponse {
    pub http: Option<HttpResponse>,
    /// Response body decoded as UTF-8 (lossy).
    pub body: String,
    pub success: bool,
    pub message: Option<String>,
}

impl RestResponse {
    pub fn received(http: HttpResponse) -> Self {
        Self {
            body: http.text(),
            http: Some(http),
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            http: None,
            body: String::new(),
            success: false,
            message: Some(message.into()),
        }
    }
}

impl Outcome for RestResponse {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
