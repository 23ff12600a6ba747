//! SOAP steps: XML envelopes over HTTP POST, with MTOM attachments.

mod after;
mod executor;
pub mod schema;
mod validator;

pub use after::SoapAfter;
pub use executor::SoapExecutor;
pub use validator::SoapValidator;

use crate::context::{Credentials, Endpoint, EndpointRef, ExecutionContext, NamespaceDeclaration};
use crate::error::EngineError;
use crate::http::{HttpPart, HttpResponse};
use crate::result::Outcome;
use crate::xml::{XmlDocument, XmlError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const SOAP_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_PREFIX: &str = "soap";

/// Configured namespace declarations, with the `soap` prefix bound to the
/// SOAP 1.1 envelope namespace unless the configuration binds it itself.
pub fn namespaces(context: &ExecutionContext) -> Vec<NamespaceDeclaration> {
    let mut declarations = context.configuration.namespaces.clone();
    if !declarations.iter().any(|ns| ns.prefix == SOAP_PREFIX) {
        declarations.push(NamespaceDeclaration::new(SOAP_PREFIX, SOAP_NAMESPACE));
    }
    declarations
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoapRequest {
    /// Inline envelope.
    #[serde(default)]
    pub text: Option<String>,
    /// Envelope file name under the resource directory, without `.xml`.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Value of the `SOAPAction` header.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub endpoint: Option<EndpointRef>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl SoapRequest {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            text: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            file: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<EndpointRef>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// The envelope before interpolation.
    pub fn raw_body(&self, resource_dir: &Path) -> Result<String, EngineError> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        let name = self.file.as_ref().ok_or(EngineError::NotConfigured {
            what: "body",
            kind: "SOAP",
        })?;
        let path = resource_dir.join(format!("{name}.xml"));
        std::fs::read_to_string(&path)
            .map_err(|_| EngineError::FileNotFound(path.display().to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SoapResponse {
    pub http: Option<HttpResponse>,
    pub endpoint: Option<Endpoint>,
    pub success: bool,
    pub message: Option<String>,
}

impl SoapResponse {
    pub fn received(http: HttpResponse, endpoint: Endpoint) -> Self {
        Self {
            http: Some(http),
            endpoint: Some(endpoint),
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            http: None,
            endpoint: None,
            success: false,
            message: Some(message.into()),
        }
    }

    /// Whether the response arrived as `multipart/related`.
    pub fn mtom(&self) -> bool {
        self.http.as_ref().is_some_and(HttpResponse::is_multipart)
    }

    /// MIME parts after the root (envelope) part.
    pub fn attachments(&self) -> &[HttpPart] {
        match &self.http {
            Some(http) if http.parts.len() > 1 => &http.parts[1..],
            _ => &[],
        }
    }

    /// Envelope bytes: the root part for MTOM, the whole body otherwise.
    pub fn body_data(&self) -> Option<&[u8]> {
        let http = self.http.as_ref()?;
        if http.is_multipart() {
            http.parts.first().map(|part| part.data.as_slice())
        } else {
            Some(&http.data)
        }
    }

    pub fn body_content_type(&self) -> Option<&str> {
        let http = self.http.as_ref()?;
        if http.is_multipart() {
            http.parts.first()?.content_type()
        } else {
            http.content_type()
        }
    }

    pub fn body_text(&self) -> Option<String> {
        self.body_data()
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    pub fn document(&self) -> Result<XmlDocument, XmlError> {
        let text = self.body_text().ok_or(XmlError::Empty)?;
        XmlDocument::parse(&text)
    }
}

impl Outcome for SoapResponse {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
