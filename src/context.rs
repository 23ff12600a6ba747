//! Run-wide configuration and the mutable execution context.

use crate::error::EngineError;
use crate::model::{StepRequest, StepResponse};
use crate::properties::PropertyBag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Namespace prefix binding used for XPath evaluation and fragment
/// promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDeclaration {
    pub prefix: String,
    #[serde(alias = "namespace")]
    pub uri: String,
}

impl NamespaceDeclaration {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

/// Basic auth credentials injected into HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// A remote service address shared by steps and adapter defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// XSD files describing SOAP body content, relative to the resource
    /// directory.
    #[serde(default)]
    pub schemas: Vec<PathBuf>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Append `path` to the endpoint URL and validate the result.
    pub fn resolve_url(&self, path: Option<&str>) -> Result<String, EngineError> {
        let joined = match path {
            Some(path) if !path.is_empty() => {
                if self.url.ends_with('/') && path.starts_with('/') {
                    format!("{}{}", self.url, &path[1..])
                } else if !self.url.ends_with('/')
                    && !path.starts_with('/')
                    && !path.starts_with('?')
                {
                    format!("{}/{}", self.url, path)
                } else {
                    format!("{}{}", self.url, path)
                }
            }
            _ => self.url.clone(),
        };
        url::Url::parse(&joined).map_err(|e| EngineError::InvalidUrl {
            url: joined.clone(),
            reason: e.to_string(),
        })?;
        Ok(joined)
    }
}

/// Either the name of a configured endpoint or an inline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointRef {
    Named(String),
    Inline(Endpoint),
}

impl EndpointRef {
    pub fn resolve<'a>(
        &'a self,
        configuration: &'a TestConfiguration,
    ) -> Result<&'a Endpoint, EngineError> {
        match self {
            EndpointRef::Named(name) => configuration
                .endpoints
                .get(name)
                .ok_or_else(|| EngineError::UnknownEndpoint(name.clone())),
            EndpointRef::Inline(endpoint) => Ok(endpoint),
        }
    }
}

impl From<Endpoint> for EndpointRef {
    fn from(endpoint: Endpoint) -> Self {
        EndpointRef::Inline(endpoint)
    }
}

/// Defaults for HTTP based adapters (REST and SOAP).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpDefaults {
    #[serde(default)]
    pub endpoint: Option<EndpointRef>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Defaults for SQL steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JdbcDefaults {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Per-run configuration: global properties, namespaces, endpoints and
/// one explicit defaults object per adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfiguration {
    #[serde(default)]
    pub properties: PropertyBag,
    #[serde(default)]
    pub namespaces: Vec<NamespaceDeclaration>,
    #[serde(default)]
    pub endpoints: HashMap<String, Endpoint>,
    #[serde(default)]
    pub rest: HttpDefaults,
    #[serde(default)]
    pub soap: HttpDefaults,
    #[serde(default)]
    pub jdbc: JdbcDefaults,
    /// Base directory for `%{path}` tokens, SOAP body files and schemas.
    #[serde(default = "default_resource_dir")]
    pub resource_dir: PathBuf,
    /// HTTP timeout per step in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_resource_dir() -> PathBuf {
    PathBuf::from("tests/resources")
}

fn default_timeout() -> u64 {
    30
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self {
            properties: PropertyBag::new(),
            namespaces: Vec::new(),
            endpoints: HashMap::new(),
            rest: HttpDefaults::default(),
            soap: HttpDefaults::default(),
            jdbc: JdbcDefaults::default(),
            resource_dir: default_resource_dir(),
            timeout: default_timeout(),
        }
    }
}

impl TestConfiguration {
    /// Register a named endpoint, keyed by its name (or URL when unnamed).
    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> &mut Self {
        let key = endpoint
            .name
            .clone()
            .unwrap_or_else(|| endpoint.url.clone());
        self.endpoints.insert(key, endpoint);
        self
    }

    pub fn add_namespace(&mut self, prefix: &str, uri: &str) -> &mut Self {
        self.namespaces.push(NamespaceDeclaration::new(prefix, uri));
        self
    }
}

/// State threaded through every executor, validator and after-action of
/// one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub configuration: TestConfiguration,
    pub properties: PropertyBag,
    pub previous_request: Option<StepRequest>,
    pub previous_response: Option<StepResponse>,
}

impl ExecutionContext {
    pub fn new(configuration: TestConfiguration) -> Self {
        Self {
            configuration,
            ..Self::default()
        }
    }

    /// Resolve `name` against the run-local bag first, then the
    /// configuration-level bag.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .or_else(|| self.configuration.properties.get(name))
    }

    /// Record a finished execution. A failed step keeps its request but
    /// leaves the previous response unset.
    pub fn record(&mut self, request: StepRequest, response: Option<StepResponse>) {
        self.previous_request = Some(request);
        self.previous_response = response;
    }
}
