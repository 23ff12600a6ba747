//! HTTP transport shared by the REST and SOAP adapters.

use crate::context::{Credentials, ExecutionContext};
use crate::error::EngineError;
use crate::expression::interpolate;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const MAX_LOG_LENGTH: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Options,
    Head,
    Trace,
    Patch,
}

impl HttpMethod {
    /// Methods that carry a request body.
    pub fn has_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    fn to_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Options => Method::OPTIONS,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Trace => Method::TRACE,
            HttpMethod::Patch => Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_reqwest())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

impl HttpHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for HttpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// One MIME part of a multipart response (or the whole body).
#[derive(Debug, Clone, Default)]
pub struct HttpPart {
    pub headers: Vec<HttpHeader>,
    pub data: Vec<u8>,
}

impl HttpPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        header_value(&self.headers, "Content-Type")
    }
}

/// A received HTTP response. `parts` is non-empty only for
/// `multipart/related` responses.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<HttpHeader>,
    pub data: Vec<u8>,
    pub parts: Vec<HttpPart>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        header_value(&self.headers, "Content-Type")
    }

    pub fn is_multipart(&self) -> bool {
        !self.parts.is_empty()
    }
}

fn header_value<'a>(headers: &'a [HttpHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Inclusive range of accepted status codes. Written as a single code or
/// `{min, max}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StatusRepr")]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Exact(u16),
    Range { min: u16, max: u16 },
}

impl From<StatusRepr> for StatusRange {
    fn from(repr: StatusRepr) -> Self {
        match repr {
            StatusRepr::Exact(code) => StatusRange::exact(code),
            StatusRepr::Range { min, max } => StatusRange { min, max },
        }
    }
}

impl StatusRange {
    pub fn exact(code: u16) -> Self {
        Self {
            min: code,
            max: code,
        }
    }

    pub fn contains(&self, code: u16) -> bool {
        (self.min..=self.max).contains(&code)
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// Check the response status against `range`.
pub fn check_status(range: &StatusRange, response: &HttpResponse) -> Result<(), String> {
    if range.contains(response.status) {
        Ok(())
    } else {
        Err(format!(
            "HTTP response code {} not in range {}",
            response.status, range
        ))
    }
}

/// Check that `name` occurs exactly once in `headers` with `value`.
pub fn check_header(headers: &[HttpHeader], name: &str, value: &str) -> Result<(), String> {
    let matching: Vec<&HttpHeader> = headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case(name))
        .collect();
    match matching.as_slice() {
        [] => Err(format!(
            "Header {name} is not present, got: {}",
            headers
                .iter()
                .map(|h| h.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )),
        [header] if header.value == value => Ok(()),
        [header] => Err(format!(
            "Header: {name} expected: {value}, but was: {}",
            header.value
        )),
        _ => Err(format!("Header {name} is more than once present.")),
    }
}

/// Adapter default headers overridden by request headers, with
/// `#{name}` tokens in values resolved.
pub fn merge_headers(
    defaults: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
    context: &ExecutionContext,
) -> Result<Vec<HttpHeader>, EngineError> {
    let mut merged: BTreeMap<String, (&str, &str)> = BTreeMap::new();
    for (name, value) in defaults.iter().chain(overrides) {
        merged.insert(name.to_ascii_lowercase(), (name.as_str(), value.as_str()));
    }
    merged
        .into_values()
        .map(|(name, value)| Ok(HttpHeader::new(name, interpolate(value, context)?)))
        .collect()
}

/// A fully resolved request ready to be sent.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<HttpHeader>,
    pub body: Option<String>,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
}

/// Send `request` with a client scoped to this call.
///
/// Certificates and host names are not verified.
pub async fn send(request: OutgoingRequest) -> Result<HttpResponse, EngineError> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(request.timeout)
        .build()?;

    let mut builder = client.request(request.method.to_reqwest(), &request.url);
    for header in &request.headers {
        builder = builder.header(header.name.as_str(), header.value.as_str());
    }
    if let Some(Credentials { user, password }) = &request.credentials {
        builder = builder.basic_auth(user, Some(password));
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers: Vec<HttpHeader> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            HttpHeader::new(name.as_str(), value.to_str().unwrap_or_default())
        })
        .collect();
    let data = response.bytes().await?.to_vec();
    debug!("Received {} bytes with status {}", data.len(), status);

    let mut parsed = HttpResponse {
        status,
        headers,
        data,
        parts: Vec::new(),
    };
    if let Some(content_type) = parsed.content_type().map(ContentType::parse) {
        if content_type.mime == "multipart/related" {
            let boundary = content_type.params.get("boundary").ok_or_else(|| {
                EngineError::Protocol("Multipart response without boundary".into())
            })?;
            parsed.parts = parse_multipart(&parsed.data, boundary)?;
        }
    }
    Ok(parsed)
}

/// Parsed `Content-Type` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lower-cased base type, e.g. `text/xml`.
    pub mime: String,
    pub params: HashMap<String, String>,
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        let mut pieces = value.split(';');
        let mime = pieces
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let params = pieces
            .filter_map(|piece| {
                let (key, value) = piece.split_once('=')?;
                Some((
                    key.trim().to_ascii_lowercase(),
                    value.trim().trim_matches('"').to_string(),
                ))
            })
            .collect();
        Self { mime, params }
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| idx + from)
}

fn skip_line_end(data: &[u8], pos: usize) -> usize {
    if data[pos..].starts_with(b"\r\n") {
        pos + 2
    } else if data[pos..].starts_with(b"\n") {
        pos + 1
    } else {
        pos
    }
}

/// Split a `multipart/*` body into its parts, root part first.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<HttpPart>, EngineError> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut pos = find(body, &delimiter, 0)
        .ok_or_else(|| EngineError::Protocol("Multipart boundary not found in body".into()))?;
    let mut parts = Vec::new();

    loop {
        let after = pos + delimiter.len();
        if body[after..].starts_with(b"--") {
            break;
        }
        let start = skip_line_end(body, after);
        let Some(next) = find(body, &delimiter, start) else {
            return Err(EngineError::Protocol(
                "Multipart body is missing its closing boundary".into(),
            ));
        };
        let mut end = next;
        if body[..end].ends_with(b"\r\n") {
            end -= 2;
        } else if body[..end].ends_with(b"\n") {
            end -= 1;
        }
        parts.push(parse_part(&body[start..end.max(start)]));
        pos = next;
    }

    Ok(parts)
}

fn parse_part(raw: &[u8]) -> HttpPart {
    let (head, data) = match find(raw, b"\r\n\r\n", 0) {
        Some(idx) => (&raw[..idx], &raw[idx + 4..]),
        None => match find(raw, b"\n\n", 0) {
            Some(idx) => (&raw[..idx], &raw[idx + 2..]),
            None => (&raw[..0], raw),
        },
    };
    let headers = String::from_utf8_lossy(head)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some(HttpHeader::new(name.trim(), value.trim()))
        })
        .collect();
    HttpPart {
        headers,
        data: data.to_vec(),
    }
}

/// Truncate `text` for log output.
pub fn short_text(text: &str) -> String {
    if text.len() > MAX_LOG_LENGTH {
        let mut cut = MAX_LOG_LENGTH;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &text[..cut])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_range_from_yaml() {
        let exact: StatusRange = serde_yaml::from_str("200").unwrap();
        assert_eq!(exact, StatusRange::exact(200));
        let range: StatusRange = serde_yaml::from_str("{min: 200, max: 299}").unwrap();
        assert!(range.contains(204));
        assert!(!range.contains(300));
    }

    #[test]
    fn request_headers_override_defaults_ignoring_case() {
        let context = ExecutionContext::new(crate::context::TestConfiguration::default());
        let defaults = HashMap::from([
            ("X-Client".to_string(), "default".to_string()),
            ("Accept".to_string(), "text/xml".to_string()),
        ]);
        let overrides = HashMap::from([("x-client".to_string(), "request".to_string())]);

        let merged = merge_headers(&defaults, &overrides, &context).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Accept");
        assert_eq!(merged[1].name, "x-client");
        assert_eq!(merged[1].value, "request");
    }

    #[test]
    fn status_check_reports_actual_code() {
        let response = HttpResponse {
            status: 500,
            ..HttpResponse::default()
        };
        let err = check_status(&StatusRange::exact(200), &response).unwrap_err();
        assert!(err.contains("500"));
    }

    #[test]
    fn header_check_cases() {
        let headers = vec![
            HttpHeader::new("content-type", "application/json"),
            HttpHeader::new("x-dup", "1"),
            HttpHeader::new("x-dup", "2"),
        ];
        assert!(check_header(&headers, "Content-Type", "application/json").is_ok());
        assert!(check_header(&headers, "Content-Type", "text/xml")
            .unwrap_err()
            .contains("expected: text/xml"));
        assert!(check_header(&headers, "X-Dup", "1")
            .unwrap_err()
            .contains("more than once"));
        assert!(check_header(&headers, "X-Missing", "1")
            .unwrap_err()
            .contains("is not present"));
    }

    #[test]
    fn content_type_parameters() {
        let ct = ContentType::parse(
            "Multipart/Related; type=\"application/xop+xml\"; boundary=\"uuid:abc\"",
        );
        assert_eq!(ct.mime, "multipart/related");
        assert_eq!(ct.params.get("boundary").map(String::as_str), Some("uuid:abc"));
        assert_eq!(
            ct.params.get("type").map(String::as_str),
            Some("application/xop+xml")
        );
    }

    #[test]
    fn multipart_body_is_split_into_parts() {
        let body = b"--b1\r\n\
Content-Type: application/xop+xml\r\n\
Content-ID: <root>\r\n\
\r\n\
<Envelope/>\r\n\
--b1\r\n\
Content-Type: application/octet-stream\r\n\
Content-ID: <att1>\r\n\
\r\n\
12345\r\n\
--b1--\r\n";
        let parts = parse_multipart(body, "b1").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].text(), "<Envelope/>");
        assert_eq!(parts[0].content_type(), Some("application/xop+xml"));
        assert_eq!(parts[1].data, b"12345");
        assert_eq!(parts[1].headers[1], HttpHeader::new("Content-ID", "<att1>"));
    }

    #[test]
    fn multipart_without_boundary_fails() {
        assert!(parse_multipart(b"nothing here", "b1").is_err());
    }
}
