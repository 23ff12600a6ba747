use super::schema::{self, SchemaSet};
use super::{namespaces, SoapRequest, SoapResponse, SOAP_NAMESPACE, SOAP_PREFIX};
use crate::context::ExecutionContext;
use crate::engine::Validator;
use crate::expression::{interpolate, Expression};
use crate::http::{self, ContentType, StatusRange};
use crate::result::{ValidatorResult, OUT_OF_BOUNDS};
use crate::timestamp::{self, Inequality};
use crate::xml::{self, XPathType, XPathValue};
use regex::Regex;
use serde::{Deserialize, Serialize};

const FAULT_XPATH: &str = "//soap:Envelope/soap:Body/soap:Fault";

/// Checks available on SOAP steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoapValidator {
    HttpStatus(StatusRange),
    HttpHeader {
        name: String,
        value: String,
    },
    /// `true` when a `soap:Fault` must be present, `false` when it must not.
    SoapFault(bool),
    /// Content type matches the transfer mode (MTOM or plain XML).
    SoapResponse,
    Schema,
    #[serde(rename = "xpath")]
    XPath {
        xpath: String,
        #[serde(default)]
        value: Option<Expression>,
        #[serde(default, rename = "type")]
        kind: XPathType,
        #[serde(default)]
        regex: bool,
    },
    Contains(String),
    CompareTime {
        first: String,
        second: String,
        interval: i64,
        inequality: Inequality,
    },
    /// Number of MIME parts besides the envelope.
    AttachmentsCount(usize),
    AttachmentSize {
        attachment: usize,
        size: usize,
        inequality: Inequality,
    },
    AttachmentHeader {
        attachment: usize,
        name: String,
        value: String,
    },
}

impl Validator<SoapRequest, SoapResponse> for SoapValidator {
    fn name(&self) -> &'static str {
        match self {
            SoapValidator::HttpStatus(_) => "HttpStatusValidator",
            SoapValidator::HttpHeader { .. } => "HttpHeaderValidator",
            SoapValidator::SoapFault(_) => "SoapFaultValidator",
            SoapValidator::SoapResponse => "SoapResponseValidator",
            SoapValidator::Schema => "XSDValidator",
            SoapValidator::XPath { .. } => "XPathValidator",
            SoapValidator::Contains(_) => "ContainsValidator",
            SoapValidator::CompareTime { .. } => "CompareTimeValidator",
            SoapValidator::AttachmentsCount(_) => "AttachmentsCountValidator",
            SoapValidator::AttachmentSize { .. } => "AttachmentSizeValidator",
            SoapValidator::AttachmentHeader { .. } => "AttachmentHeaderValidator",
        }
    }

    fn validate(
        &self,
        context: &ExecutionContext,
        _request: &SoapRequest,
        response: &SoapResponse,
    ) -> ValidatorResult {
        match self.check(context, response) {
            Ok(()) => self.success(),
            Err(message) => self.failure(message),
        }
    }
}

impl SoapValidator {
    fn check(&self, context: &ExecutionContext, response: &SoapResponse) -> Result<(), String> {
        match self {
            SoapValidator::HttpStatus(range) => {
                let http = response.http.as_ref().ok_or("Missing response")?;
                http::check_status(range, http)
            }
            SoapValidator::HttpHeader { name, value } => {
                let http = response.http.as_ref().ok_or("Missing response")?;
                http::check_header(&http.headers, name, value)
            }
            SoapValidator::SoapFault(expected) => check_fault(context, response, *expected),
            SoapValidator::SoapResponse => {
                let actual = response
                    .body_content_type()
                    .ok_or("SOAP response is missing content type.")?;
                let expected = if response.mtom() {
                    "application/xop+xml"
                } else {
                    "text/xml"
                };
                if ContentType::parse(actual).mime == expected {
                    Ok(())
                } else {
                    Err(format!(
                        "Unexpected Content-Type in response, expected: {expected}, actual: {actual}"
                    ))
                }
            }
            SoapValidator::Schema => check_schema(context, response),
            SoapValidator::XPath {
                xpath,
                value,
                kind,
                regex,
            } => {
                let expected = value
                    .as_ref()
                    .and_then(|value| value.evaluate(context))
                    .ok_or_else(|| {
                        format!("{} is missing expected value or is empty", self.name())
                    })?;
                let expected = resolve(&expected, context)?;
                let xpath = resolve(xpath, context)?;
                check_xpath(context, response, &xpath, *kind, &expected, *regex)
            }
            SoapValidator::Contains(fragment) => {
                let fragment = resolve(fragment, context)?;
                if response.body_text().unwrap_or_default().contains(&fragment) {
                    Ok(())
                } else {
                    Err(format!("Contains failure, expected '{fragment}' but not found"))
                }
            }
            SoapValidator::CompareTime {
                first,
                second,
                interval,
                inequality,
            } => {
                let document = response.document().map_err(|e| e.to_string())?;
                let declared = namespaces(context);
                let read_time = |xpath: &str| -> Result<_, String> {
                    let xpath = resolve(xpath, context)?;
                    let value = document
                        .evaluate(&xpath, &declared, XPathType::String)
                        .map_err(|e| e.to_string())?;
                    Ok(value.and_then(|v| timestamp::parse(&v.text())))
                };
                match (read_time(first)?, read_time(second)?) {
                    (Some(first), Some(second)) => {
                        timestamp::check_interval(first, second, *interval, *inequality)
                    }
                    _ => Err("One of the values can not be parsed".to_string()),
                }
            }
            SoapValidator::AttachmentsCount(expected) => {
                if !response.mtom() {
                    return if *expected == 0 {
                        Ok(())
                    } else {
                        Err("The response has no attachments".to_string())
                    };
                }
                let actual = response.attachments().len();
                if actual == *expected {
                    Ok(())
                } else {
                    Err(format!("Expected {expected} attachment(s) but found {actual}"))
                }
            }
            SoapValidator::AttachmentSize {
                attachment,
                size,
                inequality,
            } => {
                let part = attachment_part(response, *attachment)?;
                let actual = part.data.len();
                if inequality.holds(actual as i64, *size as i64) {
                    Ok(())
                } else {
                    Err(format!(
                        "Attachment {attachment} is {actual} bytes, expected {inequality} {size}"
                    ))
                }
            }
            SoapValidator::AttachmentHeader {
                attachment,
                name,
                value,
            } => {
                let part = attachment_part(response, *attachment)?;
                http::check_header(&part.headers, name, value)
            }
        }
    }
}

fn resolve(text: &str, context: &ExecutionContext) -> Result<String, String> {
    interpolate(text, context).map_err(|e| e.to_string())
}

fn attachment_part(response: &SoapResponse, index: usize) -> Result<&http::HttpPart, String> {
    if !response.mtom() {
        return Err("The response has no attachments".to_string());
    }
    response
        .attachments()
        .get(index)
        .ok_or_else(|| OUT_OF_BOUNDS.to_string())
}

fn check_fault(
    context: &ExecutionContext,
    response: &SoapResponse,
    expected: bool,
) -> Result<(), String> {
    let document = response
        .document()
        .map_err(|e| format!("SoapFaultValidator failure: {e}"))?;
    let fault = document
        .evaluate(FAULT_XPATH, &namespaces(context), XPathType::String)
        .map_err(|e| format!("SoapFaultValidator failure: {e}"))?;
    match (expected, fault) {
        (true, None) => Err("A SOAP fault was expected, but not found.".to_string()),
        (false, Some(fault)) => Err(format!(
            "A SOAP fault was not expected, but one was found:\n {}",
            fault.text()
        )),
        _ => Ok(()),
    }
}

fn check_schema(context: &ExecutionContext, response: &SoapResponse) -> Result<(), String> {
    let soap_namespace = context
        .configuration
        .namespaces
        .iter()
        .find(|ns| ns.prefix == SOAP_PREFIX)
        .map_or(SOAP_NAMESPACE, |ns| ns.uri.as_str());
    let envelope = response
        .document()
        .and_then(|doc| doc.root())
        .map_err(|e| format!("Response can not be parsed as a Document: {e}"))?;
    let body = schema::validate_envelope(&envelope, soap_namespace)
        .map_err(|e| format!("XSD validation failed: {e}"))?;

    let schemas = response
        .endpoint
        .as_ref()
        .map(|endpoint| endpoint.schemas.as_slice())
        .unwrap_or_default();
    let set = SchemaSet::load(schemas, &context.configuration.resource_dir)?;
    if set.is_empty() {
        return Ok(());
    }
    for element in body
        .children
        .iter()
        .filter(|child| child.namespace.as_deref() != Some(soap_namespace))
    {
        set.validate(element)
            .map_err(|e| format!("XSD validation failed: {e}"))?;
    }
    Ok(())
}

fn check_xpath(
    context: &ExecutionContext,
    response: &SoapResponse,
    xpath: &str,
    kind: XPathType,
    expected: &str,
    regex: bool,
) -> Result<(), String> {
    let declared = namespaces(context);
    let document = response
        .document()
        .map_err(|e| format!("XPath failure: {e}"))?;
    let actual = document
        .evaluate(xpath, &declared, kind)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("XPath failure, no match found for XPath: {xpath}"))?;

    match actual {
        XPathValue::Node(node) => {
            let expected_node = xml::fragment_to_document(expected, &declared)
                .map_err(|e| format!("XPath(Node) failure: {e}"))?;
            match xml::diff(&expected_node, &node) {
                None => Ok(()),
                Some(difference) => Err(format!("XPath(Node) failure: {difference}")),
            }
        }
        XPathValue::Number(number) => {
            let wanted: f64 = expected
                .trim()
                .parse()
                .map_err(|_| {
                    format!("Incorrect XPath: {xpath} (expected value '{expected}' is not a number)")
                })?;
            if wanted == number {
                Ok(())
            } else {
                Err(format!(
                    "XPath(Number) failure:\n XPath: {xpath}\n Expected:\n {wanted}\n Actual:\n {number}"
                ))
            }
        }
        XPathValue::Text(text) => {
            let matched = if regex {
                Regex::new(&format!("^(?:{expected})$"))
                    .map_err(|e| format!("Invalid regex '{expected}': {e}"))?
                    .is_match(&text)
            } else {
                text == expected
            };
            if matched {
                Ok(())
            } else {
                Err(format!(
                    "XPath failure:\n XPath: {xpath}\n Expected:\n {expected}\n Actual:\n {text}"
                ))
            }
        }
    }
}
