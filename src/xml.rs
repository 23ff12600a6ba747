//! XML parsing, namespace-aware XPath evaluation and wildcard-aware
//! structural comparison.

use crate::context::NamespaceDeclaration;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::{parser, Package};
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};
use thiserror::Error;

const XMLNS_URI: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum XmlError {
    #[error("XML parse failure: {0}")]
    Parse(String),

    #[error("Incorrect XPath: {xpath} ({reason})")]
    XPath { xpath: String, reason: String },

    #[error("XML document has no root element")]
    Empty,
}

/// Requested result type of an XPath evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XPathType {
    #[default]
    String,
    Number,
    Node,
}

/// Result of a typed XPath evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    Text(String),
    Number(f64),
    Node(XmlNode),
}

impl XPathValue {
    /// Textual form, used when storing the value in a property.
    pub fn text(&self) -> String {
        match self {
            XPathValue::Text(text) => text.clone(),
            XPathValue::Number(number) => number.to_string(),
            XPathValue::Node(node) => node.string_value(),
        }
    }
}

/// A parsed XML document.
pub struct XmlDocument {
    package: Package,
}

impl XmlDocument {
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let package = parser::parse(text).map_err(|e| XmlError::Parse(format!("{e:?}")))?;
        Ok(Self { package })
    }

    /// Owned copy of the document element.
    pub fn root(&self) -> Result<XmlNode, XmlError> {
        let document = self.package.as_document();
        let root = document.root().children().into_iter().find_map(|child| match child {
            ChildOfRoot::Element(element) => Some(XmlNode::from_element(element)),
            _ => None,
        });
        root.ok_or(XmlError::Empty)
    }

    /// Evaluate `xpath` with the given prefix bindings. `None` means the
    /// expression selected no nodes.
    pub fn evaluate(
        &self,
        xpath: &str,
        namespaces: &[NamespaceDeclaration],
        kind: XPathType,
    ) -> Result<Option<XPathValue>, XmlError> {
        let document = self.package.as_document();
        let compiled = Factory::new()
            .build(xpath)
            .map_err(|e| xpath_error(xpath, format!("{e:?}")))?
            .ok_or_else(|| xpath_error(xpath, "empty expression".into()))?;

        let mut context = Context::new();
        for declaration in namespaces {
            context.set_namespace(&declaration.prefix, &declaration.uri);
        }

        let value = compiled
            .evaluate(&context, document.root())
            .map_err(|e| xpath_error(xpath, format!("{e:?}")))?;

        let result = match (&value, kind) {
            (Value::Nodeset(nodes), _) if nodes.size() == 0 => None,
            (Value::Nodeset(nodes), XPathType::Node) => {
                nodes.document_order_first().map(|node| match node {
                    Node::Element(element) => XPathValue::Node(XmlNode::from_element(element)),
                    other => XPathValue::Text(other.string_value()),
                })
            }
            (_, XPathType::Number) => Some(XPathValue::Number(value.number())),
            _ => Some(XPathValue::Text(value.string())),
        };
        Ok(result)
    }
}

fn xpath_error(xpath: &str, reason: String) -> XmlError {
    XmlError::XPath {
        xpath: xpath.to_string(),
        reason,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

/// Owned element tree with namespace-resolved names. Comments,
/// processing instructions and whitespace-only text are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    /// Trimmed direct text content.
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_element(element: Element<'_>) -> Self {
        let qname = element.name();
        let attributes = element
            .attributes()
            .into_iter()
            .filter(|attr| {
                attr.name().namespace_uri() != Some(XMLNS_URI)
                    && attr.name().local_part() != "xmlns"
            })
            .map(|attr| XmlAttribute {
                namespace: attr.name().namespace_uri().map(str::to_string),
                name: attr.name().local_part().to_string(),
                value: attr.value().to_string(),
            })
            .collect();

        let mut text = String::new();
        let mut children = Vec::new();
        for child in element.children() {
            match child {
                ChildOfElement::Element(e) => children.push(XmlNode::from_element(e)),
                ChildOfElement::Text(t) => text.push_str(t.text()),
                _ => {}
            }
        }

        Self {
            namespace: qname.namespace_uri().map(str::to_string),
            name: qname.local_part().to_string(),
            attributes,
            text: text.trim().to_string(),
            children,
        }
    }

    /// Concatenated text of this element and its descendants.
    pub fn string_value(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.string_value());
        }
        out
    }

    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{ns}}}{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Parse an XML snippet, declaring `namespaces` on its first element so
/// prefixed names resolve without the snippet declaring them itself.
pub fn fragment_to_document(
    fragment: &str,
    namespaces: &[NamespaceDeclaration],
) -> Result<XmlNode, XmlError> {
    let promoted = declare_namespaces(fragment, namespaces);
    XmlDocument::parse(&promoted)?.root()
}

fn declare_namespaces(fragment: &str, namespaces: &[NamespaceDeclaration]) -> String {
    let Some((name_end, tag_end)) = first_start_tag(fragment) else {
        return fragment.to_string();
    };
    let tag = &fragment[..tag_end];
    let declarations: String = namespaces
        .iter()
        .filter(|ns| !tag.contains(&format!("xmlns:{}=", ns.prefix)))
        .map(|ns| format!(" xmlns:{}=\"{}\"", ns.prefix, ns.uri))
        .collect();
    format!("{}{}{}", &fragment[..name_end], declarations, &fragment[name_end..])
}

/// Byte offsets of the end of the first element name and of its start tag.
fn first_start_tag(text: &str) -> Option<(usize, usize)> {
    let mut pos = 0;
    loop {
        let open = pos + text[pos..].find('<')?;
        let rest = &text[open..];
        if rest.starts_with("<?") {
            pos = open + rest.find("?>")? + 2;
        } else if rest.starts_with("<!--") {
            pos = open + rest.find("-->")? + 3;
        } else if rest.starts_with("<!") {
            pos = open + rest.find('>')? + 1;
        } else {
            let name_len = rest[1..]
                .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .unwrap_or(rest.len() - 1);
            let tag_len = rest.find('>').map_or(rest.len(), |idx| idx + 1);
            return Some((open + 1 + name_len, open + tag_len));
        }
    }
}

/// Compare `actual` against `expected`, returning the first difference.
///
/// Prefixes are ignored in favour of namespace URIs. An expected value of
/// `*` matches anything; an expected value containing `*` is treated as
/// a regular expression over a non-empty actual value.
pub fn diff(expected: &XmlNode, actual: &XmlNode) -> Option<String> {
    diff_at(&format!("/{}", expected.name), expected, actual)
}

fn diff_at(path: &str, expected: &XmlNode, actual: &XmlNode) -> Option<String> {
    if expected.namespace != actual.namespace || expected.name != actual.name {
        return Some(format!(
            "Expected element '{}' but was '{}' at {}",
            expected.qualified_name(),
            actual.qualified_name(),
            path
        ));
    }

    for attr in &expected.attributes {
        let found = actual
            .attributes
            .iter()
            .find(|a| a.name == attr.name && a.namespace == attr.namespace);
        match found {
            None => {
                return Some(format!(
                    "Expected attribute '{}' at {} but it was missing",
                    attr.name, path
                ))
            }
            Some(found) if !values_match(&attr.value, &found.value) => {
                return Some(format!(
                    "Expected attribute '{}' value '{}' but was '{}' at {}",
                    attr.name, attr.value, found.value, path
                ))
            }
            Some(_) => {}
        }
    }
    if let Some(extra) = actual.attributes.iter().find(|a| {
        !expected
            .attributes
            .iter()
            .any(|e| e.name == a.name && e.namespace == a.namespace)
    }) {
        return Some(format!("Unexpected attribute '{}' at {}", extra.name, path));
    }

    if !values_match(&expected.text, &actual.text) {
        return Some(format!(
            "Expected text value '{}' but was '{}' at {}",
            expected.text, actual.text, path
        ));
    }

    if expected.children.len() != actual.children.len() {
        return Some(format!(
            "Expected {} child element(s) but was {} at {}",
            expected.children.len(),
            actual.children.len(),
            path
        ));
    }

    expected
        .children
        .iter()
        .zip(&actual.children)
        .enumerate()
        .find_map(|(idx, (e, a))| diff_at(&format!("{path}/{}[{}]", e.name, idx + 1), e, a))
}

fn values_match(expected: &str, actual: &str) -> bool {
    if expected == "*" {
        return true;
    }
    if expected.contains('*') && !actual.is_empty() {
        if let Ok(pattern) = Regex::new(&format!("^(?:{expected})$")) {
            return pattern.is_match(actual);
        }
    }
    expected == actual
}
