//! Structural XSD checks for SOAP envelopes.
//!
//! Supports the subset of XML Schema used to describe message payloads:
//! global `xs:element` declarations, inline or named `xs:complexType`
//! with an `xs:sequence` of local or referenced elements, `minOccurs`,
//! `maxOccurs` and `elementFormDefault`/`form`. Sequences are matched in
//! order and checked recursively. Content models other than `sequence`
//! are accepted without checks.

use crate::xml::{XmlDocument, XmlNode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

type ElementKey = (Option<String>, String);

#[derive(Debug, Clone)]
enum Model {
    /// Simple content or a content model that is not checked.
    Open,
    Sequence(Vec<Particle>),
    /// `ref` to a global element; `namespace` is the referring schema's target.
    Global { namespace: Option<String>, name: String },
}

#[derive(Debug, Clone)]
struct Particle {
    namespace: Option<String>,
    name: String,
    min: usize,
    /// `None` for `unbounded`.
    max: Option<usize>,
    model: Model,
}

impl Particle {
    fn describe(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{ns}}}{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Global element declarations collected from one or more schema files.
#[derive(Debug, Default)]
pub struct SchemaSet {
    elements: HashMap<ElementKey, Model>,
}

/// Per-document state used while reading declarations.
struct SchemaDocument<'a> {
    target: Option<String>,
    qualified: bool,
    types: HashMap<&'a str, &'a XmlNode>,
}

impl SchemaSet {
    /// Load `schemas`, resolved relative to `resource_dir`.
    pub fn load(schemas: &[PathBuf], resource_dir: &Path) -> Result<Self, String> {
        let mut set = SchemaSet::default();
        for schema in schemas {
            let path = resource_dir.join(schema);
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("Can not read schema {}: {e}", path.display()))?;
            set.add(&text)
                .map_err(|e| format!("Invalid schema {}: {e}", path.display()))?;
        }
        Ok(set)
    }

    /// Register the global declarations of one schema document.
    pub fn add(&mut self, text: &str) -> Result<(), String> {
        let root = XmlDocument::parse(text)
            .and_then(|doc| doc.root())
            .map_err(|e| e.to_string())?;
        if !is_xsd(&root, "schema") {
            return Err(format!("root element is {}, not xs:schema", root.name));
        }
        let document = SchemaDocument {
            target: attribute(&root, "targetNamespace").map(str::to_string),
            qualified: attribute(&root, "elementFormDefault") == Some("qualified"),
            types: root
                .children
                .iter()
                .filter(|child| is_xsd(child, "complexType"))
                .filter_map(|child| attribute(child, "name").map(|name| (name, child)))
                .collect(),
        };

        for element in root.children.iter().filter(|child| is_xsd(child, "element")) {
            let Some(name) = attribute(element, "name") else {
                continue;
            };
            let model = document.model_of(element, &mut Vec::new());
            self.elements
                .insert((document.target.clone(), name.to_string()), model);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Check `element` against its global declaration.
    pub fn validate(&self, element: &XmlNode) -> Result<(), String> {
        let key = (element.namespace.clone(), element.name.clone());
        let model = self.elements.get(&key).ok_or_else(|| {
            format!(
                "No schema declaration found for element {}",
                element.qualified_name()
            )
        })?;
        self.check(element, model, 0)
    }

    fn global(&self, namespace: &Option<String>, name: &str) -> Option<(&ElementKey, &Model)> {
        self.elements
            .get_key_value(&(namespace.clone(), name.to_string()))
            .or_else(|| self.elements.iter().find(|((_, local), _)| local == name))
    }

    fn check(&self, element: &XmlNode, model: &Model, depth: usize) -> Result<(), String> {
        if depth > MAX_DEPTH {
            return Ok(());
        }
        let sequence = match model {
            Model::Open => return Ok(()),
            Model::Sequence(sequence) => sequence,
            Model::Global { namespace, name } => {
                return match self.global(namespace, name) {
                    Some((_, model)) => self.check(element, model, depth + 1),
                    None => Err(format!("No schema declaration found for element {name}")),
                }
            }
        };

        let mut children = element.children.iter().peekable();
        for particle in sequence {
            let (namespace, name, model) = self.resolve(particle);
            let mut count = 0;
            while let Some(child) = children.next_if(|c| {
                c.name == name && c.namespace.as_deref() == namespace.as_deref()
            }) {
                count += 1;
                if let Some(max) = particle.max.filter(|max| count > *max) {
                    return Err(format!(
                        "Element '{name}' occurs more than {max} time(s) in {}",
                        element.name
                    ));
                }
                self.check(child, model, depth + 1)?;
            }
            if count < particle.min {
                return Err(format!(
                    "Missing required element '{}' in {}",
                    particle.describe(),
                    element.name
                ));
            }
        }
        match children.next() {
            Some(extra) => Err(format!(
                "Element '{}' is not allowed here in {}",
                extra.qualified_name(),
                element.name
            )),
            None => Ok(()),
        }
    }

    /// Name, namespace and content of a particle, following `ref`s.
    fn resolve<'a>(
        &'a self,
        particle: &'a Particle,
    ) -> (&'a Option<String>, &'a str, &'a Model) {
        if let Model::Global { namespace, name } = &particle.model {
            if let Some(((found_ns, found_name), model)) = self.global(namespace, name) {
                return (found_ns, found_name.as_str(), model);
            }
        }
        (&particle.namespace, particle.name.as_str(), &particle.model)
    }
}

const MAX_DEPTH: usize = 64;

impl SchemaDocument<'_> {
    /// Content model of an `xs:element`; `seen` guards recursive named types.
    fn model_of(&self, element: &XmlNode, seen: &mut Vec<String>) -> Model {
        if let Some(complex) = element.children.iter().find(|c| is_xsd(c, "complexType")) {
            return self.sequence_of(complex, seen);
        }
        let Some(type_name) = attribute(element, "type").map(local_name) else {
            return Model::Open;
        };
        let Some(complex) = self.types.get(type_name) else {
            return Model::Open;
        };
        if seen.iter().any(|s| s == type_name) {
            return Model::Open;
        }
        seen.push(type_name.to_string());
        let model = self.sequence_of(complex, seen);
        seen.pop();
        model
    }

    fn sequence_of(&self, complex: &XmlNode, seen: &mut Vec<String>) -> Model {
        let Some(sequence) = complex.children.iter().find(|c| is_xsd(c, "sequence")) else {
            return Model::Open;
        };
        let particles = sequence
            .children
            .iter()
            .filter(|c| is_xsd(c, "element"))
            .filter_map(|c| self.particle(c, seen))
            .collect();
        Model::Sequence(particles)
    }

    fn particle(&self, element: &XmlNode, seen: &mut Vec<String>) -> Option<Particle> {
        let min = attribute(element, "minOccurs")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let max = match attribute(element, "maxOccurs") {
            Some("unbounded") => None,
            Some(value) => Some(value.parse().unwrap_or(1)),
            None => Some(1),
        };

        if let Some(reference) = attribute(element, "ref").map(local_name) {
            return Some(Particle {
                namespace: self.target.clone(),
                name: reference.to_string(),
                min,
                max,
                model: Model::Global {
                    namespace: self.target.clone(),
                    name: reference.to_string(),
                },
            });
        }

        let name = attribute(element, "name")?;
        let qualified = match attribute(element, "form") {
            Some(form) => form == "qualified",
            None => self.qualified,
        };
        Some(Particle {
            namespace: if qualified { self.target.clone() } else { None },
            name: name.to_string(),
            min,
            max,
            model: self.model_of(element, seen),
        })
    }
}

/// Check the envelope shape and return its `Body` element.
pub fn validate_envelope<'a>(
    envelope: &'a XmlNode,
    soap_namespace: &str,
) -> Result<&'a XmlNode, String> {
    if envelope.namespace.as_deref() != Some(soap_namespace) || envelope.name != "Envelope" {
        return Err(format!(
            "Root element {} is not a SOAP Envelope",
            envelope.qualified_name()
        ));
    }
    let mut body = None;
    for child in &envelope.children {
        let in_soap = child.namespace.as_deref() == Some(soap_namespace);
        match child.name.as_str() {
            "Body" if in_soap && body.is_none() => body = Some(child),
            "Header" if in_soap && body.is_none() => {}
            _ => {
                return Err(format!(
                    "Unexpected element {} in SOAP Envelope",
                    child.qualified_name()
                ))
            }
        }
    }
    body.ok_or_else(|| "No 'Body' part found".to_string())
}

fn is_xsd(node: &XmlNode, name: &str) -> bool {
    node.namespace.as_deref() == Some(XSD_NAMESPACE) && node.name == name
}

fn attribute<'a>(node: &'a XmlNode, name: &str) -> Option<&'a str> {
    node.attributes
        .iter()
        .find(|attr| attr.namespace.is_none() && attr.name == name)
        .map(|attr| attr.value.as_str())
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}
