// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A small namespace-aware element tree built on `quick-xml`.
//!
//! Feeds mix RSS, Atom and several extension namespaces, often declared
//! with unusual prefixes. Elements are therefore matched by local name
//! (case-insensitively) and by resolved namespace URI, never by prefix.

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;

use crate::error::XmlError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Resolved namespace URI; the raw prefix if it was never declared;
    /// empty when unqualified
    pub namespace: String,
    /// Local name without prefix
    pub name: String,
    /// Attributes keyed by local name
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA content
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn is(&self, local: &str) -> bool {
        self.name.eq_ignore_ascii_case(local)
    }

    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(local))
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(local))
    }

    /// Trimmed attribute value, empty when absent
    pub fn attr(&self, key: &str) -> &str {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.trim())
            .unwrap_or("")
    }

    /// Trimmed text content
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text of the first child with this local name, empty when absent
    pub fn child_text(&self, local: &str) -> &str {
        self.child(local).map(Element::text).unwrap_or("")
    }

    /// Case-insensitive substring match against the namespace
    pub fn namespace_contains(&self, needle: &str) -> bool {
        self.namespace.to_ascii_lowercase().contains(needle)
    }
}

/// Parse a complete document into its root element
pub fn parse_document(xml: &str) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (namespace, event) = reader.read_resolved_event()?;
        let namespace = namespace_string(namespace);

        match event {
            Event::Start(start) => {
                stack.push(open_element(namespace, &start)?);
            }
            Event::Empty(start) => {
                let element = open_element(namespace, &start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    match text.unescape() {
                        Ok(unescaped) => top.text.push_str(&unescaped),
                        // Unknown entities such as &nbsp; are kept verbatim.
                        Err(_) => top.text.push_str(&String::from_utf8_lossy(&text)),
                    }
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }
    root.ok_or(XmlError::NoRoot)
}

fn namespace_string(resolved: ResolveResult<'_>) -> String {
    match resolved {
        ResolveResult::Bound(ns) => String::from_utf8_lossy(ns.as_ref()).into_owned(),
        ResolveResult::Unknown(prefix) => String::from_utf8_lossy(&prefix).into_owned(),
        ResolveResult::Unbound => String::new(),
    }
}

fn open_element(namespace: String, start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }

    Ok(Element {
        namespace,
        name,
        attributes,
        ..Default::default()
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
