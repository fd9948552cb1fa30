/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! CoRE link-format (RFC 6690) as used for object links and discover responses.

use crate::model::ObjectPath;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Resource type announcing the LWM2M root path in a registration payload.
pub const LWM2M_ROOT_RESOURCE_TYPE: &str = "oma.lwm2m";
pub const DEFAULT_ROOT_PATH: &str = "/";

/// One `<uri>;attr=value` entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Link {
    pub uri_reference: String,
    pub attributes: BTreeMap<String, Option<String>>,
}

impl Link {
    pub fn new(uri_reference: impl Into<String>) -> Self {
        Self {
            uri_reference: uri_reference.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: Option<&str>) -> Self {
        self.attributes
            .insert(name.to_string(), value.map(str::to_string));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|value| value.as_deref())
    }

    /// Object path of this link relative to `root_path`, if it addresses an object tree node.
    pub fn object_path(&self, root_path: &str) -> Option<ObjectPath> {
        let root = root_path.trim_end_matches('/');
        let relative = self.uri_reference.strip_prefix(root)?;
        if relative.is_empty() || !relative.starts_with('/') {
            return None;
        }
        ObjectPath::from_str(relative)
            .ok()
            .filter(|path| !path.is_root())
    }
}

impl Display for Link {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.uri_reference)?;
        for (name, value) in &self.attributes {
            match value {
                Some(value) if needs_quotes(value) => write!(f, ";{name}=\"{value}\"")?,
                Some(value) => write!(f, ";{name}={value}")?,
                None => write!(f, ";{name}")?,
            }
        }
        Ok(())
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty() || !value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '.')
}

/// Link-format parse failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkParseError(String);

impl Display for LinkParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid link format: {}", self.0)
    }
}

impl Error for LinkParseError {}

fn split_outside_quotes(input: &str, separator: char) -> Result<Vec<&str>, LinkParseError> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut start = 0;

    for (index, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_brackets = true,
            '>' if !in_quotes => in_brackets = false,
            c if c == separator && !in_quotes && !in_brackets => {
                parts.push(&input[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err(LinkParseError("unterminated quoted string".to_string()));
    }
    parts.push(&input[start..]);
    Ok(parts)
}

fn parse_link(entry: &str) -> Result<Link, LinkParseError> {
    let mut parts = split_outside_quotes(entry.trim(), ';')?.into_iter();
    let target = parts.next().unwrap_or_default().trim();

    let uri_reference = target
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .ok_or_else(|| LinkParseError(format!("'{target}' is not enclosed in '<' '>'")))?;

    let mut link = Link::new(uri_reference);
    for attribute in parts {
        let attribute = attribute.trim();
        if attribute.is_empty() {
            continue;
        }
        match attribute.split_once('=') {
            Some((name, value)) => {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|rest| rest.strip_suffix('"'))
                    .unwrap_or(value);
                link.attributes
                    .insert(name.trim().to_string(), Some(value.to_string()));
            }
            None => {
                link.attributes.insert(attribute.to_string(), None);
            }
        }
    }
    Ok(link)
}

/// Parses a link-format document. An empty document yields no links.
pub fn parse_link_format(input: &str) -> Result<Vec<Link>, LinkParseError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_outside_quotes(input, ',')?
        .into_iter()
        .map(parse_link)
        .collect()
}

/// Serializes links back into a link-format document.
pub fn format_links(links: &[Link]) -> String {
    links
        .iter()
        .map(Link::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Root path announced with `rt="oma.lwm2m"`, or `/` when the device announced none.
pub fn root_path(links: &[Link]) -> String {
    links
        .iter()
        .find(|link| link.attribute("rt") == Some(LWM2M_ROOT_RESOURCE_TYPE))
        .map(|link| {
            let path = link.uri_reference.trim_end_matches('/');
            format!("{path}/")
        })
        .unwrap_or_else(|| DEFAULT_ROOT_PATH.to_string())
}
