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

//! Resource tree values and the codec collaborator boundary.
//!
//! The binary/text encodings (TLV, LWM2M JSON, SenML, CBOR) live outside this crate and
//! are plugged in through [`NodeCodec`].

use crate::model::ObjectPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Content-format tag identifying the codec used for a body.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContentFormat(pub u16);

impl ContentFormat {
    pub const TEXT: ContentFormat = ContentFormat(0);
    pub const LINK: ContentFormat = ContentFormat(40);
    pub const OPAQUE: ContentFormat = ContentFormat(42);
    pub const CBOR: ContentFormat = ContentFormat(60);
    pub const SENML_JSON: ContentFormat = ContentFormat(110);
    pub const SENML_CBOR: ContentFormat = ContentFormat(112);
    pub const OLD_TLV: ContentFormat = ContentFormat(1542);
    pub const OLD_JSON: ContentFormat = ContentFormat(1543);
    pub const TLV: ContentFormat = ContentFormat(11542);
    pub const JSON: ContentFormat = ContentFormat(11543);

    pub fn code(&self) -> u16 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "TEXT",
            40 => "LINK",
            42 => "OPAQUE",
            60 => "CBOR",
            110 => "SENML_JSON",
            112 => "SENML_CBOR",
            1542 | 11542 => "TLV",
            1543 | 11543 => "JSON",
            _ => "UNKNOWN",
        }
    }
}

impl Display for ContentFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// Typed value of a single resource or resource instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Integer(i64),
    UnsignedInteger(u64),
    Float(f64),
    Boolean(bool),
    Opaque(Vec<u8>),
    Time(DateTime<Utc>),
    ObjectLink { object_id: u16, instance_id: u16 },
}

/// Resource node: either single-valued or multi-instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Single { id: u16, value: Value },
    Multiple { id: u16, instances: BTreeMap<u16, Value> },
}

impl Resource {
    pub fn id(&self) -> u16 {
        match self {
            Resource::Single { id, .. } | Resource::Multiple { id, .. } => *id,
        }
    }
}

/// Object instance node. `id` may be omitted for create requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectInstance {
    pub id: Option<u16>,
    pub resources: BTreeMap<u16, Resource>,
}

impl ObjectInstance {
    pub fn new(id: Option<u16>, resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            id,
            resources: resources
                .into_iter()
                .map(|resource| (resource.id(), resource))
                .collect(),
        }
    }
}

/// A decoded resource tree rooted at an object, instance, resource or resource instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lwm2mNode {
    Object {
        id: u16,
        instances: BTreeMap<u16, ObjectInstance>,
    },
    ObjectInstance(ObjectInstance),
    Resource(Resource),
    ResourceInstance {
        id: u16,
        value: Value,
    },
}

impl Lwm2mNode {
    pub fn single(id: u16, value: Value) -> Self {
        Lwm2mNode::Resource(Resource::Single { id, value })
    }
}

/// A node with the time it was sampled at, when the payload carried one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimestampedNode {
    pub timestamp: Option<DateTime<Utc>>,
    pub node: Lwm2mNode,
}

impl TimestampedNode {
    pub fn untimestamped(node: Lwm2mNode) -> Self {
        Self {
            timestamp: None,
            node,
        }
    }

    pub fn at(timestamp: DateTime<Utc>, node: Lwm2mNode) -> Self {
        Self {
            timestamp: Some(timestamp),
            node,
        }
    }
}

/// Codec failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CodecError {
    UnsupportedFormat(ContentFormat),
    Invalid(String),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnsupportedFormat(format) => {
                write!(f, "content format {format} is not supported")
            }
            CodecError::Invalid(reason) => write!(f, "invalid payload: {reason}"),
        }
    }
}

impl Error for CodecError {}

/// Encodes and decodes resource trees for a set of content formats.
pub trait NodeCodec: Send + Sync {
    fn supports(&self, format: ContentFormat) -> bool;

    fn encode(
        &self,
        node: &Lwm2mNode,
        path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Vec<u8>, CodecError>;

    fn decode(
        &self,
        payload: &[u8],
        path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Lwm2mNode, CodecError>;

    /// Decodes a payload which may carry several timestamped samples.
    ///
    /// Formats without timestamps yield exactly one untimestamped node.
    fn decode_timestamped(
        &self,
        payload: &[u8],
        path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Vec<TimestampedNode>, CodecError> {
        self.decode(payload, path, format)
            .map(|node| vec![TimestampedNode::untimestamped(node)])
    }
}
