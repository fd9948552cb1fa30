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

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Path into a device's object tree: `/object/instance/resource/resource-instance`.
///
/// An instance id may be left out while a resource id is present; such a path targets
/// instance `0` on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct ObjectPath {
    object_id: Option<u16>,
    object_instance_id: Option<u16>,
    resource_id: Option<u16>,
    resource_instance_id: Option<u16>,
}

impl ObjectPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn object(object_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            ..Self::default()
        }
    }

    pub fn instance(object_id: u16, object_instance_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(object_instance_id),
            ..Self::default()
        }
    }

    pub const fn resource(object_id: u16, object_instance_id: u16, resource_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(object_instance_id),
            resource_id: Some(resource_id),
            resource_instance_id: None,
        }
    }

    pub const fn resource_instance(
        object_id: u16,
        object_instance_id: u16,
        resource_id: u16,
        resource_instance_id: u16,
    ) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(object_instance_id),
            resource_id: Some(resource_id),
            resource_instance_id: Some(resource_instance_id),
        }
    }

    /// Builds a path whose instance id may be omitted even though a resource id is set.
    pub fn new(object_id: u16, object_instance_id: Option<u16>, resource_id: Option<u16>) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id,
            resource_id,
            resource_instance_id: None,
        }
    }

    pub fn object_id(&self) -> Option<u16> {
        self.object_id
    }

    pub fn object_instance_id(&self) -> Option<u16> {
        self.object_instance_id
    }

    pub fn resource_id(&self) -> Option<u16> {
        self.resource_id
    }

    pub fn resource_instance_id(&self) -> Option<u16> {
        self.resource_instance_id
    }

    pub fn is_root(&self) -> bool {
        self.object_id.is_none()
    }

    pub fn is_object(&self) -> bool {
        self.object_id.is_some() && self.object_instance_id.is_none() && self.resource_id.is_none()
    }

    pub fn is_object_instance(&self) -> bool {
        self.object_instance_id.is_some() && self.resource_id.is_none()
    }

    pub fn is_resource(&self) -> bool {
        self.resource_id.is_some() && self.resource_instance_id.is_none()
    }

    pub fn is_resource_instance(&self) -> bool {
        self.resource_instance_id.is_some()
    }

    /// Wire URI segments, defaulting a missing instance id to `0` when a resource id is set.
    pub fn to_segments(&self) -> Vec<String> {
        let Some(object_id) = self.object_id else {
            return Vec::new();
        };

        let mut segments = vec![object_id.to_string()];
        match (self.object_instance_id, self.resource_id) {
            (Some(instance_id), _) => segments.push(instance_id.to_string()),
            (None, Some(_)) => segments.push("0".to_string()),
            (None, None) => return segments,
        }

        if let Some(resource_id) = self.resource_id {
            segments.push(resource_id.to_string());
            if let Some(resource_instance_id) = self.resource_instance_id {
                segments.push(resource_instance_id.to_string());
            }
        }
        segments
    }
}

impl Display for ObjectPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.to_segments().join("/"))
    }
}

/// Failure to parse an [`ObjectPath`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathParseError {
    input: String,
    reason: &'static str,
}

impl PathParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl Display for PathParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid object path '{}': {}", self.input, self.reason)
    }
}

impl Error for PathParseError {}

impl FromStr for ObjectPath {
    type Err = PathParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(ObjectPath::root());
        }
        let Some(relative) = trimmed.strip_prefix('/') else {
            return Err(PathParseError::new(input, "path must start with '/'"));
        };

        let ids = relative
            .split('/')
            .map(|segment| segment.parse::<u16>())
            .collect::<Result<Vec<u16>, _>>()
            .map_err(|_| PathParseError::new(input, "segments must be 16 bit unsigned ids"))?;

        match ids.as_slice() {
            [object] => Ok(ObjectPath::object(*object)),
            [object, instance] => Ok(ObjectPath::instance(*object, *instance)),
            [object, instance, resource] => Ok(ObjectPath::resource(*object, *instance, *resource)),
            [object, instance, resource, resource_instance] => Ok(
                ObjectPath::resource_instance(*object, *instance, *resource, *resource_instance),
            ),
            _ => Err(PathParseError::new(input, "too many segments")),
        }
    }
}
