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

//! Abstract device-management requests and their responses.

use crate::codec::{ContentFormat, Lwm2mNode, ObjectInstance};
use crate::model::{Link, ObjectPath, Observation};
use crate::wire::ResponseCode;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationKind {
    Read,
    Discover,
    Write,
    WriteAttributes,
    Execute,
    Create,
    Delete,
    Observe,
    BootstrapWrite,
    BootstrapDelete,
    BootstrapFinish,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Discover => "discover",
            OperationKind::Write => "write",
            OperationKind::WriteAttributes => "write_attributes",
            OperationKind::Execute => "execute",
            OperationKind::Create => "create",
            OperationKind::Delete => "delete",
            OperationKind::Observe => "observe",
            OperationKind::BootstrapWrite => "bootstrap_write",
            OperationKind::BootstrapDelete => "bootstrap_delete",
            OperationKind::BootstrapFinish => "bootstrap_finish",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Write semantics: replace the target entirely or merge into it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteMode {
    Replace,
    Update,
}

/// Notification attribute names accepted by Write-Attributes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum NotificationAttribute {
    MinimumPeriod,
    MaximumPeriod,
    GreaterThan,
    LessThan,
    Step,
    EvaluationMinimumPeriod,
    EvaluationMaximumPeriod,
}

impl NotificationAttribute {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationAttribute::MinimumPeriod => "pmin",
            NotificationAttribute::MaximumPeriod => "pmax",
            NotificationAttribute::GreaterThan => "gt",
            NotificationAttribute::LessThan => "lt",
            NotificationAttribute::Step => "st",
            NotificationAttribute::EvaluationMinimumPeriod => "epmin",
            NotificationAttribute::EvaluationMaximumPeriod => "epmax",
        }
    }
}

/// Attribute assignments. A `None` value unsets the attribute on the device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeSet {
    values: BTreeMap<NotificationAttribute, Option<String>>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: NotificationAttribute, value: impl Display) -> Self {
        self.values.insert(attribute, Some(value.to_string()));
        self
    }

    pub fn unset(mut self, attribute: NotificationAttribute) -> Self {
        self.values.insert(attribute, None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// URI query parameters, e.g. `["pmin=10", "gt"]`.
    pub fn to_query(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(attribute, value)| match value {
                Some(value) => format!("{}={value}", attribute.name()),
                None => attribute.name().to_string(),
            })
            .collect()
    }
}

/// One device-management operation addressed at a registered device.
#[derive(Clone, Debug, PartialEq)]
pub enum DownlinkRequest {
    Read {
        path: ObjectPath,
        format: Option<ContentFormat>,
    },
    Discover {
        path: ObjectPath,
    },
    Write {
        path: ObjectPath,
        mode: WriteMode,
        format: ContentFormat,
        node: Lwm2mNode,
    },
    WriteAttributes {
        path: ObjectPath,
        attributes: AttributeSet,
    },
    Execute {
        path: ObjectPath,
        arguments: Option<String>,
    },
    Create {
        path: ObjectPath,
        format: ContentFormat,
        instances: Vec<ObjectInstance>,
    },
    Delete {
        path: ObjectPath,
    },
    Observe {
        path: ObjectPath,
        format: Option<ContentFormat>,
    },
    BootstrapWrite {
        path: ObjectPath,
        format: ContentFormat,
        node: Lwm2mNode,
    },
    BootstrapDelete {
        path: ObjectPath,
    },
    BootstrapFinish,
}

impl DownlinkRequest {
    pub fn read(path: ObjectPath) -> Self {
        DownlinkRequest::Read { path, format: None }
    }

    pub fn observe(path: ObjectPath) -> Self {
        DownlinkRequest::Observe { path, format: None }
    }

    pub fn discover(path: ObjectPath) -> Self {
        DownlinkRequest::Discover { path }
    }

    pub fn execute(path: ObjectPath) -> Self {
        DownlinkRequest::Execute {
            path,
            arguments: None,
        }
    }

    pub fn delete(path: ObjectPath) -> Self {
        DownlinkRequest::Delete { path }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            DownlinkRequest::Read { .. } => OperationKind::Read,
            DownlinkRequest::Discover { .. } => OperationKind::Discover,
            DownlinkRequest::Write { .. } => OperationKind::Write,
            DownlinkRequest::WriteAttributes { .. } => OperationKind::WriteAttributes,
            DownlinkRequest::Execute { .. } => OperationKind::Execute,
            DownlinkRequest::Create { .. } => OperationKind::Create,
            DownlinkRequest::Delete { .. } => OperationKind::Delete,
            DownlinkRequest::Observe { .. } => OperationKind::Observe,
            DownlinkRequest::BootstrapWrite { .. } => OperationKind::BootstrapWrite,
            DownlinkRequest::BootstrapDelete { .. } => OperationKind::BootstrapDelete,
            DownlinkRequest::BootstrapFinish => OperationKind::BootstrapFinish,
        }
    }

    /// Target path. `None` only for Bootstrap-Finish.
    pub fn path(&self) -> Option<&ObjectPath> {
        match self {
            DownlinkRequest::Read { path, .. }
            | DownlinkRequest::Discover { path }
            | DownlinkRequest::Write { path, .. }
            | DownlinkRequest::WriteAttributes { path, .. }
            | DownlinkRequest::Execute { path, .. }
            | DownlinkRequest::Create { path, .. }
            | DownlinkRequest::Delete { path }
            | DownlinkRequest::Observe { path, .. }
            | DownlinkRequest::BootstrapWrite { path, .. }
            | DownlinkRequest::BootstrapDelete { path } => Some(path),
            DownlinkRequest::BootstrapFinish => None,
        }
    }
}

/// Decoded body of a response.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseContent {
    Empty,
    Node(Lwm2mNode),
    Links(Vec<Link>),
    /// Location of a created object instance, e.g. `/3303/1`.
    Location(String),
    /// Observe answer. `observation` is `None` when the device answered without
    /// establishing a subscription.
    Observed {
        node: Lwm2mNode,
        observation: Option<Observation>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lwm2mResponse {
    pub operation: OperationKind,
    pub code: ResponseCode,
    pub content: ResponseContent,
    /// Diagnostic payload of an error response.
    pub error_message: Option<String>,
}

impl Lwm2mResponse {
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    pub fn node(&self) -> Option<&Lwm2mNode> {
        match &self.content {
            ResponseContent::Node(node) | ResponseContent::Observed { node, .. } => Some(node),
            _ => None,
        }
    }

    pub fn observation(&self) -> Option<&Observation> {
        match &self.content {
            ResponseContent::Observed { observation, .. } => observation.as_ref(),
            _ => None,
        }
    }
}
