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

use crate::codec::ContentFormat;
use crate::model::ObjectPath;
use crate::wire::Token;
use std::collections::BTreeMap;

/// Context key holding the content format requested by the observe request.
pub const CONTEXT_CONTENT_FORMAT: &str = "content_format";
/// Context key holding the endpoint name of the observed device.
pub const CONTEXT_ENDPOINT: &str = "endpoint";

/// A standing subscription to changes at one path of one registration.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Observation {
    pub token: Token,
    pub registration_id: String,
    pub path: ObjectPath,
    pub context: BTreeMap<String, String>,
}

impl Observation {
    pub fn new(token: Token, registration_id: &str, path: ObjectPath) -> Self {
        Self {
            token,
            registration_id: registration_id.to_string(),
            path,
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Content format to assume for notifications that carry no content-format option.
    pub fn content_format_hint(&self) -> Option<ContentFormat> {
        self.context
            .get(CONTEXT_CONTENT_FORMAT)
            .and_then(|value| value.parse::<u16>().ok())
            .map(ContentFormat)
    }
}
