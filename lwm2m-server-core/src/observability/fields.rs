/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
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

//! Canonical structured field values and value-format helpers.

use crate::codec::ContentFormat;
use crate::model::Registration;
use crate::wire::WireRequest;

pub const NONE: &str = "none";
pub const REASON_DEREGISTERED: &str = "deregistered";
pub const REASON_REPLACED: &str = "replaced";
pub const REASON_EXPIRED: &str = "expired";
pub const REASON_PRESENCE_SLEEPING: &str = "presence_sleeping";
pub const REASON_CALLER_TIMEOUT: &str = "caller_timeout";

/// Identity fields logged with every per-device event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceContext {
    pub registration_id: String,
    pub endpoint: String,
    pub peer: String,
}

impl DeviceContext {
    pub fn from_registration(registration: &Registration) -> Self {
        Self {
            registration_id: registration.id.clone(),
            endpoint: registration.endpoint.clone(),
            peer: registration.address.to_string(),
        }
    }
}

pub fn format_content_format(content_format: Option<ContentFormat>) -> String {
    content_format
        .map(|format| format.to_string())
        .unwrap_or_else(|| NONE.to_string())
}

pub fn format_request_target(request: &WireRequest) -> String {
    format!("{} {}", request.method, request.path_string())
}

#[cfg(test)]
mod tests {
    use super::{format_content_format, format_request_target, DeviceContext, NONE};
    use crate::codec::ContentFormat;
    use crate::model::Registration;
    use crate::wire::{CoapMethod, Token, WireRequest};
    use chrono::Utc;

    #[test]
    fn device_context_copies_registration_identity() {
        let registration = Registration::new(
            "dev-1",
            "192.0.2.1:5683".parse().expect("valid address"),
            Utc::now(),
        );

        let context = DeviceContext::from_registration(&registration);

        assert_eq!(context.registration_id, registration.id);
        assert_eq!(context.endpoint, "dev-1");
        assert_eq!(context.peer, "192.0.2.1:5683");
    }

    #[test]
    fn formats_optional_content_format_and_request_target() {
        assert_eq!(format_content_format(None), NONE);
        assert_eq!(format_content_format(Some(ContentFormat::TLV)), "TLV(11542)");

        let mut request = WireRequest::new(
            "192.0.2.1:5683".parse().expect("valid address"),
            CoapMethod::Get,
            Token::generate(),
        );
        request.uri_path = vec!["3".to_string(), "0".to_string(), "15".to_string()];

        assert_eq!(format_request_target(&request), "GET /3/0/15");
    }
}
