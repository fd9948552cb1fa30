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

//! Transport-level message shapes exchanged with devices.
//!
//! These types describe CoAP-style requests and responses without committing to a
//! binary encoding; serializing them onto a datagram is the transport's job.

use crate::codec::ContentFormat;
use std::fmt::{self, Debug, Display, Formatter};
use std::net::SocketAddr;

/// CoAP request method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CoapMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl Display for CoapMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoapMethod::Get => "GET",
            CoapMethod::Post => "POST",
            CoapMethod::Put => "PUT",
            CoapMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// CoAP response code in `class.detail` form (for example `2.05`).
#[derive(Clone, Copy, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct ResponseCode {
    class: u8,
    detail: u8,
}

impl ResponseCode {
    pub const CREATED: ResponseCode = ResponseCode::new(2, 1);
    pub const DELETED: ResponseCode = ResponseCode::new(2, 2);
    pub const VALID: ResponseCode = ResponseCode::new(2, 3);
    pub const CHANGED: ResponseCode = ResponseCode::new(2, 4);
    pub const CONTENT: ResponseCode = ResponseCode::new(2, 5);
    pub const CONTINUE: ResponseCode = ResponseCode::new(2, 31);
    pub const BAD_REQUEST: ResponseCode = ResponseCode::new(4, 0);
    pub const UNAUTHORIZED: ResponseCode = ResponseCode::new(4, 1);
    pub const BAD_OPTION: ResponseCode = ResponseCode::new(4, 2);
    pub const FORBIDDEN: ResponseCode = ResponseCode::new(4, 3);
    pub const NOT_FOUND: ResponseCode = ResponseCode::new(4, 4);
    pub const METHOD_NOT_ALLOWED: ResponseCode = ResponseCode::new(4, 5);
    pub const NOT_ACCEPTABLE: ResponseCode = ResponseCode::new(4, 6);
    pub const REQUEST_ENTITY_INCOMPLETE: ResponseCode = ResponseCode::new(4, 8);
    pub const PRECONDITION_FAILED: ResponseCode = ResponseCode::new(4, 12);
    pub const REQUEST_ENTITY_TOO_LARGE: ResponseCode = ResponseCode::new(4, 13);
    pub const UNSUPPORTED_CONTENT_FORMAT: ResponseCode = ResponseCode::new(4, 15);
    pub const INTERNAL_SERVER_ERROR: ResponseCode = ResponseCode::new(5, 0);
    pub const NOT_IMPLEMENTED: ResponseCode = ResponseCode::new(5, 1);
    pub const SERVICE_UNAVAILABLE: ResponseCode = ResponseCode::new(5, 3);

    pub const fn new(class: u8, detail: u8) -> Self {
        Self { class, detail }
    }

    pub fn class(&self) -> u8 {
        self.class
    }

    pub fn detail(&self) -> u8 {
        self.detail
    }

    pub fn is_success(&self) -> bool {
        self.class == 2
    }

    pub fn is_error(&self) -> bool {
        self.class == 4 || self.class == 5
    }
}

impl Display for ResponseCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class, self.detail)
    }
}

impl Debug for ResponseCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseCode({self})")
    }
}

/// Opaque request correlator carried in the CoAP token field (at most 8 bytes).
#[derive(Clone, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Token(Vec<u8>);

impl Token {
    pub const MAX_LEN: usize = 8;

    /// Generates a fresh random 8 byte token.
    pub fn generate() -> Self {
        let random = uuid::Uuid::new_v4();
        Self(random.as_bytes()[..Self::MAX_LEN].to_vec())
    }

    /// Wraps raw token bytes, truncating anything beyond [`Token::MAX_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(Self::MAX_LEN);
        Self(bytes[..len].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.to_hex())
    }
}

/// Observe option value used to subscribe (`0`) or cancel (`1`).
pub const OBSERVE_REGISTER: u32 = 0;
pub const OBSERVE_DEREGISTER: u32 = 1;

/// Outbound request addressed at one device.
#[derive(Clone, Debug, PartialEq)]
pub struct WireRequest {
    pub peer: SocketAddr,
    pub method: CoapMethod,
    pub token: Token,
    pub confirmable: bool,
    pub uri_path: Vec<String>,
    pub uri_query: Vec<String>,
    pub content_format: Option<ContentFormat>,
    pub accept: Option<ContentFormat>,
    pub observe: Option<u32>,
    pub payload: Vec<u8>,
}

impl WireRequest {
    pub fn new(peer: SocketAddr, method: CoapMethod, token: Token) -> Self {
        Self {
            peer,
            method,
            token,
            confirmable: true,
            uri_path: Vec::new(),
            uri_query: Vec::new(),
            content_format: None,
            accept: None,
            observe: None,
            payload: Vec::new(),
        }
    }

    /// Renders the URI path as `/a/b/c` for diagnostics.
    pub fn path_string(&self) -> String {
        format!("/{}", self.uri_path.join("/"))
    }
}

/// Response received from a device for one [`WireRequest`].
#[derive(Clone, Debug, PartialEq)]
pub struct WireResponse {
    pub code: ResponseCode,
    pub token: Token,
    pub content_format: Option<ContentFormat>,
    pub observe: Option<u32>,
    pub location_path: Vec<String>,
    pub payload: Vec<u8>,
}

impl WireResponse {
    pub fn new(code: ResponseCode, token: Token) -> Self {
        Self {
            code,
            token,
            content_format: None,
            observe: None,
            location_path: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn with_location(mut self, location_path: &[&str]) -> Self {
        self.location_path = location_path.iter().map(|segment| segment.to_string()).collect();
        self
    }

    pub fn with_payload(mut self, content_format: ContentFormat, payload: Vec<u8>) -> Self {
        self.content_format = Some(content_format);
        self.payload = payload;
        self
    }

    pub fn with_observe(mut self, observe: u32) -> Self {
        self.observe = Some(observe);
        self
    }

    /// Diagnostic payload text carried by error responses, when it is valid UTF-8.
    pub fn diagnostic_payload(&self) -> Option<String> {
        if self.payload.is_empty() {
            return None;
        }
        std::str::from_utf8(&self.payload).ok().map(str::to_string)
    }
}

/// Inbound request received from a device on the server-side resource tree.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundRequest {
    pub peer: SocketAddr,
    pub method: CoapMethod,
    pub confirmable: bool,
    pub uri_path: Vec<String>,
    pub uri_query: Vec<String>,
    pub content_format: Option<ContentFormat>,
    pub payload: Vec<u8>,
}

/// Server answer to an [`InboundRequest`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InboundResponse {
    pub code: ResponseCode,
    pub location_path: Vec<String>,
    pub payload: Option<String>,
}

impl InboundResponse {
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            location_path: Vec::new(),
            payload: None,
        }
    }

    pub fn with_diagnostic(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            location_path: Vec::new(),
            payload: Some(message.into()),
        }
    }
}

/// Inbound observe notification as surfaced by the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundNotification {
    pub peer: SocketAddr,
    pub token: Token,
    pub code: ResponseCode,
    pub content_format: Option<ContentFormat>,
    pub observe: Option<u32>,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::{ResponseCode, Token};

    #[test]
    fn response_code_renders_class_and_detail() {
        assert_eq!(ResponseCode::CONTENT.to_string(), "2.05");
        assert_eq!(ResponseCode::UNSUPPORTED_CONTENT_FORMAT.to_string(), "4.15");
        assert!(ResponseCode::CHANGED.is_success());
        assert!(ResponseCode::INTERNAL_SERVER_ERROR.is_error());
        assert!(!ResponseCode::CONTINUE.is_error());
    }

    #[test]
    fn generated_tokens_are_eight_bytes_and_distinct() {
        let first = Token::generate();
        let second = Token::generate();

        assert_eq!(first.as_bytes().len(), Token::MAX_LEN);
        assert_ne!(first, second);
    }

    #[test]
    fn token_from_bytes_truncates_and_renders_hex() {
        let token = Token::from_bytes(&[0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3, 4, 5]);

        assert_eq!(token.as_bytes().len(), Token::MAX_LEN);
        assert_eq!(token.to_hex(), "deadbeef00010203");
    }
}
