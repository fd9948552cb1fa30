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

use lwm2m_server_core::codec::ContentFormat;
use lwm2m_server_core::wire::{CoapMethod, InboundNotification, InboundRequest, ResponseCode, Token};
use std::net::SocketAddr;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a test log subscriber once per process, filtered by `RUST_LOG`.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Address of the n-th simulated device.
pub fn device_addr(n: u8) -> SocketAddr {
    SocketAddr::from(([192, 0, 2, n], 5683))
}

/// `POST /rd?ep=..&lt=..&b=..` with the given object links.
pub fn register_request(
    peer: SocketAddr,
    endpoint: &str,
    lifetime_secs: u64,
    binding: &str,
    links: &str,
) -> InboundRequest {
    InboundRequest {
        peer,
        method: CoapMethod::Post,
        confirmable: true,
        uri_path: vec!["rd".to_string()],
        uri_query: vec![
            format!("ep={endpoint}"),
            format!("lt={lifetime_secs}"),
            format!("b={binding}"),
        ],
        content_format: Some(ContentFormat::LINK),
        payload: links.as_bytes().to_vec(),
    }
}

/// `POST /rd/<id>` without parameters.
pub fn update_request(peer: SocketAddr, registration_id: &str) -> InboundRequest {
    InboundRequest {
        peer,
        method: CoapMethod::Post,
        confirmable: true,
        uri_path: vec!["rd".to_string(), registration_id.to_string()],
        uri_query: Vec::new(),
        content_format: None,
        payload: Vec::new(),
    }
}

/// `DELETE /rd/<id>`.
pub fn deregister_request(peer: SocketAddr, registration_id: &str) -> InboundRequest {
    InboundRequest {
        peer,
        method: CoapMethod::Delete,
        confirmable: true,
        uri_path: vec!["rd".to_string(), registration_id.to_string()],
        uri_query: Vec::new(),
        content_format: None,
        payload: Vec::new(),
    }
}

pub fn notification(
    peer: SocketAddr,
    token: &Token,
    observe: u32,
    content_format: ContentFormat,
    payload: Vec<u8>,
) -> InboundNotification {
    InboundNotification {
        peer,
        token: token.clone(),
        code: ResponseCode::CONTENT,
        content_format: Some(content_format),
        observe: Some(observe),
        payload,
    }
}
