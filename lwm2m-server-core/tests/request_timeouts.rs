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

mod support;

use integration_test_utils::{device_addr, DeviceReply, ReplyTemplate};
use lwm2m_server_core::data_plane::{DownlinkRequest, TranslationError};
use lwm2m_server_core::model::ObjectPath;
use lwm2m_server_core::transport::{ExchangeFailure, TransportError};
use lwm2m_server_core::wire::{CoapMethod, ResponseCode, WireResponse};
use lwm2m_server_core::{SendError, ServerConfig};
use std::time::Duration;
use support::{make_harness, register_device};
use tokio::sync::oneshot;
use tokio::time::Instant;

const MANUFACTURER: ObjectPath = ObjectPath::resource(3, 0, 0);

#[tokio::test(start_paused = true)]
async fn silent_device_times_out_without_an_error() {
    let harness = make_harness(ServerConfig::default());
    let registration = register_device(&harness, device_addr(1), "dev-1", 3600, "U").await;

    let started = Instant::now();
    let result = harness
        .server
        .send(
            &registration,
            DownlinkRequest::read(MANUFACTURER),
            Some(Duration::from_millis(500)),
        )
        .await;

    assert!(matches!(result, Ok(None)));
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(harness.server.pending_request_count(&registration.id).await, 0);

    let history = harness.transport.history();
    assert_eq!(history.sent.len(), 1);
    assert_eq!(history.sent[0].method, CoapMethod::Get);
    assert_eq!(history.sent[0].uri_path, vec!["3", "0", "0"]);
    assert_eq!(history.cancelled_exchanges.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn configured_default_timeout_applies_when_none_is_given() {
    let config = ServerConfig {
        request_timeout_ms: 1_000,
        ..ServerConfig::default()
    };
    let harness = make_harness(config);
    let registration = register_device(&harness, device_addr(1), "dev-1", 3600, "U").await;

    let started = Instant::now();
    let result = harness
        .server
        .send(&registration, DownlinkRequest::read(MANUFACTURER), None)
        .await;

    assert!(matches!(result, Ok(None)));
    assert!(started.elapsed() >= Duration::from_millis(1_000));
}

#[tokio::test(start_paused = true)]
async fn callback_send_reports_the_timeout_through_the_error_callback() {
    let harness = make_harness(ServerConfig::default());
    let registration = register_device(&harness, device_addr(1), "dev-1", 3600, "U").await;

    let (outcome_tx, outcome_rx) = oneshot::channel();
    let handle = harness.server.send_with_callbacks(
        (*registration).clone(),
        DownlinkRequest::read(MANUFACTURER),
        Some(Duration::from_millis(500)),
        |_| panic!("a silent device cannot answer"),
        move |err| {
            let _ = outcome_tx.send(err);
        },
    );

    assert!(matches!(outcome_rx.await, Ok(SendError::TimedOut)));
    handle.await.expect("callback task completes");
    assert_eq!(harness.server.pending_request_count(&registration.id).await, 0);
}

#[tokio::test(start_paused = true)]
async fn a_response_arriving_after_the_timeout_is_discarded() {
    let harness = make_harness(ServerConfig::default());
    let registration = register_device(&harness, device_addr(1), "dev-1", 3600, "U").await;

    let result = harness
        .server
        .send(
            &registration,
            DownlinkRequest::read(MANUFACTURER),
            Some(Duration::from_millis(500)),
        )
        .await;
    assert!(matches!(result, Ok(None)));

    let history = harness.transport.history();
    let late = WireResponse::new(ResponseCode::CONTENT, history.sent[0].token.clone());
    harness
        .transport
        .deliver_late_response(history.cancelled_exchanges[0], late)
        .await;

    assert_eq!(harness.server.pending_request_count(&registration.id).await, 0);
    assert!(harness.observations.events().is_empty());
}

#[tokio::test]
async fn allowed_error_codes_are_responses_and_others_are_protocol_violations() {
    let harness = make_harness(ServerConfig::default());
    let registration = register_device(&harness, device_addr(1), "dev-1", 3600, "U").await;

    let mut not_found = ReplyTemplate::code(ResponseCode::NOT_FOUND);
    not_found.payload = b"no such resource".to_vec();
    harness.transport.push_reply(DeviceReply::Respond(not_found));
    let response = harness
        .server
        .send(&registration, DownlinkRequest::read(MANUFACTURER), None)
        .await
        .expect("an allowed error code is a response")
        .expect("device answered");
    assert_eq!(response.code, ResponseCode::NOT_FOUND);
    assert!(!response.is_success());
    assert_eq!(response.error_message.as_deref(), Some("no such resource"));

    harness
        .transport
        .push_reply(DeviceReply::Respond(ReplyTemplate::code(ResponseCode::CHANGED)));
    let err = harness
        .server
        .send(&registration, DownlinkRequest::read(MANUFACTURER), None)
        .await
        .expect_err("2.04 is not a valid read answer");
    assert!(err.is_protocol_violation());
    assert!(matches!(
        err,
        SendError::Translation(TranslationError::UnexpectedResponse {
            code: ResponseCode::CHANGED,
            ..
        })
    ));
}

#[tokio::test]
async fn transport_failures_surface_as_send_errors() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;

    harness
        .transport
        .push_reply(DeviceReply::Refuse(TransportError::Unreachable(peer)));
    let result = harness
        .server
        .send(&registration, DownlinkRequest::read(MANUFACTURER), None)
        .await;
    assert!(matches!(
        result,
        Err(SendError::Transport(TransportError::Unreachable(addr))) if addr == peer
    ));

    harness
        .transport
        .push_reply(DeviceReply::Fail(ExchangeFailure::Rejected));
    let result = harness
        .server
        .send(&registration, DownlinkRequest::read(MANUFACTURER), None)
        .await;
    assert!(matches!(
        result,
        Err(SendError::Exchange(ExchangeFailure::Rejected))
    ));

    harness
        .transport
        .push_reply(DeviceReply::Fail(ExchangeFailure::Timeout));
    let result = harness
        .server
        .send(&registration, DownlinkRequest::read(MANUFACTURER), None)
        .await;
    assert!(matches!(result, Ok(None)));

    assert_eq!(harness.server.pending_request_count(&registration.id).await, 0);
}

#[tokio::test]
async fn sending_to_an_unknown_endpoint_is_refused() {
    let harness = make_harness(ServerConfig::default());

    let result = harness
        .server
        .send_to_endpoint("nobody", DownlinkRequest::read(MANUFACTURER), None)
        .await;

    assert!(matches!(result, Err(SendError::UnknownRegistration(name)) if name == "nobody"));
    assert_eq!(harness.transport.sent_count(), 0);
}
