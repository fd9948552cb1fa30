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

use chrono::{Duration as ChronoDuration, Utc};
use integration_test_utils::{
    deregister_request, device_addr, notification, register_request, update_request, DeviceReply,
    RegistrationEvent, ReplyTemplate,
};
use lwm2m_server_core::data_plane::DownlinkRequest;
use lwm2m_server_core::listeners::UnregistrationCause;
use lwm2m_server_core::model::{ObjectPath, Registration};
use lwm2m_server_core::observe::NotificationOutcome;
use lwm2m_server_core::wire::{CoapMethod, InboundRequest, ResponseCode};
use lwm2m_server_core::{SendError, ServerConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{make_harness, register_device, string_resource, Harness, DEVICE_LINKS};
use tokio::sync::mpsc;

async fn observe(harness: &Harness, registration: &Registration, path: ObjectPath) {
    let (format, payload) = string_resource(path.resource_id().unwrap_or_default(), "initial");
    harness.transport.push_reply(DeviceReply::Respond(
        ReplyTemplate::content(format, payload).with_observe(0),
    ));
    let response = harness
        .server
        .send(registration, DownlinkRequest::observe(path), None)
        .await
        .expect("observe succeeds")
        .expect("device answered");
    assert!(response.observation().is_some());
}

async fn wait_for_pending(harness: &Harness, registration_id: &str, expected: usize) {
    for _ in 0..1000 {
        if harness.server.pending_request_count(registration_id).await == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {expected} pending requests");
}

#[tokio::test]
async fn register_update_and_deregister_through_rd() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);

    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;
    assert_eq!(registration.endpoint, "dev-1");
    assert_eq!(registration.lifetime_secs, 3600);
    assert_eq!(registration.object_links.len(), 3);

    let moved = device_addr(2);
    let response = harness
        .server
        .handle_registration_request(update_request(moved, &registration.id))
        .await;
    assert_eq!(response.code, ResponseCode::CHANGED);
    let updated = harness
        .server
        .get_registration_by_endpoint("dev-1")
        .await
        .expect("store is available")
        .expect("still registered");
    assert_eq!(updated.address, moved);
    assert_eq!(updated.id, registration.id);

    let response = harness
        .server
        .handle_registration_request(deregister_request(moved, &registration.id))
        .await;
    assert_eq!(response.code, ResponseCode::DELETED);
    assert!(harness
        .server
        .get_registration(&registration.id)
        .await
        .expect("store is available")
        .is_none());

    assert_eq!(
        harness.registrations.events(),
        vec![
            RegistrationEvent::Registered {
                registration_id: registration.id.clone(),
                endpoint: "dev-1".to_string(),
                replaced: None,
            },
            RegistrationEvent::Updated {
                registration_id: registration.id.clone(),
            },
            RegistrationEvent::Unregistered {
                registration_id: registration.id.clone(),
                observations: 0,
                cause: UnregistrationCause::Deregistered,
            },
        ]
    );
}

#[tokio::test]
async fn malformed_registration_requests_are_rejected() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);

    let mut missing_endpoint = register_request(peer, "dev-1", 60, "U", DEVICE_LINKS);
    missing_endpoint.uri_query.retain(|entry| !entry.starts_with("ep="));
    let response = harness.server.handle_registration_request(missing_endpoint).await;
    assert_eq!(response.code, ResponseCode::BAD_REQUEST);

    let mut non_confirmable = register_request(peer, "dev-1", 60, "U", DEVICE_LINKS);
    non_confirmable.confirmable = false;
    let response = harness.server.handle_registration_request(non_confirmable).await;
    assert_eq!(response.code, ResponseCode::BAD_REQUEST);

    let bad_links = register_request(peer, "dev-1", 60, "U", "</1/0");
    let response = harness.server.handle_registration_request(bad_links).await;
    assert_eq!(response.code, ResponseCode::BAD_REQUEST);

    let response = harness
        .server
        .handle_registration_request(update_request(peer, "unknown"))
        .await;
    assert_eq!(response.code, ResponseCode::NOT_FOUND);

    let response = harness
        .server
        .handle_registration_request(InboundRequest {
            peer,
            method: CoapMethod::Get,
            confirmable: true,
            uri_path: vec!["rd".to_string()],
            uri_query: Vec::new(),
            content_format: None,
            payload: Vec::new(),
        })
        .await;
    assert_eq!(response.code, ResponseCode::METHOD_NOT_ALLOWED);

    assert!(harness.registrations.events().is_empty());
    assert!(harness
        .server
        .all_registrations()
        .await
        .expect("store is available")
        .is_empty());
}

#[tokio::test]
async fn re_registration_replaces_and_cleans_up_the_previous_registration() {
    let harness = make_harness(ServerConfig::default());
    let first = register_device(&harness, device_addr(1), "dev-1", 3600, "U").await;
    observe(&harness, &first, ObjectPath::resource(3, 0, 15)).await;

    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    harness.server.send_with_callbacks(
        (*first).clone(),
        DownlinkRequest::read(ObjectPath::resource(3, 0, 0)),
        Some(Duration::from_secs(30)),
        |_| panic!("a silent device cannot answer"),
        move |err| {
            let _ = errors_tx.send(err);
        },
    );
    wait_for_pending(&harness, &first.id, 1).await;

    let second = register_device(&harness, device_addr(9), "dev-1", 3600, "U").await;
    assert_ne!(first.id, second.id);

    assert!(matches!(errors_rx.recv().await, Some(SendError::Cancelled)));
    assert!(harness.server.get_observations(&first.id).await.is_empty());
    let all = harness.server.all_registrations().await.expect("store is available");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, second.id);

    let events = harness.registrations.events();
    assert!(events.contains(&RegistrationEvent::Unregistered {
        registration_id: first.id.clone(),
        observations: 1,
        cause: UnregistrationCause::Replaced,
    }));
    assert_eq!(
        events.last(),
        Some(&RegistrationEvent::Registered {
            registration_id: second.id.clone(),
            endpoint: "dev-1".to_string(),
            replaced: Some(first.id.clone()),
        })
    );
}

#[tokio::test]
async fn deregistration_cancels_every_pending_request_and_observation() {
    const PENDING: usize = 3;
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;

    let paths = [ObjectPath::resource(3, 0, 15), ObjectPath::resource(3303, 0, 5700)];
    for path in paths {
        observe(&harness, &registration, path).await;
    }
    let observations = harness.server.get_observations(&registration.id).await;
    assert_eq!(observations.len(), paths.len());

    let failures = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for resource in 0..PENDING as u16 {
        let failures = failures.clone();
        handles.push(harness.server.send_with_callbacks(
            (*registration).clone(),
            DownlinkRequest::read(ObjectPath::resource(3, 0, resource)),
            Some(Duration::from_secs(30)),
            |_| panic!("a silent device cannot answer"),
            move |err| failures.lock().expect("lock").push(err),
        ));
    }
    wait_for_pending(&harness, &registration.id, PENDING).await;
    let cancelled_before = harness.transport.history().cancelled_exchanges.len();

    let removed = harness
        .server
        .lifecycle()
        .deregister(&registration.id)
        .await
        .expect("store is available")
        .expect("registration existed");
    for handle in handles {
        handle.await.expect("callback task completes");
    }

    assert_eq!(removed.cancelled_requests, PENDING);
    assert_eq!(removed.observations.len(), paths.len());
    assert_eq!(
        harness.transport.history().cancelled_exchanges.len() - cancelled_before,
        PENDING
    );
    let failures = failures.lock().expect("lock");
    assert_eq!(failures.len(), PENDING);
    assert!(failures.iter().all(|err| matches!(err, SendError::Cancelled)));
    assert_eq!(harness.server.pending_request_count(&registration.id).await, 0);

    for (counter, observation) in observations.iter().enumerate() {
        let (format, payload) = string_resource(15, "late");
        let outcome = harness
            .server
            .on_notification(notification(
                peer,
                &observation.token,
                counter as u32 + 1,
                format,
                payload,
            ))
            .await;
        assert_eq!(outcome, NotificationOutcome::UnknownToken);
    }
    assert!(harness.observations.notifications().is_empty());
}

#[tokio::test]
async fn expired_registrations_are_removed_with_their_state() {
    let harness = make_harness(ServerConfig::default());
    let short = register_device(&harness, device_addr(1), "short-lived", 60, "U").await;
    let long = register_device(&harness, device_addr(2), "long-lived", 86400, "U").await;

    let removed = harness
        .server
        .lifecycle()
        .expire(Utc::now() + ChronoDuration::seconds(120))
        .await
        .expect("store is available");

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].registration.id, short.id);
    assert!(harness
        .server
        .get_registration(&long.id)
        .await
        .expect("store is available")
        .is_some());
    assert!(harness.registrations.events().contains(&RegistrationEvent::Unregistered {
        registration_id: short.id.clone(),
        observations: 0,
        cause: UnregistrationCause::Expired,
    }));
}

#[tokio::test]
async fn requests_to_a_removed_registration_are_refused() {
    let harness = make_harness(ServerConfig::default());
    let registration = register_device(&harness, device_addr(1), "dev-1", 3600, "U").await;
    harness
        .server
        .lifecycle()
        .deregister(&registration.id)
        .await
        .expect("store is available");

    let result = harness
        .server
        .send(&registration, DownlinkRequest::read(ObjectPath::resource(3, 0, 0)), None)
        .await;

    assert!(matches!(result, Err(SendError::UnknownRegistration(_))));
    assert_eq!(harness.transport.sent_count(), 0);
}
