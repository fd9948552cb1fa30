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

use chrono::{TimeZone, Utc};
use integration_test_utils::{
    device_addr, notification, DeviceReply, JsonTestCodec, ObservationEvent, ReplyTemplate,
};
use lwm2m_server_core::codec::{
    CodecError, ContentFormat, Lwm2mNode, NodeCodec, TimestampedNode, Value,
};
use lwm2m_server_core::control_plane::RegistrationLifecycle;
use lwm2m_server_core::data_plane::DownlinkRequest;
use lwm2m_server_core::model::{ObjectPath, Observation, Registration};
use lwm2m_server_core::observe::{NotificationError, NotificationOutcome, ObservedValue};
use lwm2m_server_core::wire::{InboundNotification, ResponseCode};
use lwm2m_server_core::{SendError, ServerConfig};
use std::sync::{Arc, Mutex};
use support::{make_harness, make_harness_with_codec, register_device, string_resource, Harness};

const TIMEZONE: ObjectPath = ObjectPath::resource(3, 0, 15);

async fn observe(harness: &Harness, registration: &Registration, path: ObjectPath) -> Observation {
    observe_at(harness, registration, path, 0).await
}

async fn observe_at(
    harness: &Harness,
    registration: &Registration,
    path: ObjectPath,
    counter: u32,
) -> Observation {
    let (format, payload) = string_resource(15, "UTC");
    harness.transport.push_reply(DeviceReply::Respond(
        ReplyTemplate::content(format, payload).with_observe(counter),
    ));
    let response = harness
        .server
        .send(registration, DownlinkRequest::observe(path), None)
        .await
        .expect("observe succeeds")
        .expect("device answered");
    assert_eq!(response.code, ResponseCode::CONTENT);
    response
        .observation()
        .cloned()
        .expect("observe answer establishes an observation")
}

fn timezone(value: &str) -> Lwm2mNode {
    Lwm2mNode::single(15, Value::String(value.to_string()))
}

#[tokio::test]
async fn notifications_are_delivered_as_current_value_then_history() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;

    let observation = observe(&harness, &registration, TIMEZONE).await;
    assert_eq!(observation.path, TIMEZONE);
    assert_eq!(observation.registration_id, registration.id);
    assert_eq!(
        harness.server.get_observations(&registration.id).await,
        vec![observation.clone()]
    );
    assert_eq!(
        harness.transport.last_sent().expect("observe was sent").observe,
        Some(0)
    );

    let single = JsonTestCodec::encode_node(&timezone("Europe/Paris"));
    let outcome = harness
        .server
        .on_notification(notification(peer, &observation.token, 1, ContentFormat::JSON, single))
        .await;
    assert_eq!(outcome, NotificationOutcome::Delivered);

    let early = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let late = Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap();
    let batch = JsonTestCodec::encode_samples(&[
        TimestampedNode::at(early, timezone("Europe/Paris")),
        TimestampedNode::at(late, timezone("Europe/Berlin")),
    ]);
    let outcome = harness
        .server
        .on_notification(notification(peer, &observation.token, 2, ContentFormat::SENML_JSON, batch))
        .await;
    assert_eq!(outcome, NotificationOutcome::Delivered);

    let notifications = harness.observations.notifications();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0], ObservedValue::Current(timezone("Europe/Paris")));
    match &notifications[1] {
        ObservedValue::History(samples) => {
            assert_eq!(samples.len(), 2);
            assert_eq!(samples[0].timestamp, Some(late));
            assert_eq!(samples[0].node, timezone("Europe/Berlin"));
            assert_eq!(samples[1].timestamp, Some(early));
        }
        other => panic!("expected a history, got {other:?}"),
    }
    assert_eq!(notifications[1].latest(), Some(&timezone("Europe/Berlin")));
}

#[tokio::test]
async fn reordered_notifications_are_dropped() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;
    let observation = observe(&harness, &registration, TIMEZONE).await;
    let payload = JsonTestCodec::encode_node(&timezone("UTC"));

    let newer = notification(peer, &observation.token, 100, ContentFormat::JSON, payload.clone());
    let older = notification(peer, &observation.token, 99, ContentFormat::JSON, payload.clone());
    let repeated = notification(peer, &observation.token, 100, ContentFormat::JSON, payload);

    assert_eq!(harness.server.on_notification(newer).await, NotificationOutcome::Delivered);
    assert_eq!(harness.server.on_notification(older).await, NotificationOutcome::Stale);
    assert_eq!(harness.server.on_notification(repeated).await, NotificationOutcome::Stale);
    assert_eq!(harness.observations.notifications().len(), 1);
}

#[tokio::test]
async fn a_new_observation_of_the_same_path_replaces_the_previous_one() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;

    let first = observe(&harness, &registration, TIMEZONE).await;
    let second = observe(&harness, &registration, TIMEZONE).await;
    assert_ne!(first.token, second.token);

    assert_eq!(
        harness.server.get_observations(&registration.id).await,
        vec![second.clone()]
    );
    assert_eq!(harness.observations.cancellations(), vec![first.clone()]);
    assert!(harness
        .transport
        .history()
        .cancelled_observations
        .contains(&(peer, first.token.clone())));

    let payload = JsonTestCodec::encode_node(&timezone("UTC"));
    let stale_token = notification(peer, &first.token, 5, ContentFormat::JSON, payload.clone());
    assert_eq!(
        harness.server.on_notification(stale_token).await,
        NotificationOutcome::UnknownToken
    );
    let current = notification(peer, &second.token, 5, ContentFormat::JSON, payload);
    assert_eq!(
        harness.server.on_notification(current).await,
        NotificationOutcome::Delivered
    );
}

#[tokio::test]
async fn cancelling_an_observation_twice_is_a_no_op() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;
    let observation = observe(&harness, &registration, TIMEZONE).await;

    assert!(harness.server.cancel_observation(&observation).await);
    let after_first = (
        harness.observations.events(),
        harness.transport.history().cancelled_observations,
    );

    assert!(!harness.server.cancel_observation(&observation).await);
    let after_second = (
        harness.observations.events(),
        harness.transport.history().cancelled_observations,
    );

    assert_eq!(after_first, after_second);
    assert_eq!(harness.observations.cancellations(), vec![observation.clone()]);
    assert!(harness.server.get_observations(&registration.id).await.is_empty());
}

#[tokio::test]
async fn error_and_undecodable_notifications_reach_listeners_as_errors() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;
    let observation = observe(&harness, &registration, TIMEZONE).await;

    let error = InboundNotification {
        peer,
        token: observation.token.clone(),
        code: ResponseCode::NOT_FOUND,
        content_format: None,
        observe: Some(1),
        payload: Vec::new(),
    };
    assert_eq!(harness.server.on_notification(error).await, NotificationOutcome::Failed);

    let garbage = notification(peer, &observation.token, 2, ContentFormat::JSON, b"{".to_vec());
    assert_eq!(harness.server.on_notification(garbage).await, NotificationOutcome::Failed);

    let errors: Vec<NotificationError> = harness
        .observations
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ObservationEvent::Failed(_, err) => Some(err),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], NotificationError::ErrorResponse(ResponseCode::NOT_FOUND));
    assert!(matches!(errors[1], NotificationError::Decode(_)));
}

#[tokio::test]
async fn notifications_without_content_format_use_the_observed_format() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;
    let observation = observe(&harness, &registration, TIMEZONE).await;
    assert_eq!(observation.content_format_hint(), Some(ContentFormat::JSON));

    let mut bare = notification(
        peer,
        &observation.token,
        1,
        ContentFormat::JSON,
        JsonTestCodec::encode_node(&timezone("Asia/Tokyo")),
    );
    bare.content_format = None;

    assert_eq!(harness.server.on_notification(bare).await, NotificationOutcome::Delivered);
    assert_eq!(
        harness.observations.notifications(),
        vec![ObservedValue::Current(timezone("Asia/Tokyo"))]
    );
}

#[tokio::test]
async fn notifications_older_than_the_observe_answer_are_dropped() {
    let harness = make_harness(ServerConfig::default());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;
    let observation = observe_at(&harness, &registration, TIMEZONE, 100).await;
    let payload = JsonTestCodec::encode_node(&timezone("UTC"));

    let older = notification(peer, &observation.token, 99, ContentFormat::JSON, payload.clone());
    let same = notification(peer, &observation.token, 100, ContentFormat::JSON, payload.clone());
    let newer = notification(peer, &observation.token, 101, ContentFormat::JSON, payload);

    assert_eq!(harness.server.on_notification(older).await, NotificationOutcome::Stale);
    assert_eq!(harness.server.on_notification(same).await, NotificationOutcome::Stale);
    assert_eq!(harness.server.on_notification(newer).await, NotificationOutcome::Delivered);
    assert_eq!(harness.observations.notifications().len(), 1);
}

/// JSON codec that deregisters a device while the observe answer is being decoded.
#[derive(Default)]
struct DeregisteringCodec {
    armed: Mutex<Option<(Arc<RegistrationLifecycle>, String)>>,
}

impl DeregisteringCodec {
    fn arm(&self, lifecycle: Arc<RegistrationLifecycle>, registration_id: &str) {
        *self.armed.lock().expect("lock") = Some((lifecycle, registration_id.to_string()));
    }
}

impl NodeCodec for DeregisteringCodec {
    fn supports(&self, format: ContentFormat) -> bool {
        JsonTestCodec.supports(format)
    }

    fn encode(
        &self,
        node: &Lwm2mNode,
        path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Vec<u8>, CodecError> {
        JsonTestCodec.encode(node, path, format)
    }

    fn decode(
        &self,
        payload: &[u8],
        path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Lwm2mNode, CodecError> {
        let armed = self.armed.lock().expect("lock").take();
        if let Some((lifecycle, registration_id)) = armed {
            let removed = futures::executor::block_on(lifecycle.deregister(&registration_id))
                .expect("store available");
            assert!(removed.is_some());
        }
        JsonTestCodec.decode(payload, path, format)
    }
}

#[tokio::test]
async fn deregistration_during_observe_answer_leaves_no_observation() {
    let codec = Arc::new(DeregisteringCodec::default());
    let harness = make_harness_with_codec(ServerConfig::default(), codec.clone());
    let peer = device_addr(1);
    let registration = register_device(&harness, peer, "dev-1", 3600, "U").await;
    codec.arm(harness.server.lifecycle().clone(), &registration.id);

    let (format, payload) = string_resource(15, "UTC");
    harness.transport.push_reply(DeviceReply::Respond(
        ReplyTemplate::content(format, payload).with_observe(3),
    ));
    let result = harness
        .server
        .send(&registration, DownlinkRequest::observe(TIMEZONE), None)
        .await;

    assert!(matches!(
        result,
        Err(SendError::UnknownRegistration(ref id)) if *id == registration.id
    ));
    assert!(harness
        .server
        .get_registration(&registration.id)
        .await
        .expect("store available")
        .is_none());
    assert!(harness.server.get_observations(&registration.id).await.is_empty());

    let token = harness.transport.last_sent().expect("observe was sent").token;
    assert!(harness
        .transport
        .history()
        .cancelled_observations
        .contains(&(peer, token.clone())));
    let late = notification(
        peer,
        &token,
        4,
        ContentFormat::JSON,
        JsonTestCodec::encode_node(&timezone("UTC")),
    );
    assert_eq!(
        harness.server.on_notification(late).await,
        NotificationOutcome::UnknownToken
    );
    assert!(harness.observations.notifications().is_empty());
}
