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

use integration_test_utils::{
    init_logging, register_request, DeviceReply, JsonTestCodec, MockDeviceTransport,
    RecordingObservationListener, RecordingPresenceListener, RecordingRegistrationListener,
};
use lwm2m_server_core::codec::{ContentFormat, NodeCodec};
use lwm2m_server_core::model::Registration;
use lwm2m_server_core::wire::ResponseCode;
use lwm2m_server_core::{Lwm2mServer, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;

pub(crate) const DEVICE_LINKS: &str = "</1/0>,</3/0>,</3303/0>";

#[allow(dead_code)]
pub(crate) struct Harness {
    pub(crate) server: Lwm2mServer,
    pub(crate) transport: Arc<MockDeviceTransport>,
    pub(crate) registrations: Arc<RecordingRegistrationListener>,
    pub(crate) observations: Arc<RecordingObservationListener>,
    pub(crate) presence: Arc<RecordingPresenceListener>,
}

pub(crate) fn make_harness(config: ServerConfig) -> Harness {
    make_harness_with_codec(config, Arc::new(JsonTestCodec))
}

pub(crate) fn make_harness_with_codec(config: ServerConfig, codec: Arc<dyn NodeCodec>) -> Harness {
    init_logging();
    let transport = Arc::new(MockDeviceTransport::new(DeviceReply::Silent));
    let server = Lwm2mServer::new(config, transport.clone(), codec)
        .expect("server creation should succeed");

    let registrations = Arc::new(RecordingRegistrationListener::new());
    let observations = Arc::new(RecordingObservationListener::new());
    let presence = Arc::new(RecordingPresenceListener::new());
    server.add_registration_listener(registrations.clone());
    server.add_observation_listener(observations.clone());
    server.add_presence_listener(presence.clone());

    Harness {
        server,
        transport,
        registrations,
        observations,
        presence,
    }
}

/// Registers a device through `/rd` and returns the stored registration.
pub(crate) async fn register_device(
    harness: &Harness,
    peer: SocketAddr,
    endpoint: &str,
    lifetime_secs: u64,
    binding: &str,
) -> Arc<Registration> {
    let response = harness
        .server
        .handle_registration_request(register_request(
            peer,
            endpoint,
            lifetime_secs,
            binding,
            DEVICE_LINKS,
        ))
        .await;
    assert_eq!(response.code, ResponseCode::CREATED);
    let registration_id = response
        .location_path
        .last()
        .expect("location carries the registration id");

    harness
        .server
        .get_registration(registration_id)
        .await
        .expect("store is available")
        .expect("registration is stored")
}

/// JSON body of a single string resource.
#[allow(dead_code)]
pub(crate) fn string_resource(id: u16, value: &str) -> (ContentFormat, Vec<u8>) {
    use lwm2m_server_core::codec::{Lwm2mNode, Value};
    (
        ContentFormat::JSON,
        JsonTestCodec::encode_node(&Lwm2mNode::single(id, Value::String(value.to_string()))),
    )
}
