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

mod fixtures;
pub use fixtures::{
    deregister_request, device_addr, init_logging, notification, register_request,
    update_request,
};
mod json_test_codec;
pub use json_test_codec::JsonTestCodec;
mod mock_device_transport;
pub use mock_device_transport::{DeviceReply, MockDeviceTransport, ReplyTemplate, TransportHistory};
mod recording_listeners;
pub use recording_listeners::{
    ObservationEvent, PresenceEvent, RecordingObservationListener, RecordingPresenceListener,
    RecordingRegistrationListener, RegistrationEvent,
};
