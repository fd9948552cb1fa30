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

use lwm2m_server_core::listeners::{
    ObservationListener, PresenceListener, RegistrationListener, UnregistrationCause,
};
use lwm2m_server_core::model::{Observation, Registration, RegistrationUpdate};
use lwm2m_server_core::observe::{NotificationError, ObservedValue};
use std::sync::Mutex;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub enum RegistrationEvent {
    Registered {
        registration_id: String,
        endpoint: String,
        replaced: Option<String>,
    },
    Updated {
        registration_id: String,
    },
    Unregistered {
        registration_id: String,
        observations: usize,
        cause: UnregistrationCause,
    },
}

#[derive(Default)]
pub struct RecordingRegistrationListener {
    events: Mutex<Vec<RegistrationEvent>>,
}

impl RecordingRegistrationListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RegistrationEvent> {
        self.events.lock().expect("events lock").clone()
    }

    fn record(&self, event: RegistrationEvent) {
        debug!(?event, "registration listener");
        self.events.lock().expect("events lock").push(event);
    }
}

impl RegistrationListener for RecordingRegistrationListener {
    fn registered(
        &self,
        registration: &Registration,
        previous: Option<&Registration>,
        _previous_observations: &[Observation],
    ) {
        self.record(RegistrationEvent::Registered {
            registration_id: registration.id.clone(),
            endpoint: registration.endpoint.clone(),
            replaced: previous.map(|previous| previous.id.clone()),
        });
    }

    fn updated(&self, _update: &RegistrationUpdate, updated: &Registration, _previous: &Registration) {
        self.record(RegistrationEvent::Updated {
            registration_id: updated.id.clone(),
        });
    }

    fn unregistered(
        &self,
        registration: &Registration,
        observations: &[Observation],
        cause: UnregistrationCause,
    ) {
        self.record(RegistrationEvent::Unregistered {
            registration_id: registration.id.clone(),
            observations: observations.len(),
            cause,
        });
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObservationEvent {
    Added(Observation),
    Cancelled(Observation),
    Notified(Observation, ObservedValue),
    Failed(Observation, NotificationError),
}

#[derive(Default)]
pub struct RecordingObservationListener {
    events: Mutex<Vec<ObservationEvent>>,
}

impl RecordingObservationListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservationEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn notifications(&self) -> Vec<ObservedValue> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObservationEvent::Notified(_, value) => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn cancellations(&self) -> Vec<Observation> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObservationEvent::Cancelled(observation) => Some(observation),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ObservationEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl ObservationListener for RecordingObservationListener {
    fn new_observation(&self, observation: &Observation) {
        self.record(ObservationEvent::Added(observation.clone()));
    }

    fn cancelled(&self, observation: &Observation) {
        self.record(ObservationEvent::Cancelled(observation.clone()));
    }

    fn on_notification(&self, observation: &Observation, value: &ObservedValue) {
        self.record(ObservationEvent::Notified(observation.clone(), value.clone()));
    }

    fn on_error(&self, observation: &Observation, error: &NotificationError) {
        self.record(ObservationEvent::Failed(observation.clone(), error.clone()));
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PresenceEvent {
    Awake(String),
    Sleeping(String),
}

#[derive(Default)]
pub struct RecordingPresenceListener {
    events: Mutex<Vec<PresenceEvent>>,
}

impl RecordingPresenceListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PresenceEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

impl PresenceListener for RecordingPresenceListener {
    fn on_awake(&self, registration_id: &str) {
        self.events
            .lock()
            .expect("events lock")
            .push(PresenceEvent::Awake(registration_id.to_string()));
    }

    fn on_sleeping(&self, registration_id: &str) {
        self.events
            .lock()
            .expect("events lock")
            .push(PresenceEvent::Sleeping(registration_id.to_string()));
    }
}
