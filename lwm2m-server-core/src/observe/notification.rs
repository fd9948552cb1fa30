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

//! Inbound notification handling: correlation, freshness, decoding and delivery.

use crate::codec::{CodecError, Lwm2mNode, NodeCodec, TimestampedNode};
use crate::listeners::{ListenerRegistry, ObservationListener};
use crate::observability::{events, fields};
use crate::observe::observation_store::ObservationStore;
use crate::presence::PresenceTracker;
use crate::wire::{InboundNotification, ResponseCode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{debug, warn};

const COMPONENT: &str = "notification_handler";

const OBSERVE_COUNTER_MASK: u32 = 0x00FF_FFFF;
const OBSERVE_FRESHNESS_WINDOW: u32 = 1 << 23;

/// `true` when observe counter `new` is strictly newer than `old`, modulo 2^24.
pub fn is_fresh(old: u32, new: u32) -> bool {
    let distance = new.wrapping_sub(old) & OBSERVE_COUNTER_MASK;
    distance != 0 && distance < OBSERVE_FRESHNESS_WINDOW
}

/// Shape of a decoded notification payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ObservedValue {
    /// One value without a timestamp.
    Current(Lwm2mNode),
    /// One value sampled at a known time.
    Timestamped(TimestampedNode),
    /// Several samples, most recent first.
    History(Vec<TimestampedNode>),
}

impl ObservedValue {
    fn from_samples(mut samples: Vec<TimestampedNode>) -> Option<Self> {
        match samples.len() {
            0 => None,
            1 => {
                let sample = samples.pop()?;
                Some(match sample.timestamp {
                    Some(_) => ObservedValue::Timestamped(sample),
                    None => ObservedValue::Current(sample.node),
                })
            }
            _ => {
                samples.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                Some(ObservedValue::History(samples))
            }
        }
    }

    /// Most recent node carried by the notification.
    pub fn latest(&self) -> Option<&Lwm2mNode> {
        match self {
            ObservedValue::Current(node) => Some(node),
            ObservedValue::Timestamped(sample) => Some(&sample.node),
            ObservedValue::History(samples) => samples.first().map(|sample| &sample.node),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NotificationError {
    /// The device reported an error code instead of a value.
    ErrorResponse(ResponseCode),
    MissingContentFormat,
    EmptyPayload,
    Decode(CodecError),
}

impl Display for NotificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationError::ErrorResponse(code) => {
                write!(f, "device reported error {code}")
            }
            NotificationError::MissingContentFormat => {
                write!(f, "notification carries no content format")
            }
            NotificationError::EmptyPayload => write!(f, "notification carries no value"),
            NotificationError::Decode(err) => write!(f, "unable to decode notification: {err}"),
        }
    }
}

impl Error for NotificationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NotificationError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotificationOutcome {
    Delivered,
    /// No active observation uses the token; the notification was dropped.
    UnknownToken,
    /// The observe counter is not newer than the last accepted one.
    Stale,
    /// Listeners received an error instead of a value.
    Failed,
}

/// Entry point for notifications surfaced by the transport.
pub struct NotificationHandler {
    observations: Arc<ObservationStore>,
    codec: Arc<dyn NodeCodec>,
    presence: PresenceTracker,
    listeners: Arc<ListenerRegistry<dyn ObservationListener>>,
}

impl NotificationHandler {
    pub fn new(
        observations: Arc<ObservationStore>,
        codec: Arc<dyn NodeCodec>,
        presence: PresenceTracker,
        listeners: Arc<ListenerRegistry<dyn ObservationListener>>,
    ) -> Self {
        Self {
            observations,
            codec,
            presence,
            listeners,
        }
    }

    pub async fn on_notification(&self, notification: InboundNotification) -> NotificationOutcome {
        // Held until listeners return: a concurrent replacement waits for this delivery.
        let index = self.observations.read_index().await;
        let Some(entry) = index.get(&notification.token) else {
            debug!(
                event = events::NOTIFICATION_DROPPED_UNKNOWN_TOKEN,
                component = COMPONENT,
                token = %notification.token,
                peer = %notification.peer,
                "dropping notification for unknown or cancelled observation"
            );
            return NotificationOutcome::UnknownToken;
        };
        let observation = &entry.observation;

        if !entry.accept_counter(notification.observe) {
            debug!(
                event = events::NOTIFICATION_DROPPED_STALE,
                component = COMPONENT,
                registration_id = observation.registration_id.as_str(),
                token = %notification.token,
                observe = notification.observe,
                "dropping reordered notification"
            );
            return NotificationOutcome::Stale;
        }

        self.presence.on_contact(&observation.registration_id);

        debug!(
            event = events::NOTIFICATION_RECEIVED,
            component = COMPONENT,
            registration_id = observation.registration_id.as_str(),
            path = %observation.path,
            code = %notification.code,
            content_format = fields::format_content_format(notification.content_format).as_str(),
            "notification received"
        );

        match self.decode(&notification, observation) {
            Ok(value) => {
                self.listeners
                    .notify(|listener| listener.on_notification(observation, &value));
                NotificationOutcome::Delivered
            }
            Err(err) => {
                warn!(
                    event = events::NOTIFICATION_DECODE_FAILED,
                    component = COMPONENT,
                    registration_id = observation.registration_id.as_str(),
                    path = %observation.path,
                    err = %err,
                    "unable to process notification"
                );
                self.listeners
                    .notify(|listener| listener.on_error(observation, &err));
                NotificationOutcome::Failed
            }
        }
    }

    fn decode(
        &self,
        notification: &InboundNotification,
        observation: &crate::model::Observation,
    ) -> Result<ObservedValue, NotificationError> {
        if !notification.code.is_success() {
            return Err(NotificationError::ErrorResponse(notification.code));
        }
        let format = notification
            .content_format
            .or_else(|| observation.content_format_hint())
            .ok_or(NotificationError::MissingContentFormat)?;
        if notification.payload.is_empty() {
            return Err(NotificationError::EmptyPayload);
        }

        let samples = self
            .codec
            .decode_timestamped(&notification.payload, &observation.path, format)
            .map_err(NotificationError::Decode)?;
        ObservedValue::from_samples(samples).ok_or(NotificationError::EmptyPayload)
    }
}
