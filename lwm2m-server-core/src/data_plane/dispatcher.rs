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

//! Downlink request dispatch with pending-request tracking.

use crate::control_plane::registration_store::RegistrationStore;
use crate::data_plane::downlink::{DownlinkRequest, Lwm2mResponse};
use crate::data_plane::pending_requests::{PendingExchange, PendingOutcome, PendingRequests};
use crate::data_plane::translator::{ProtocolTranslator, TranslationError};
use crate::error::SendError;
use crate::model::Registration;
use crate::observability::events;
use crate::observability::fields::{self, DeviceContext};
use crate::presence::PresenceTracker;
use crate::transport::{CoapTransport, ExchangeFailure, ExchangeListener};
use crate::wire::Token;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "request_dispatcher";

/// Sends downlink requests and resolves each one to exactly one terminal outcome.
#[derive(Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn CoapTransport>,
    translator: ProtocolTranslator,
    registrations: Arc<dyn RegistrationStore>,
    presence: PresenceTracker,
    pending: Arc<PendingRequests>,
    default_timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(
        transport: Arc<dyn CoapTransport>,
        translator: ProtocolTranslator,
        registrations: Arc<dyn RegistrationStore>,
        presence: PresenceTracker,
        default_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            translator,
            registrations,
            presence,
            pending: Arc::new(PendingRequests::new()),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Sends `request` and waits for its outcome.
    ///
    /// Returns `Ok(None)` when no answer arrived within `timeout` (the dispatcher default
    /// when `None`). A sleeping queue-mode device yields [`SendError::Unreachable`]
    /// without any transport attempt.
    pub async fn send(
        &self,
        registration: &Registration,
        request: DownlinkRequest,
        timeout: Option<Duration>,
    ) -> Result<Option<Lwm2mResponse>, SendError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let device = DeviceContext::from_registration(registration);
        let operation = request.kind();

        if self.presence.is_sleeping(&registration.id) {
            info!(
                event = events::REQUEST_REFUSED_SLEEPING,
                component = COMPONENT,
                registration_id = device.registration_id.as_str(),
                endpoint = device.endpoint.as_str(),
                operation = operation.name(),
                "device is sleeping, request not sent"
            );
            return Err(SendError::Unreachable {
                registration_id: registration.id.clone(),
            });
        }

        // Tracking starts before the liveness check: a deregistration committed after the
        // check cancels this entry, one committed before it is seen by the lookup.
        let (key, receiver) = self.pending.register(&registration.id).await;
        let current = match self.registrations.get_by_id(&registration.id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                self.pending.remove(&key).await;
                debug!(
                    event = events::REQUEST_REFUSED_UNKNOWN_REGISTRATION,
                    component = COMPONENT,
                    registration_id = device.registration_id.as_str(),
                    operation = operation.name(),
                    "registration is gone, request not sent"
                );
                return Err(SendError::UnknownRegistration(registration.id.clone()));
            }
            Err(err) => {
                self.pending.remove(&key).await;
                return Err(SendError::Store(err));
            }
        };

        let wire = match self
            .translator
            .to_wire(&request, &current, Token::generate())
        {
            Ok(wire) => wire,
            Err(err) => {
                self.pending.remove(&key).await;
                return Err(SendError::Translation(err));
            }
        };

        debug!(
            event = events::REQUEST_SEND_ATTEMPT,
            component = COMPONENT,
            registration_id = device.registration_id.as_str(),
            endpoint = device.endpoint.as_str(),
            peer = %wire.peer,
            operation = operation.name(),
            target = fields::format_request_target(&wire).as_str(),
            token = %wire.token,
            sequence = key.sequence,
            "sending request"
        );

        let listener: Arc<dyn ExchangeListener> =
            Arc::new(PendingExchange::new(key.clone(), self.pending.clone()));
        match self.transport.send(wire, listener).await {
            Ok(handle) => {
                if !self.pending.attach_handle(&key, handle).await {
                    // Already resolved: stop any retransmission still scheduled.
                    self.transport.cancel(handle).await;
                }
            }
            Err(err) => {
                self.pending.remove(&key).await;
                warn!(
                    event = events::REQUEST_SEND_FAILED,
                    component = COMPONENT,
                    registration_id = device.registration_id.as_str(),
                    operation = operation.name(),
                    err = %err,
                    "transport refused request"
                );
                return Err(SendError::Transport(err));
            }
        }

        let outcome = match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => PendingOutcome::Cancelled,
            Err(_elapsed) => {
                if let Some(handle) = self.pending.remove(&key).await {
                    self.transport.cancel(handle).await;
                }
                info!(
                    event = events::REQUEST_TIMED_OUT,
                    component = COMPONENT,
                    registration_id = device.registration_id.as_str(),
                    operation = operation.name(),
                    reason = fields::REASON_CALLER_TIMEOUT,
                    timeout_ms = timeout.as_millis() as u64,
                    "no response before deadline"
                );
                self.on_no_response(&current).await;
                return Ok(None);
            }
        };

        match outcome {
            PendingOutcome::Response(response) => {
                self.presence.on_contact(&current.id);
                match self.translator.to_response(&request, &current, response).await {
                    Ok(response) => {
                        debug!(
                            event = events::REQUEST_RESPONSE_OK,
                            component = COMPONENT,
                            registration_id = device.registration_id.as_str(),
                            operation = operation.name(),
                            code = %response.code,
                            "response received"
                        );
                        Ok(Some(response))
                    }
                    Err(TranslationError::RegistrationGone { registration_id }) => {
                        debug!(
                            event = events::REQUEST_REFUSED_UNKNOWN_REGISTRATION,
                            component = COMPONENT,
                            registration_id = registration_id.as_str(),
                            operation = operation.name(),
                            "registration removed while the request was in flight"
                        );
                        Err(SendError::UnknownRegistration(registration_id))
                    }
                    Err(TranslationError::Store(err)) => Err(SendError::Store(err)),
                    Err(err) => {
                        warn!(
                            event = events::REQUEST_RESPONSE_UNEXPECTED,
                            component = COMPONENT,
                            registration_id = device.registration_id.as_str(),
                            endpoint = device.endpoint.as_str(),
                            operation = operation.name(),
                            err = %err,
                            "invalid response"
                        );
                        Err(SendError::Translation(err))
                    }
                }
            }
            PendingOutcome::Failure(ExchangeFailure::Timeout) => {
                info!(
                    event = events::REQUEST_TIMED_OUT,
                    component = COMPONENT,
                    registration_id = device.registration_id.as_str(),
                    operation = operation.name(),
                    "transport gave up waiting for a response"
                );
                self.on_no_response(&current).await;
                Ok(None)
            }
            PendingOutcome::Failure(ExchangeFailure::Cancelled) | PendingOutcome::Cancelled => {
                debug!(
                    event = events::REQUEST_CANCELLED,
                    component = COMPONENT,
                    registration_id = device.registration_id.as_str(),
                    operation = operation.name(),
                    "request cancelled"
                );
                Err(SendError::Cancelled)
            }
            PendingOutcome::Failure(failure) => Err(SendError::Exchange(failure)),
        }
    }

    /// Sends `request` in the background and reports its outcome through exactly one of
    /// the two callbacks. A timeout is reported as [`SendError::TimedOut`].
    pub fn send_with_callbacks<R, E>(
        &self,
        registration: Registration,
        request: DownlinkRequest,
        timeout: Option<Duration>,
        on_response: R,
        on_error: E,
    ) -> JoinHandle<()>
    where
        R: FnOnce(Lwm2mResponse) + Send + 'static,
        E: FnOnce(SendError) + Send + 'static,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.send(&registration, request, timeout).await {
                Ok(Some(response)) => on_response(response),
                Ok(None) => on_error(SendError::TimedOut),
                Err(err) => on_error(err),
            }
        })
    }

    /// Cancels every in-flight request of a registration at the transport and resolves
    /// waiting callers with [`SendError::Cancelled`]. Returns how many were cancelled.
    pub async fn cancel_pending(&self, registration_id: &str) -> usize {
        let cancelled = self.pending.cancel_all(registration_id).await;
        for handle in &cancelled.handles {
            self.transport.cancel(*handle).await;
        }
        if cancelled.count > 0 {
            info!(
                event = events::PENDING_REQUESTS_CANCELLED,
                component = COMPONENT,
                registration_id,
                count = cancelled.count,
                "pending requests cancelled"
            );
        }
        cancelled.count
    }

    pub async fn pending_count(&self, registration_id: &str) -> usize {
        self.pending.count(registration_id).await
    }

    /// Queue-mode devices that stop answering are considered asleep; their other
    /// requests cannot complete either.
    async fn on_no_response(&self, registration: &Registration) {
        if registration.uses_queue_mode() && self.presence.on_no_response(&registration.id) {
            let cancelled = self.cancel_pending(&registration.id).await;
            debug!(
                event = events::PRESENCE_SLEEPING,
                component = COMPONENT,
                registration_id = registration.id.as_str(),
                reason = fields::REASON_PRESENCE_SLEEPING,
                cancelled,
                "unanswered request put the device to sleep"
            );
        }
    }
}
