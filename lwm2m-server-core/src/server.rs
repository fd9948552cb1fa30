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

use crate::codec::NodeCodec;
use crate::config::{ConfigError, ServerConfig};
use crate::control_plane::{
    InMemoryRegistrationStore, RegistrationEndpoint, RegistrationLifecycle, RegistrationStore,
};
use crate::data_plane::{DownlinkRequest, Lwm2mResponse, ProtocolTranslator, RequestDispatcher};
use crate::error::{SendError, StoreError};
use crate::listeners::{ListenerRegistry, ObservationListener, PresenceListener, RegistrationListener};
use crate::model::{ObjectPath, Observation, Registration};
use crate::observability::events;
use crate::observe::{NotificationHandler, NotificationOutcome, ObservationStore};
use crate::presence::{PresenceState, PresenceTracker};
use crate::runtime::expiration_runtime::{spawn_expiration_sweep, ExpirationTask};
use crate::transport::CoapTransport;
use crate::wire::{InboundNotification, InboundRequest, InboundResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

const COMPONENT: &str = "lwm2m_server";

/// Server-side LWM2M core wired to one transport and one codec.
///
/// The facade owns the registration store, observation store, presence tracker and
/// request dispatcher, and exposes the operations applications and transports call.
pub struct Lwm2mServer {
    config: ServerConfig,
    registrations: Arc<dyn RegistrationStore>,
    lifecycle: Arc<RegistrationLifecycle>,
    dispatcher: RequestDispatcher,
    observations: Arc<ObservationStore>,
    presence: PresenceTracker,
    registration_endpoint: RegistrationEndpoint,
    notifications: NotificationHandler,
    registration_listeners: Arc<ListenerRegistry<dyn RegistrationListener>>,
    observation_listeners: Arc<ListenerRegistry<dyn ObservationListener>>,
    presence_listeners: Arc<ListenerRegistry<dyn PresenceListener>>,
    expiration: Mutex<Option<ExpirationTask>>,
}

impl Lwm2mServer {
    /// Builds a server backed by an [`InMemoryRegistrationStore`].
    pub fn new(
        config: ServerConfig,
        transport: Arc<dyn CoapTransport>,
        codec: Arc<dyn NodeCodec>,
    ) -> Result<Self, ConfigError> {
        Self::with_store(
            config,
            transport,
            codec,
            Arc::new(InMemoryRegistrationStore::new()),
        )
    }

    pub fn with_store(
        config: ServerConfig,
        transport: Arc<dyn CoapTransport>,
        codec: Arc<dyn NodeCodec>,
        registrations: Arc<dyn RegistrationStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registration_listeners = Arc::new(ListenerRegistry::<dyn RegistrationListener>::new());
        let observation_listeners = Arc::new(ListenerRegistry::<dyn ObservationListener>::new());
        let presence_listeners = Arc::new(ListenerRegistry::<dyn PresenceListener>::new());

        let presence = PresenceTracker::new(config.awake_window(), presence_listeners.clone());
        let observations = Arc::new(ObservationStore::new(
            transport.clone(),
            registrations.clone(),
            observation_listeners.clone(),
        ));
        let translator = ProtocolTranslator::new(codec.clone(), observations.clone());
        let dispatcher = RequestDispatcher::new(
            transport,
            translator,
            registrations.clone(),
            presence.clone(),
            config.request_timeout(),
        );
        let lifecycle = Arc::new(RegistrationLifecycle::new(
            registrations.clone(),
            dispatcher.clone(),
            observations.clone(),
            presence.clone(),
            registration_listeners.clone(),
            config.expiration_grace_secs,
        ));
        let registration_endpoint = RegistrationEndpoint::new(
            lifecycle.clone(),
            config.registration_root(),
            config.default_lifetime_secs,
        );
        let notifications = NotificationHandler::new(
            observations.clone(),
            codec,
            presence.clone(),
            observation_listeners.clone(),
        );

        Ok(Self {
            config,
            registrations,
            lifecycle,
            dispatcher,
            observations,
            presence,
            registration_endpoint,
            notifications,
            registration_listeners,
            observation_listeners,
            presence_listeners,
            expiration: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts the periodic expiration sweep. Calling it again while running is a no-op.
    pub async fn start(&self) {
        let mut expiration = self.expiration.lock().await;
        if expiration.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        *expiration = Some(spawn_expiration_sweep(
            self.lifecycle.clone(),
            self.config.expiration_sweep_interval(),
        ));
        info!(
            event = events::SERVER_STARTED,
            component = COMPONENT,
            sweep_interval_secs = self.config.expiration_sweep_interval_secs,
            request_timeout_ms = self.config.request_timeout_ms,
            "server started"
        );
    }

    /// Stops the expiration sweep. Registrations and observations are left untouched.
    pub async fn stop(&self) {
        let task = self.expiration.lock().await.take();
        if let Some(task) = task {
            task.stop().await;
            info!(
                event = events::SERVER_STOPPED,
                component = COMPONENT,
                "server stopped"
            );
        }
    }

    /// Entry point for requests on the registration interface.
    pub async fn handle_registration_request(&self, request: InboundRequest) -> InboundResponse {
        self.registration_endpoint.handle(request).await
    }

    /// Entry point for observe notifications surfaced by the transport.
    pub async fn on_notification(&self, notification: InboundNotification) -> NotificationOutcome {
        self.notifications.on_notification(notification).await
    }

    /// Sends a request and waits for its outcome; `Ok(None)` means it timed out.
    pub async fn send(
        &self,
        registration: &Registration,
        request: DownlinkRequest,
        timeout: Option<Duration>,
    ) -> Result<Option<Lwm2mResponse>, SendError> {
        self.dispatcher.send(registration, request, timeout).await
    }

    /// Like [`Lwm2mServer::send`], addressing the device by endpoint name.
    pub async fn send_to_endpoint(
        &self,
        endpoint: &str,
        request: DownlinkRequest,
        timeout: Option<Duration>,
    ) -> Result<Option<Lwm2mResponse>, SendError> {
        let registration = self
            .registrations
            .get_by_endpoint(endpoint)
            .await?
            .ok_or_else(|| SendError::UnknownRegistration(endpoint.to_string()))?;
        self.dispatcher.send(&registration, request, timeout).await
    }

    /// Sends a request in the background; exactly one callback runs.
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
        self.dispatcher
            .send_with_callbacks(registration, request, timeout, on_response, on_error)
    }

    pub async fn get_registration(
        &self,
        registration_id: &str,
    ) -> Result<Option<Arc<Registration>>, StoreError> {
        self.registrations.get_by_id(registration_id).await
    }

    pub async fn get_registration_by_endpoint(
        &self,
        endpoint: &str,
    ) -> Result<Option<Arc<Registration>>, StoreError> {
        self.registrations.get_by_endpoint(endpoint).await
    }

    pub async fn all_registrations(&self) -> Result<Vec<Arc<Registration>>, StoreError> {
        self.registrations.all().await
    }

    /// The registration lifecycle, for embedders driving registration without `/rd`.
    pub fn lifecycle(&self) -> &Arc<RegistrationLifecycle> {
        &self.lifecycle
    }

    pub async fn get_observations(&self, registration_id: &str) -> Vec<Observation> {
        self.observations.get_observations(registration_id).await
    }

    /// Cancels one observation. Returns `false` when it was already gone.
    pub async fn cancel_observation(&self, observation: &Observation) -> bool {
        self.observations.cancel_observation(observation).await
    }

    pub async fn cancel_observation_at(
        &self,
        registration_id: &str,
        path: &ObjectPath,
    ) -> Option<Observation> {
        self.observations
            .cancel_observation_at(registration_id, path)
            .await
    }

    /// Cancels every observation of a registration.
    pub async fn cancel_observations(&self, registration_id: &str) -> Vec<Observation> {
        self.observations.cancel_all(registration_id).await
    }

    pub fn presence_state(&self, registration_id: &str) -> Option<PresenceState> {
        self.presence.state(registration_id)
    }

    pub fn is_sleeping(&self, registration_id: &str) -> bool {
        self.presence.is_sleeping(registration_id)
    }

    pub async fn pending_request_count(&self, registration_id: &str) -> usize {
        self.dispatcher.pending_count(registration_id).await
    }

    pub fn add_registration_listener(&self, listener: Arc<dyn RegistrationListener>) {
        self.registration_listeners.add(listener);
    }

    pub fn remove_registration_listener(&self, listener: &Arc<dyn RegistrationListener>) -> bool {
        self.registration_listeners.remove(listener)
    }

    pub fn add_observation_listener(&self, listener: Arc<dyn ObservationListener>) {
        self.observation_listeners.add(listener);
    }

    pub fn remove_observation_listener(&self, listener: &Arc<dyn ObservationListener>) -> bool {
        self.observation_listeners.remove(listener)
    }

    pub fn add_presence_listener(&self, listener: Arc<dyn PresenceListener>) {
        self.presence_listeners.add(listener);
    }

    pub fn remove_presence_listener(&self, listener: &Arc<dyn PresenceListener>) -> bool {
        self.presence_listeners.remove(listener)
    }
}
