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

//! Active observations, indexed by token and by registration.

use crate::control_plane::RegistrationStore;
use crate::error::StoreError;
use crate::listeners::{ListenerRegistry, ObservationListener};
use crate::model::{ObjectPath, Observation};
use crate::observability::events;
use crate::observe::notification::is_fresh;
use crate::transport::CoapTransport;
use crate::wire::Token;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, warn};

const COMPONENT: &str = "observation_store";

pub(crate) struct ObservationEntry {
    pub(crate) observation: Observation,
    pub(crate) peer: SocketAddr,
    last_counter: Mutex<Option<u32>>,
}

impl ObservationEntry {
    fn new(observation: Observation, peer: SocketAddr, last_counter: Option<u32>) -> Self {
        Self {
            observation,
            peer,
            last_counter: Mutex::new(last_counter),
        }
    }

    /// Records `counter` if it is newer than the last accepted one.
    ///
    /// Notifications without a counter are always accepted.
    pub(crate) fn accept_counter(&self, counter: Option<u32>) -> bool {
        let Some(counter) = counter else {
            return true;
        };
        let mut last = match self.last_counter.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match *last {
            Some(previous) if !is_fresh(previous, counter) => false,
            _ => {
                *last = Some(counter);
                true
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct ObservationIndex {
    by_token: HashMap<Token, ObservationEntry>,
    by_registration: HashMap<String, HashMap<ObjectPath, Token>>,
}

impl ObservationIndex {
    pub(crate) fn get(&self, token: &Token) -> Option<&ObservationEntry> {
        self.by_token.get(token)
    }

    fn remove_token(&mut self, token: &Token) -> Option<ObservationEntry> {
        let entry = self.by_token.remove(token)?;
        let registration_id = &entry.observation.registration_id;
        if let Some(paths) = self.by_registration.get_mut(registration_id) {
            if paths.get(&entry.observation.path) == Some(token) {
                paths.remove(&entry.observation.path);
            }
            if paths.is_empty() {
                self.by_registration.remove(registration_id);
            }
        }
        Some(entry)
    }
}

/// Outcome of [`ObservationStore::add_observation`].
#[derive(Clone, Debug, PartialEq)]
pub enum AddedObservation {
    /// Stored, with the observation it replaced, if any.
    Stored { replaced: Option<Observation> },
    /// The registration no longer exists. Nothing was stored and the device-side
    /// relation was cancelled.
    RegistrationGone,
}

/// Store of active observations with at most one observation per registration and path.
///
/// All mutations take the write lock. Notification delivery holds the read lock for the
/// whole dispatch, so once a replacement or cancellation returns no notification for the
/// old token is delivered anymore.
pub struct ObservationStore {
    transport: Arc<dyn CoapTransport>,
    registrations: Arc<dyn RegistrationStore>,
    index: RwLock<ObservationIndex>,
    listeners: Arc<ListenerRegistry<dyn ObservationListener>>,
}

impl ObservationStore {
    pub fn new(
        transport: Arc<dyn CoapTransport>,
        registrations: Arc<dyn RegistrationStore>,
        listeners: Arc<ListenerRegistry<dyn ObservationListener>>,
    ) -> Self {
        Self {
            transport,
            registrations,
            index: RwLock::new(ObservationIndex::default()),
            listeners,
        }
    }

    /// Stores `observation`, replacing any observation of the same registration and path.
    ///
    /// `observe_counter` is the observe option of the answer that established the
    /// relation; later notifications must be newer. The replaced observation is removed,
    /// cancelled on the device (best effort) and returned.
    ///
    /// The registration is looked up while the write lock is held. Deregistration removes
    /// the registration before it cancels observations, so an observation is either seen
    /// by that cleanup or refused here.
    pub async fn add_observation(
        &self,
        observation: Observation,
        peer: SocketAddr,
        observe_counter: Option<u32>,
    ) -> Result<AddedObservation, StoreError> {
        let replaced = {
            let mut index = self.index.write().await;
            if self
                .registrations
                .get_by_id(&observation.registration_id)
                .await?
                .is_none()
            {
                None
            } else {
                let previous_token = index
                    .by_registration
                    .get(&observation.registration_id)
                    .and_then(|paths| paths.get(&observation.path))
                    .cloned();
                let replaced = previous_token.and_then(|token| index.remove_token(&token));

                index
                    .by_registration
                    .entry(observation.registration_id.clone())
                    .or_default()
                    .insert(observation.path, observation.token.clone());
                index.by_token.insert(
                    observation.token.clone(),
                    ObservationEntry::new(observation.clone(), peer, observe_counter),
                );
                Some(replaced)
            }
        };

        let Some(replaced) = replaced else {
            debug!(
                event = events::OBSERVATION_REJECTED_UNKNOWN_REGISTRATION,
                component = COMPONENT,
                registration_id = observation.registration_id.as_str(),
                path = %observation.path,
                token = %observation.token,
                "registration gone before its observation was stored"
            );
            self.cancel_on_device(&ObservationEntry::new(observation, peer, None))
                .await;
            return Ok(AddedObservation::RegistrationGone);
        };

        debug!(
            event = events::OBSERVATION_ADDED,
            component = COMPONENT,
            registration_id = observation.registration_id.as_str(),
            path = %observation.path,
            token = %observation.token,
            "observation established"
        );
        self.listeners
            .notify(|listener| listener.new_observation(&observation));

        let Some(replaced) = replaced else {
            return Ok(AddedObservation::Stored { replaced: None });
        };
        debug!(
            event = events::OBSERVATION_REPLACED,
            component = COMPONENT,
            registration_id = replaced.observation.registration_id.as_str(),
            path = %replaced.observation.path,
            token = %replaced.observation.token,
            "previous observation replaced"
        );
        self.cancel_on_device(&replaced).await;
        self.listeners
            .notify(|listener| listener.cancelled(&replaced.observation));
        Ok(AddedObservation::Stored {
            replaced: Some(replaced.observation),
        })
    }

    pub async fn get_observations(&self, registration_id: &str) -> Vec<Observation> {
        let index = self.index.read().await;
        index
            .by_registration
            .get(registration_id)
            .into_iter()
            .flat_map(HashMap::values)
            .filter_map(|token| index.by_token.get(token))
            .map(|entry| entry.observation.clone())
            .collect()
    }

    pub async fn get_observation(&self, token: &Token) -> Option<Observation> {
        self.index
            .read()
            .await
            .get(token)
            .map(|entry| entry.observation.clone())
    }

    /// Removes an observation and cancels it on the device.
    ///
    /// Returns `false`, doing nothing, when it is no longer stored.
    pub async fn cancel_observation(&self, observation: &Observation) -> bool {
        let removed = self.index.write().await.remove_token(&observation.token);
        match removed {
            Some(entry) => {
                self.finish_cancel(&entry).await;
                true
            }
            None => false,
        }
    }

    /// Cancels the observation of `path` for a registration, if one is active.
    pub async fn cancel_observation_at(
        &self,
        registration_id: &str,
        path: &ObjectPath,
    ) -> Option<Observation> {
        let removed = {
            let mut index = self.index.write().await;
            let token = index
                .by_registration
                .get(registration_id)
                .and_then(|paths| paths.get(path))
                .cloned()?;
            index.remove_token(&token)
        }?;
        self.finish_cancel(&removed).await;
        Some(removed.observation)
    }

    /// Removes every observation of a registration. Used by deregistration cleanup.
    pub async fn cancel_all(&self, registration_id: &str) -> Vec<Observation> {
        let removed: Vec<ObservationEntry> = {
            let mut index = self.index.write().await;
            let tokens: Vec<Token> = index
                .by_registration
                .get(registration_id)
                .map(|paths| paths.values().cloned().collect())
                .unwrap_or_default();
            tokens
                .iter()
                .filter_map(|token| index.remove_token(token))
                .collect()
        };

        let mut observations = Vec::with_capacity(removed.len());
        for entry in removed {
            self.finish_cancel(&entry).await;
            observations.push(entry.observation);
        }
        observations
    }

    pub(crate) async fn read_index(&self) -> RwLockReadGuard<'_, ObservationIndex> {
        self.index.read().await
    }

    async fn finish_cancel(&self, entry: &ObservationEntry) {
        debug!(
            event = events::OBSERVATION_CANCELLED,
            component = COMPONENT,
            registration_id = entry.observation.registration_id.as_str(),
            path = %entry.observation.path,
            token = %entry.observation.token,
            "observation cancelled"
        );
        self.cancel_on_device(entry).await;
        self.listeners
            .notify(|listener| listener.cancelled(&entry.observation));
    }

    async fn cancel_on_device(&self, entry: &ObservationEntry) {
        if let Err(err) = self
            .transport
            .cancel_observation(entry.peer, &entry.observation.token)
            .await
        {
            warn!(
                event = events::OBSERVATION_DEVICE_CANCEL_FAILED,
                component = COMPONENT,
                registration_id = entry.observation.registration_id.as_str(),
                token = %entry.observation.token,
                err = %err,
                "device-side observation cancel failed"
            );
        }
    }
}
