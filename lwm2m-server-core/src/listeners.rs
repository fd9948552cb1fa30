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

//! Listener traits and the callback registry shared by every event source.
//!
//! Every method has an empty default so implementors only override what they need.
//! Listeners are invoked synchronously from the task that produced the event and must
//! not block.

use crate::model::{Observation, Registration, RegistrationUpdate};
use crate::observe::notification::{NotificationError, ObservedValue};
use std::sync::{Arc, RwLock};

/// Why a registration stopped being live.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnregistrationCause {
    /// The device sent a deregistration request or the server removed it explicitly.
    Deregistered,
    /// A newer registration with the same endpoint name took its place.
    Replaced,
    /// Its lifetime elapsed without an update.
    Expired,
}

pub trait RegistrationListener: Send + Sync {
    /// `previous` is the registration replaced by this one, with the observations removed
    /// during that replacement.
    fn registered(
        &self,
        _registration: &Registration,
        _previous: Option<&Registration>,
        _previous_observations: &[Observation],
    ) {
    }

    fn updated(
        &self,
        _update: &RegistrationUpdate,
        _updated: &Registration,
        _previous: &Registration,
    ) {
    }

    fn unregistered(
        &self,
        _registration: &Registration,
        _observations: &[Observation],
        _cause: UnregistrationCause,
    ) {
    }
}

pub trait ObservationListener: Send + Sync {
    fn new_observation(&self, _observation: &Observation) {}

    fn cancelled(&self, _observation: &Observation) {}

    fn on_notification(&self, _observation: &Observation, _value: &ObservedValue) {}

    fn on_error(&self, _observation: &Observation, _error: &NotificationError) {}
}

pub trait PresenceListener: Send + Sync {
    fn on_awake(&self, _registration_id: &str) {}

    fn on_sleeping(&self, _registration_id: &str) {}
}

/// Ordered set of listeners for one concern.
pub struct ListenerRegistry<L: ?Sized> {
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<L>) {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push(listener);
    }

    /// Removes a listener by identity. Returns `true` when it was registered.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = listeners.len();
        listeners.retain(|registered| !Arc::ptr_eq(registered, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `f` on every listener. The registry lock is not held during the calls.
    pub fn notify(&self, mut f: impl FnMut(&L)) {
        for listener in self.snapshot() {
            f(listener.as_ref());
        }
    }

    fn snapshot(&self) -> Vec<Arc<L>> {
        match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
