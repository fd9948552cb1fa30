//! Registration lifecycle orchestration across store, dispatcher, observations and presence.

use crate::control_plane::registration_store::RegistrationStore;
use crate::data_plane::RequestDispatcher;
use crate::error::StoreError;
use crate::listeners::{ListenerRegistry, RegistrationListener, UnregistrationCause};
use crate::model::{Observation, Registration, RegistrationUpdate};
use crate::observability::{events, fields};
use crate::observe::ObservationStore;
use crate::presence::PresenceTracker;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "registration_lifecycle";

/// Outcome of a registration that replaced an earlier one for the same endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplacedRegistration {
    pub registration: Arc<Registration>,
    pub observations: Vec<Observation>,
    pub cancelled_requests: usize,
}

/// A registration removed by deregistration or expiration, with what its cleanup removed.
#[derive(Clone, Debug, PartialEq)]
pub struct RemovedRegistration {
    pub registration: Arc<Registration>,
    pub observations: Vec<Observation>,
    pub cancelled_requests: usize,
}

/// Applies registration transitions and runs the cleanup each one requires.
///
/// Cleanup always happens after the store change is committed, so a request racing with
/// deregistration either sees the registration gone or is cancelled here.
pub struct RegistrationLifecycle {
    store: Arc<dyn RegistrationStore>,
    dispatcher: RequestDispatcher,
    observations: Arc<ObservationStore>,
    presence: PresenceTracker,
    listeners: Arc<ListenerRegistry<dyn RegistrationListener>>,
    expiration_grace_secs: u64,
}

impl RegistrationLifecycle {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        dispatcher: RequestDispatcher,
        observations: Arc<ObservationStore>,
        presence: PresenceTracker,
        listeners: Arc<ListenerRegistry<dyn RegistrationListener>>,
        expiration_grace_secs: u64,
    ) -> Self {
        Self {
            store,
            dispatcher,
            observations,
            presence,
            listeners,
            expiration_grace_secs,
        }
    }

    pub fn store(&self) -> &Arc<dyn RegistrationStore> {
        &self.store
    }

    /// Stores a new registration. A previous registration of the same endpoint is
    /// replaced and cleaned up.
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<Option<ReplacedRegistration>, StoreError> {
        let replaced = self.store.add(registration.clone()).await?;

        let replaced = match replaced {
            Some(previous) => {
                let (observations, cancelled_requests) = self.cleanup(&previous).await;
                info!(
                    event = events::REGISTRATION_REPLACED,
                    component = COMPONENT,
                    endpoint = registration.endpoint.as_str(),
                    registration_id = registration.id.as_str(),
                    previous_registration_id = previous.id.as_str(),
                    "registration replaced an earlier one"
                );
                self.listeners.notify(|listener| {
                    listener.unregistered(&previous, &observations, UnregistrationCause::Replaced)
                });
                Some(ReplacedRegistration {
                    registration: previous,
                    observations,
                    cancelled_requests,
                })
            }
            None => None,
        };

        self.presence.track(&registration);
        self.untrack_if_gone(&registration.id).await;
        info!(
            event = events::REGISTRATION_ADD_OK,
            component = COMPONENT,
            endpoint = registration.endpoint.as_str(),
            registration_id = registration.id.as_str(),
            peer = %registration.address,
            lifetime_secs = registration.lifetime_secs,
            binding = %registration.binding,
            "device registered"
        );
        self.listeners.notify(|listener| {
            listener.registered(
                &registration,
                replaced.as_ref().map(|replaced| replaced.registration.as_ref()),
                replaced
                    .as_ref()
                    .map(|replaced| replaced.observations.as_slice())
                    .unwrap_or_default(),
            )
        });
        Ok(replaced)
    }

    /// Applies a registration update. `Ok(None)` when the id is unknown.
    ///
    /// An update is the wake-up signal of a queue-mode device.
    pub async fn update(
        &self,
        update: RegistrationUpdate,
    ) -> Result<Option<Arc<Registration>>, StoreError> {
        let Some(updated) = self.store.update(&update, Utc::now()).await? else {
            debug!(
                event = events::REGISTRATION_UPDATE_UNKNOWN,
                component = COMPONENT,
                registration_id = update.registration_id.as_str(),
                "update for unknown registration"
            );
            return Ok(None);
        };

        self.presence.on_wake(&updated.updated);
        self.untrack_if_gone(&updated.updated.id).await;
        debug!(
            event = events::REGISTRATION_UPDATE_OK,
            component = COMPONENT,
            registration_id = updated.updated.id.as_str(),
            endpoint = updated.updated.endpoint.as_str(),
            "registration updated"
        );
        self.listeners.notify(|listener| {
            listener.updated(&update, &updated.updated, &updated.previous)
        });
        Ok(Some(updated.updated))
    }

    /// Removes a registration and cancels its pending requests and observations.
    pub async fn deregister(
        &self,
        registration_id: &str,
    ) -> Result<Option<RemovedRegistration>, StoreError> {
        let Some(registration) = self.store.remove(registration_id).await? else {
            debug!(
                event = events::REGISTRATION_REMOVE_UNKNOWN,
                component = COMPONENT,
                registration_id,
                "deregistration for unknown registration"
            );
            return Ok(None);
        };

        let removed = self
            .finish_removal(registration, UnregistrationCause::Deregistered)
            .await;
        Ok(Some(removed))
    }

    /// Removes every registration no longer alive at `now`.
    pub async fn expire(&self, now: DateTime<Utc>) -> Result<Vec<RemovedRegistration>, StoreError> {
        let expired = self
            .store
            .remove_expired(now, self.expiration_grace_secs)
            .await?;

        let mut removed = Vec::with_capacity(expired.len());
        for registration in expired {
            removed.push(
                self.finish_removal(registration, UnregistrationCause::Expired)
                    .await,
            );
        }
        Ok(removed)
    }

    async fn finish_removal(
        &self,
        registration: Arc<Registration>,
        cause: UnregistrationCause,
    ) -> RemovedRegistration {
        let (observations, cancelled_requests) = self.cleanup(&registration).await;
        let event = match cause {
            UnregistrationCause::Expired => events::REGISTRATION_EXPIRED,
            _ => events::REGISTRATION_REMOVE_OK,
        };
        let reason = match cause {
            UnregistrationCause::Deregistered => fields::REASON_DEREGISTERED,
            UnregistrationCause::Replaced => fields::REASON_REPLACED,
            UnregistrationCause::Expired => fields::REASON_EXPIRED,
        };
        info!(
            event = event,
            component = COMPONENT,
            endpoint = registration.endpoint.as_str(),
            registration_id = registration.id.as_str(),
            reason,
            "registration removed"
        );
        self.listeners.notify(|listener| {
            listener.unregistered(&registration, &observations, cause)
        });
        RemovedRegistration {
            registration,
            observations,
            cancelled_requests,
        }
    }

    /// Drops presence tracking started for a registration that a concurrent
    /// replacement or removal already cleaned up.
    ///
    /// Cleanup removes presence after the store commit, so a lookup made after tracking
    /// either finds the registration (a later cleanup will remove the entry) or does not.
    async fn untrack_if_gone(&self, registration_id: &str) {
        match self.store.get_by_id(registration_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(
                    event = events::REGISTRATION_CLEANUP_DONE,
                    component = COMPONENT,
                    registration_id,
                    "registration removed concurrently, presence untracked"
                );
                self.presence.remove(registration_id);
            }
            Err(err) => {
                warn!(
                    event = events::REGISTRATION_STORE_FAILED,
                    component = COMPONENT,
                    registration_id,
                    err = %err,
                    "unable to confirm registration after tracking presence"
                );
            }
        }
    }

    async fn cleanup(&self, registration: &Registration) -> (Vec<Observation>, usize) {
        let cancelled_requests = self.dispatcher.cancel_pending(&registration.id).await;
        let observations = self.observations.cancel_all(&registration.id).await;
        self.presence.remove(&registration.id);
        debug!(
            event = events::REGISTRATION_CLEANUP_DONE,
            component = COMPONENT,
            registration_id = registration.id.as_str(),
            cancelled_requests,
            removed_observations = observations.len(),
            "registration cleanup done"
        );
        (observations, cancelled_requests)
    }
}
