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

//! Registration storage: the authoritative record of live registrations.

use crate::error::StoreError;
use crate::model::{Registration, RegistrationUpdate};
use crate::observability::events;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const COMPONENT: &str = "registration_store";

/// Both versions of a registration touched by an update.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdatedRegistration {
    pub previous: Arc<Registration>,
    pub updated: Arc<Registration>,
}

/// Concurrent registration map keyed by id, endpoint name and address.
///
/// Lookups that find nothing return `Ok(None)`; `Err` is reserved for storage faults.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Inserts `registration`, atomically replacing and returning any registration with
    /// the same endpoint name.
    async fn add(&self, registration: Registration)
        -> Result<Option<Arc<Registration>>, StoreError>;

    /// Applies `update` to the registration it addresses. `Ok(None)` for an unknown id.
    async fn update(
        &self,
        update: &RegistrationUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<UpdatedRegistration>, StoreError>;

    async fn remove(&self, registration_id: &str) -> Result<Option<Arc<Registration>>, StoreError>;

    /// Removes and returns every registration that is no longer alive at `now`.
    async fn remove_expired(
        &self,
        now: DateTime<Utc>,
        grace_secs: u64,
    ) -> Result<Vec<Arc<Registration>>, StoreError>;

    async fn get_by_id(&self, registration_id: &str)
        -> Result<Option<Arc<Registration>>, StoreError>;

    async fn get_by_endpoint(&self, endpoint: &str)
        -> Result<Option<Arc<Registration>>, StoreError>;

    async fn get_by_address(
        &self,
        address: SocketAddr,
    ) -> Result<Option<Arc<Registration>>, StoreError>;

    async fn all(&self) -> Result<Vec<Arc<Registration>>, StoreError>;
}

#[derive(Clone, Default)]
struct RegistrationIndex {
    version: u64,
    by_id: HashMap<String, Arc<Registration>>,
    id_by_endpoint: HashMap<String, String>,
    id_by_address: HashMap<SocketAddr, String>,
}

impl RegistrationIndex {
    fn insert(&mut self, registration: Arc<Registration>) {
        self.id_by_endpoint
            .insert(registration.endpoint.clone(), registration.id.clone());
        self.id_by_address
            .insert(registration.address, registration.id.clone());
        self.by_id.insert(registration.id.clone(), registration);
    }

    fn remove(&mut self, registration_id: &str) -> Option<Arc<Registration>> {
        let removed = self.by_id.remove(registration_id)?;
        if self.id_by_endpoint.get(&removed.endpoint) == Some(&removed.id) {
            self.id_by_endpoint.remove(&removed.endpoint);
        }
        if self.id_by_address.get(&removed.address) == Some(&removed.id) {
            self.id_by_address.remove(&removed.address);
        }
        Some(removed)
    }

    fn by_endpoint(&self, endpoint: &str) -> Option<Arc<Registration>> {
        self.id_by_endpoint
            .get(endpoint)
            .and_then(|id| self.by_id.get(id))
            .cloned()
    }
}

/// In-process store.
///
/// Writers are serialized by one mutex and publish a fresh index snapshot; readers load
/// the current snapshot without locking and never see a partially applied change.
pub struct InMemoryRegistrationStore {
    writer: Mutex<()>,
    snapshot: ArcSwap<RegistrationIndex>,
    next_version: AtomicU64,
}

impl Default for InMemoryRegistrationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(()),
            snapshot: ArcSwap::from_pointee(RegistrationIndex::default()),
            next_version: AtomicU64::new(1),
        }
    }

    /// Applies `mutate` to a copy of the current index and publishes it.
    async fn mutate<R>(&self, mutate: impl FnOnce(&mut RegistrationIndex) -> R) -> R {
        let _writer = self.writer.lock().await;
        let mut next = RegistrationIndex::clone(&self.snapshot.load());
        let result = mutate(&mut next);
        next.version = self.next_version.fetch_add(1, Ordering::Relaxed);
        self.snapshot.store(Arc::new(next));
        result
    }

    #[cfg(test)]
    fn current_version(&self) -> u64 {
        self.snapshot.load().version
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn add(
        &self,
        registration: Registration,
    ) -> Result<Option<Arc<Registration>>, StoreError> {
        let registration = Arc::new(registration);
        let replaced = self
            .mutate(|index| {
                let replaced = index
                    .by_endpoint(&registration.endpoint)
                    .and_then(|previous| index.remove(&previous.id));
                index.insert(registration.clone());
                replaced
            })
            .await;

        debug!(
            event = events::REGISTRATION_ADD_OK,
            component = COMPONENT,
            registration_id = registration.id.as_str(),
            endpoint = registration.endpoint.as_str(),
            replaced = replaced.is_some(),
            "registration stored"
        );
        Ok(replaced)
    }

    async fn update(
        &self,
        update: &RegistrationUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<UpdatedRegistration>, StoreError> {
        Ok(self
            .mutate(|index| {
                let previous = index.remove(&update.registration_id)?;
                let updated = Arc::new(previous.apply_update(update, now));
                index.insert(updated.clone());
                Some(UpdatedRegistration { previous, updated })
            })
            .await)
    }

    async fn remove(
        &self,
        registration_id: &str,
    ) -> Result<Option<Arc<Registration>>, StoreError> {
        if self.snapshot.load().by_id.get(registration_id).is_none() {
            return Ok(None);
        }
        Ok(self.mutate(|index| index.remove(registration_id)).await)
    }

    async fn remove_expired(
        &self,
        now: DateTime<Utc>,
        grace_secs: u64,
    ) -> Result<Vec<Arc<Registration>>, StoreError> {
        let any_expired = self
            .snapshot
            .load()
            .by_id
            .values()
            .any(|registration| !registration.is_alive_at(now, grace_secs));
        if !any_expired {
            return Ok(Vec::new());
        }

        Ok(self
            .mutate(|index| {
                let expired_ids: Vec<String> = index
                    .by_id
                    .values()
                    .filter(|registration| !registration.is_alive_at(now, grace_secs))
                    .map(|registration| registration.id.clone())
                    .collect();
                expired_ids
                    .iter()
                    .filter_map(|id| index.remove(id))
                    .collect()
            })
            .await)
    }

    async fn get_by_id(
        &self,
        registration_id: &str,
    ) -> Result<Option<Arc<Registration>>, StoreError> {
        Ok(self.snapshot.load().by_id.get(registration_id).cloned())
    }

    async fn get_by_endpoint(
        &self,
        endpoint: &str,
    ) -> Result<Option<Arc<Registration>>, StoreError> {
        Ok(self.snapshot.load().by_endpoint(endpoint))
    }

    async fn get_by_address(
        &self,
        address: SocketAddr,
    ) -> Result<Option<Arc<Registration>>, StoreError> {
        let snapshot = self.snapshot.load();
        Ok(snapshot
            .id_by_address
            .get(&address)
            .and_then(|id| snapshot.by_id.get(id))
            .cloned())
    }

    async fn all(&self) -> Result<Vec<Arc<Registration>>, StoreError> {
        Ok(self.snapshot.load().by_id.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryRegistrationStore, RegistrationStore};
    use crate::model::{BindingMode, Registration, RegistrationUpdate};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn address(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 1], port))
    }

    #[tokio::test]
    async fn re_registration_replaces_previous_for_same_endpoint() {
        let store = InMemoryRegistrationStore::new();
        let now = Utc::now();
        let first = Registration::new("dev-1", address(5683), now);
        let second = Registration::new("dev-1", address(5684), now);

        assert!(store.add(first.clone()).await.expect("add").is_none());
        let replaced = store
            .add(second.clone())
            .await
            .expect("add")
            .expect("first registration is replaced");

        assert_eq!(replaced.id, first.id);
        assert_eq!(store.all().await.expect("all").len(), 1);
        assert!(store.get_by_id(&first.id).await.expect("get").is_none());
        assert!(store.get_by_address(address(5683)).await.expect("get").is_none());
        assert_eq!(
            store
                .get_by_endpoint("dev-1")
                .await
                .expect("get")
                .expect("present")
                .id,
            second.id
        );
    }

    #[tokio::test]
    async fn update_produces_new_value_and_reindexes_address() {
        let store = InMemoryRegistrationStore::new();
        let now = Utc::now();
        let registration = Registration::new("dev-1", address(5683), now);
        store.add(registration.clone()).await.expect("add");
        let before = store.current_version();

        let mut update = RegistrationUpdate::new(&registration.id);
        update.address = Some(address(6000));
        update.lifetime_secs = Some(60);
        update.binding = Some(BindingMode::udp_queue());
        let later = now + Duration::seconds(5);

        let updated = store
            .update(&update, later)
            .await
            .expect("update")
            .expect("known id");

        assert_eq!(updated.previous.lifetime_secs, registration.lifetime_secs);
        assert_eq!(updated.updated.lifetime_secs, 60);
        assert_eq!(updated.updated.last_update, later);
        assert!(updated.updated.uses_queue_mode());
        assert!(store.get_by_address(address(5683)).await.expect("get").is_none());
        assert_eq!(
            store
                .get_by_address(address(6000))
                .await
                .expect("get")
                .expect("present")
                .id,
            registration.id
        );
        assert!(store.current_version() > before);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found_rather_than_errors() {
        let store = InMemoryRegistrationStore::new();

        assert!(store
            .update(&RegistrationUpdate::new("missing"), Utc::now())
            .await
            .expect("update")
            .is_none());
        assert!(store.remove("missing").await.expect("remove").is_none());
        assert!(store.get_by_id("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn remove_expired_only_takes_stale_registrations() {
        let store = InMemoryRegistrationStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let short = Registration::new("short", address(1), t0).with_lifetime(10);
        let long = Registration::new("long", address(2), t0).with_lifetime(3600);
        store.add(short.clone()).await.expect("add");
        store.add(long.clone()).await.expect("add");

        let expired = store
            .remove_expired(t0 + Duration::seconds(11), 0)
            .await
            .expect("sweep");

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, short.id);
        assert!(store
            .remove_expired(t0 + Duration::seconds(11), 0)
            .await
            .expect("sweep")
            .is_empty());
        assert!(store.get_by_id(&long.id).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn concurrent_registrations_of_distinct_endpoints_all_land() {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let now = Utc::now();

        let adds = (0..32u16).map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .add(Registration::new(&format!("dev-{n}"), address(n + 1), now))
                    .await
            })
        });
        for add in futures::future::join_all(adds).await {
            assert!(add.expect("task").expect("add").is_none());
        }

        assert_eq!(store.all().await.expect("all").len(), 32);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_of_one_endpoint_leave_a_single_survivor() {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let now = Utc::now();
        let registrations: Vec<Registration> = (0..16u16)
            .map(|n| Registration::new("dev-1", address(n + 1), now))
            .collect();
        let ids: HashSet<String> = registrations.iter().map(|r| r.id.clone()).collect();

        let adds = registrations.into_iter().map(|registration| {
            let store = store.clone();
            tokio::spawn(async move { store.add(registration).await })
        });
        let replaced: Vec<String> = futures::future::join_all(adds)
            .await
            .into_iter()
            .filter_map(|add| add.expect("task").expect("add"))
            .map(|previous| previous.id.clone())
            .collect();

        let all = store.all().await.expect("all");
        assert_eq!(all.len(), 1);
        assert_eq!(replaced.len(), ids.len() - 1);

        let replaced: HashSet<String> = replaced.into_iter().collect();
        assert_eq!(replaced.len(), ids.len() - 1);
        assert!(!replaced.contains(&all[0].id));
        assert!(ids.contains(&all[0].id));
        assert!(replaced.is_subset(&ids));
        assert_eq!(
            store
                .get_by_endpoint("dev-1")
                .await
                .expect("get")
                .map(|survivor| survivor.id.clone()),
            Some(all[0].id.clone())
        );
    }
}
