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

//! Awake/sleeping state machine for queue-mode registrations.

use crate::listeners::{ListenerRegistry, PresenceListener};
use crate::model::Registration;
use crate::observability::events;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

const COMPONENT: &str = "presence_tracker";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PresenceState {
    Awake,
    Sleeping,
}

struct PresenceEntry {
    state: PresenceState,
    awake_deadline: Instant,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl PresenceEntry {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct PresenceInner {
    awake_window: Duration,
    entries: Mutex<HashMap<String, PresenceEntry>>,
    listeners: Arc<ListenerRegistry<dyn PresenceListener>>,
}

/// Tracks queue-mode devices only. Registrations without an entry are always awake.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<PresenceInner>,
}

impl PresenceTracker {
    pub fn new(
        awake_window: Duration,
        listeners: Arc<ListenerRegistry<dyn PresenceListener>>,
    ) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                awake_window,
                entries: Mutex::new(HashMap::new()),
                listeners,
            }),
        }
    }

    pub fn awake_window(&self) -> Duration {
        self.inner.awake_window
    }

    /// Starts tracking a freshly registered device: AWAKE with a full window.
    ///
    /// Registrations whose binding is not queue mode are untracked.
    pub fn track(&self, registration: &Registration) {
        if !registration.uses_queue_mode() {
            self.remove(&registration.id);
            return;
        }

        let mut entries = self.inner.lock_entries();
        let entry = entries
            .entry(registration.id.clone())
            .or_insert_with(|| PresenceEntry {
                state: PresenceState::Awake,
                awake_deadline: Instant::now(),
                generation: 0,
                timer: None,
            });
        entry.state = PresenceState::Awake;
        self.inner.arm(&registration.id, entry);
        drop(entries);

        debug!(
            event = events::PRESENCE_TRACKED,
            component = COMPONENT,
            registration_id = registration.id.as_str(),
            awake_window_ms = self.inner.awake_window.as_millis() as u64,
            "queue-mode registration tracked"
        );
    }

    /// Explicit wake signal (registration update). Sleeping devices become awake.
    pub fn on_wake(&self, registration: &Registration) {
        if !registration.uses_queue_mode() {
            self.remove(&registration.id);
            return;
        }

        let woke = {
            let mut entries = self.inner.lock_entries();
            let entry = entries
                .entry(registration.id.clone())
                .or_insert_with(|| PresenceEntry {
                    state: PresenceState::Sleeping,
                    awake_deadline: Instant::now(),
                    generation: 0,
                    timer: None,
                });
            let woke = entry.state == PresenceState::Sleeping;
            entry.state = PresenceState::Awake;
            self.inner.arm(&registration.id, entry);
            woke
        };

        if woke {
            self.inner.announce(&registration.id, PresenceState::Awake);
        }
    }

    /// Traffic from an awake device (a response or inbound message) extends its window.
    pub fn on_contact(&self, registration_id: &str) {
        let mut entries = self.inner.lock_entries();
        if let Some(entry) = entries.get_mut(registration_id) {
            if entry.state == PresenceState::Awake {
                self.inner.arm(registration_id, entry);
            }
        }
    }

    /// A request went unanswered: the device is declared sleeping.
    ///
    /// Returns `true` when this call performed the AWAKE -> SLEEPING transition.
    pub fn on_no_response(&self, registration_id: &str) -> bool {
        let transitioned = {
            let mut entries = self.inner.lock_entries();
            match entries.get_mut(registration_id) {
                Some(entry) if entry.state == PresenceState::Awake => {
                    entry.state = PresenceState::Sleeping;
                    entry.generation += 1;
                    entry.stop_timer();
                    true
                }
                _ => false,
            }
        };

        if transitioned {
            self.inner
                .announce(registration_id, PresenceState::Sleeping);
        }
        transitioned
    }

    /// `true` only for a tracked registration that is currently sleeping.
    pub fn is_sleeping(&self, registration_id: &str) -> bool {
        self.state(registration_id) == Some(PresenceState::Sleeping)
    }

    /// Current state, or `None` for registrations that are not tracked.
    pub fn state(&self, registration_id: &str) -> Option<PresenceState> {
        // The timer normally performs the transition; checking the deadline here
        // covers a timer that has not been polled yet.
        let (state, transitioned) = {
            let mut entries = self.inner.lock_entries();
            let entry = entries.get_mut(registration_id)?;
            let transitioned = entry.state == PresenceState::Awake
                && Instant::now() >= entry.awake_deadline;
            if transitioned {
                entry.state = PresenceState::Sleeping;
                entry.generation += 1;
                entry.stop_timer();
            }
            (entry.state, transitioned)
        };

        if transitioned {
            self.inner
                .announce(registration_id, PresenceState::Sleeping);
        }
        Some(state)
    }

    /// Forgets a registration. No transition is announced.
    pub fn remove(&self, registration_id: &str) {
        let removed = self.inner.lock_entries().remove(registration_id);
        if let Some(mut entry) = removed {
            entry.stop_timer();
            debug!(
                event = events::PRESENCE_UNTRACKED,
                component = COMPONENT,
                registration_id,
                "registration no longer tracked"
            );
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock_entries().len()
    }
}

impl PresenceInner {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, PresenceEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Resets the deadline and replaces the sleep timer of an awake entry.
    fn arm(self: &Arc<Self>, registration_id: &str, entry: &mut PresenceEntry) {
        entry.stop_timer();
        entry.generation += 1;
        entry.awake_deadline = Instant::now() + self.awake_window;

        let generation = entry.generation;
        let deadline = entry.awake_deadline;
        let inner = Arc::downgrade(self);
        let registration_id = registration_id.to_string();
        entry.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(&registration_id, generation);
            }
        }));
    }

    fn expire(&self, registration_id: &str, generation: u64) {
        let transitioned = {
            let mut entries = self.lock_entries();
            match entries.get_mut(registration_id) {
                Some(entry)
                    if entry.generation == generation && entry.state == PresenceState::Awake =>
                {
                    entry.state = PresenceState::Sleeping;
                    entry.timer = None;
                    true
                }
                _ => false,
            }
        };

        if transitioned {
            self.announce(registration_id, PresenceState::Sleeping);
        }
    }

    fn announce(&self, registration_id: &str, state: PresenceState) {
        match state {
            PresenceState::Awake => {
                info!(
                    event = events::PRESENCE_AWAKE,
                    component = COMPONENT,
                    registration_id,
                    "device is awake"
                );
                self.listeners
                    .notify(|listener| listener.on_awake(registration_id));
            }
            PresenceState::Sleeping => {
                info!(
                    event = events::PRESENCE_SLEEPING,
                    component = COMPONENT,
                    registration_id,
                    "device is sleeping"
                );
                self.listeners
                    .notify(|listener| listener.on_sleeping(registration_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PresenceState, PresenceTracker};
    use crate::listeners::{ListenerRegistry, PresenceListener};
    use crate::model::{BindingMode, Registration};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPresence {
        transitions: Mutex<Vec<(String, PresenceState)>>,
    }

    impl PresenceListener for RecordingPresence {
        fn on_awake(&self, registration_id: &str) {
            self.transitions
                .lock()
                .expect("lock")
                .push((registration_id.to_string(), PresenceState::Awake));
        }

        fn on_sleeping(&self, registration_id: &str) {
            self.transitions
                .lock()
                .expect("lock")
                .push((registration_id.to_string(), PresenceState::Sleeping));
        }
    }

    fn tracker() -> (PresenceTracker, Arc<RecordingPresence>) {
        let listeners: Arc<ListenerRegistry<dyn PresenceListener>> =
            Arc::new(ListenerRegistry::new());
        let recorder = Arc::new(RecordingPresence::default());
        listeners.add(recorder.clone());
        (
            PresenceTracker::new(Duration::from_secs(10), listeners),
            recorder,
        )
    }

    fn queue_registration() -> Registration {
        Registration::new(
            "dev-1",
            "192.0.2.1:5683".parse().expect("valid address"),
            Utc::now(),
        )
        .with_binding(BindingMode::udp_queue())
    }

    #[tokio::test(start_paused = true)]
    async fn awake_window_elapsing_puts_device_to_sleep_once() {
        let (tracker, recorder) = tracker();
        let registration = queue_registration();
        tracker.track(&registration);
        assert_eq!(tracker.state(&registration.id), Some(PresenceState::Awake));

        tokio::time::sleep(Duration::from_secs(6)).await;
        tracker.on_contact(&registration.id);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!tracker.is_sleeping(&registration.id));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(tracker.is_sleeping(&registration.id));
        assert!(tracker.is_sleeping(&registration.id));

        assert_eq!(
            *recorder.transitions.lock().expect("lock"),
            vec![(registration.id.clone(), PresenceState::Sleeping)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn registration_update_wakes_a_sleeping_device() {
        let (tracker, recorder) = tracker();
        let registration = queue_registration();
        tracker.track(&registration);
        assert!(tracker.on_no_response(&registration.id));
        assert!(!tracker.on_no_response(&registration.id));

        tracker.on_contact(&registration.id);
        assert!(tracker.is_sleeping(&registration.id));

        tracker.on_wake(&registration);
        assert_eq!(tracker.state(&registration.id), Some(PresenceState::Awake));
        tracker.on_wake(&registration);

        assert_eq!(
            *recorder.transitions.lock().expect("lock"),
            vec![
                (registration.id.clone(), PresenceState::Sleeping),
                (registration.id.clone(), PresenceState::Awake),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_queue_registrations_are_never_tracked() {
        let (tracker, _recorder) = tracker();
        let registration = Registration::new(
            "dev-2",
            "192.0.2.2:5683".parse().expect("valid address"),
            Utc::now(),
        );

        tracker.track(&registration);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(tracker.state(&registration.id), None);
        assert!(!tracker.is_sleeping(&registration.id));
        assert!(!tracker.on_no_response(&registration.id));
        assert_eq!(tracker.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_registrations_never_transition() {
        let (tracker, recorder) = tracker();
        let registration = queue_registration();
        tracker.track(&registration);
        tracker.remove(&registration.id);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(recorder.transitions.lock().expect("lock").is_empty());
        assert_eq!(tracker.tracked(), 0);
    }
}
