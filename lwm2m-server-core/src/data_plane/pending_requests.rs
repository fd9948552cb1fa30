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

//! In-flight request tracking, keyed by registration id and a per-dispatcher sequence.

use crate::observability::events;
use crate::transport::{ExchangeFailure, ExchangeHandle, ExchangeListener};
use crate::wire::WireResponse;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

const COMPONENT: &str = "pending_requests";

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PendingRequestKey {
    pub registration_id: String,
    pub sequence: u64,
}

impl Display for PendingRequestKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.registration_id, self.sequence)
    }
}

/// First terminal event of a pending request.
#[derive(Debug)]
pub(crate) enum PendingOutcome {
    Response(WireResponse),
    Failure(ExchangeFailure),
    Cancelled,
}

struct PendingEntry {
    handle: Option<ExchangeHandle>,
    completion: oneshot::Sender<PendingOutcome>,
}

/// Owner of every in-flight request of one dispatcher instance.
///
/// An entry is resolved at most once: whichever of response, failure or cancellation
/// removes it first wins and later events find nothing.
#[derive(Default)]
pub(crate) struct PendingRequests {
    next_sequence: AtomicU64,
    entries: Mutex<HashMap<String, HashMap<u64, PendingEntry>>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a new pending request and returns its key and completion signal.
    pub(crate) async fn register(
        &self,
        registration_id: &str,
    ) -> (PendingRequestKey, oneshot::Receiver<PendingOutcome>) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let (completion, receiver) = oneshot::channel();
        self.entries
            .lock()
            .await
            .entry(registration_id.to_string())
            .or_default()
            .insert(
                sequence,
                PendingEntry {
                    handle: None,
                    completion,
                },
            );

        (
            PendingRequestKey {
                registration_id: registration_id.to_string(),
                sequence,
            },
            receiver,
        )
    }

    /// Stores the transport handle. Returns `false` when the request already resolved.
    pub(crate) async fn attach_handle(
        &self,
        key: &PendingRequestKey,
        handle: ExchangeHandle,
    ) -> bool {
        let mut entries = self.entries.lock().await;
        match entries
            .get_mut(&key.registration_id)
            .and_then(|requests| requests.get_mut(&key.sequence))
        {
            Some(entry) => {
                entry.handle = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Resolves a request with `outcome`. Returns `false` for late or duplicate events.
    pub(crate) async fn complete(&self, key: &PendingRequestKey, outcome: PendingOutcome) -> bool {
        match self.remove_entry(key).await {
            Some(entry) => {
                let _ = entry.completion.send(outcome);
                true
            }
            None => {
                debug!(
                    event = events::REQUEST_LATE_EVENT_DISCARDED,
                    component = COMPONENT,
                    registration_id = key.registration_id.as_str(),
                    sequence = key.sequence,
                    "discarding event for a request that is no longer pending"
                );
                false
            }
        }
    }

    /// Drops a request without resolving it, returning its transport handle if any.
    pub(crate) async fn remove(&self, key: &PendingRequestKey) -> Option<ExchangeHandle> {
        self.remove_entry(key).await.and_then(|entry| entry.handle)
    }

    /// Resolves every request of a registration as cancelled.
    ///
    /// Returns the transport handles that must be cancelled to stop retransmission.
    pub(crate) async fn cancel_all(&self, registration_id: &str) -> CancelledRequests {
        let removed = self.entries.lock().await.remove(registration_id);
        let mut cancelled = CancelledRequests::default();
        for (_, entry) in removed.into_iter().flatten() {
            cancelled.count += 1;
            if let Some(handle) = entry.handle {
                cancelled.handles.push(handle);
            }
            let _ = entry.completion.send(PendingOutcome::Cancelled);
        }
        cancelled
    }

    pub(crate) async fn count(&self, registration_id: &str) -> usize {
        self.entries
            .lock()
            .await
            .get(registration_id)
            .map_or(0, HashMap::len)
    }

    async fn remove_entry(&self, key: &PendingRequestKey) -> Option<PendingEntry> {
        let mut entries = self.entries.lock().await;
        let requests = entries.get_mut(&key.registration_id)?;
        let entry = requests.remove(&key.sequence);
        if requests.is_empty() {
            entries.remove(&key.registration_id);
        }
        entry
    }
}

#[derive(Debug, Default)]
pub(crate) struct CancelledRequests {
    pub(crate) count: usize,
    pub(crate) handles: Vec<ExchangeHandle>,
}

/// Transport-facing listener that resolves one pending request.
pub(crate) struct PendingExchange {
    key: PendingRequestKey,
    pending: Arc<PendingRequests>,
}

impl PendingExchange {
    pub(crate) fn new(key: PendingRequestKey, pending: Arc<PendingRequests>) -> Self {
        Self { key, pending }
    }
}

#[async_trait]
impl ExchangeListener for PendingExchange {
    async fn on_response(&self, response: WireResponse) {
        self.pending
            .complete(&self.key, PendingOutcome::Response(response))
            .await;
    }

    async fn on_failure(&self, failure: ExchangeFailure) {
        self.pending
            .complete(&self.key, PendingOutcome::Failure(failure))
            .await;
    }
}
