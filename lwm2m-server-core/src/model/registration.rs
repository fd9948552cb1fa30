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

use crate::model::link::{root_path, Link};
use crate::model::{BindingMode, ObjectPath};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::net::SocketAddr;

pub const DEFAULT_LIFETIME_SECS: u64 = 86_400;
pub const DEFAULT_LWM2M_VERSION: &str = "1.0";

/// Server-side record of one registered device.
///
/// A `Registration` is a value: stores hand out `Arc<Registration>` snapshots and an
/// update produces a new value through [`Registration::apply_update`].
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    pub id: String,
    pub endpoint: String,
    pub address: SocketAddr,
    pub lifetime_secs: u64,
    pub lwm2m_version: String,
    pub binding: BindingMode,
    pub sms_number: Option<String>,
    pub object_links: Vec<Link>,
    pub root_path: String,
    pub registration_date: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub additional_attributes: BTreeMap<String, String>,
}

impl Registration {
    /// Creates a registration with a freshly generated id and default parameters.
    pub fn new(endpoint: &str, address: SocketAddr, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_registration_id(),
            endpoint: endpoint.to_string(),
            address,
            lifetime_secs: DEFAULT_LIFETIME_SECS,
            lwm2m_version: DEFAULT_LWM2M_VERSION.to_string(),
            binding: BindingMode::default(),
            sms_number: None,
            object_links: Vec::new(),
            root_path: "/".to_string(),
            registration_date: now,
            last_update: now,
            additional_attributes: BTreeMap::new(),
        }
    }

    pub fn with_lifetime(mut self, lifetime_secs: u64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    pub fn with_binding(mut self, binding: BindingMode) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_lwm2m_version(mut self, version: &str) -> Self {
        self.lwm2m_version = version.to_string();
        self
    }

    pub fn with_sms_number(mut self, sms_number: Option<String>) -> Self {
        self.sms_number = sms_number;
        self
    }

    /// Sets the object links and derives the root path they announce.
    pub fn with_object_links(mut self, object_links: Vec<Link>) -> Self {
        self.root_path = root_path(&object_links);
        self.object_links = object_links;
        self
    }

    pub fn with_additional_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.additional_attributes = attributes;
        self
    }

    pub fn uses_queue_mode(&self) -> bool {
        self.binding.is_queue_mode()
    }

    /// Object tree paths the device announced.
    pub fn supported_paths(&self) -> Vec<ObjectPath> {
        self.object_links
            .iter()
            .filter_map(|link| link.object_path(&self.root_path))
            .collect()
    }

    pub fn expiration_time(&self, grace_secs: u64) -> DateTime<Utc> {
        let validity = self.lifetime_secs.saturating_add(grace_secs);
        let validity = i64::try_from(validity).unwrap_or(i64::MAX);
        self.last_update
            .checked_add_signed(Duration::seconds(validity.min(i64::MAX / 1_000)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// `false` once `now > last_update + lifetime + grace`.
    pub fn is_alive_at(&self, now: DateTime<Utc>, grace_secs: u64) -> bool {
        now <= self.expiration_time(grace_secs)
    }

    /// Produces the next version of this registration with `update` applied.
    pub fn apply_update(&self, update: &RegistrationUpdate, now: DateTime<Utc>) -> Registration {
        let mut next = self.clone();
        if let Some(address) = update.address {
            next.address = address;
        }
        if let Some(lifetime_secs) = update.lifetime_secs {
            next.lifetime_secs = lifetime_secs;
        }
        if let Some(binding) = &update.binding {
            next.binding = binding.clone();
        }
        if let Some(sms_number) = &update.sms_number {
            next.sms_number = Some(sms_number.clone());
        }
        if let Some(object_links) = &update.object_links {
            next = next.with_object_links(object_links.clone());
        }
        next.additional_attributes
            .extend(update.additional_attributes.clone());
        next.last_update = now;
        next
    }
}

/// Partial update addressed at one registration id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistrationUpdate {
    pub registration_id: String,
    pub address: Option<SocketAddr>,
    pub lifetime_secs: Option<u64>,
    pub binding: Option<BindingMode>,
    pub sms_number: Option<String>,
    pub object_links: Option<Vec<Link>>,
    pub additional_attributes: BTreeMap<String, String>,
}

impl RegistrationUpdate {
    pub fn new(registration_id: &str) -> Self {
        Self {
            registration_id: registration_id.to_string(),
            ..Default::default()
        }
    }
}

fn generate_registration_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
