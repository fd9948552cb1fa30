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

//! Server-side `/rd` resource: register, update and deregister requests from devices.

use crate::codec::ContentFormat;
use crate::control_plane::registration_lifecycle::RegistrationLifecycle;
use crate::error::StoreError;
use crate::model::link::parse_link_format;
use crate::model::{BindingMode, Link, Registration, RegistrationUpdate};
use crate::observability::events;
use crate::wire::{CoapMethod, InboundRequest, InboundResponse, ResponseCode};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

const COMPONENT: &str = "registration_endpoint";

const QUERY_ENDPOINT: &str = "ep";
const QUERY_LIFETIME: &str = "lt";
const QUERY_VERSION: &str = "lwm2m";
const QUERY_BINDING: &str = "b";
const QUERY_SMS: &str = "sms";

/// Rejection of a malformed registration interface request.
struct Rejection {
    code: ResponseCode,
    message: String,
}

impl Rejection {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// Query parameters split into the recognised ones and the free-form remainder.
#[derive(Default)]
struct RegistrationParameters {
    endpoint: Option<String>,
    lifetime_secs: Option<u64>,
    lwm2m_version: Option<String>,
    binding: Option<BindingMode>,
    sms_number: Option<String>,
    additional: BTreeMap<String, String>,
}

impl RegistrationParameters {
    fn parse(query: &[String]) -> Result<Self, Rejection> {
        let mut parameters = Self::default();
        for entry in query {
            let (key, value) = match entry.split_once('=') {
                Some((key, value)) => (key, value),
                None => (entry.as_str(), ""),
            };
            match key {
                QUERY_ENDPOINT => parameters.endpoint = Some(value.to_string()),
                QUERY_LIFETIME => {
                    let lifetime = value
                        .parse::<u64>()
                        .ok()
                        .filter(|lifetime| *lifetime > 0)
                        .ok_or_else(|| Rejection::bad_request(format!("invalid lifetime {value:?}")))?;
                    parameters.lifetime_secs = Some(lifetime);
                }
                QUERY_VERSION => parameters.lwm2m_version = Some(value.to_string()),
                QUERY_BINDING => {
                    let binding = value
                        .parse::<BindingMode>()
                        .map_err(|err| Rejection::bad_request(err.to_string()))?;
                    parameters.binding = Some(binding);
                }
                QUERY_SMS => parameters.sms_number = Some(value.to_string()),
                "" => return Err(Rejection::bad_request("empty query parameter")),
                other => {
                    parameters
                        .additional
                        .insert(other.to_string(), value.to_string());
                }
            }
        }
        Ok(parameters)
    }
}

/// Handler for the registration interface.
pub struct RegistrationEndpoint {
    lifecycle: Arc<RegistrationLifecycle>,
    root: String,
    default_lifetime_secs: u64,
}

impl RegistrationEndpoint {
    pub fn new(
        lifecycle: Arc<RegistrationLifecycle>,
        root: &str,
        default_lifetime_secs: u64,
    ) -> Self {
        Self {
            lifecycle,
            root: root.trim_matches('/').to_string(),
            default_lifetime_secs,
        }
    }

    pub async fn handle(&self, request: InboundRequest) -> InboundResponse {
        debug!(
            event = events::RD_REQUEST_RECEIVED,
            component = COMPONENT,
            peer = %request.peer,
            method = %request.method,
            path = request.uri_path.join("/").as_str(),
            "registration interface request"
        );

        let segments: Vec<&str> = request.uri_path.iter().map(String::as_str).collect();
        let result = match segments.as_slice() {
            [root, ..] if *root != self.root => Err(Rejection {
                code: ResponseCode::NOT_FOUND,
                message: "unknown resource".to_string(),
            }),
            _ if !request.confirmable => {
                Err(Rejection::bad_request("registration interface requires confirmable messages"))
            }
            [_] if request.method == CoapMethod::Post => self.register(&request).await,
            [_, registration_id] if request.method == CoapMethod::Post => {
                self.update(&request, registration_id).await
            }
            [_, registration_id] if request.method == CoapMethod::Delete => {
                self.deregister(registration_id).await
            }
            [_] | [_, _] => Err(Rejection {
                code: ResponseCode::METHOD_NOT_ALLOWED,
                message: format!("{} is not allowed here", request.method),
            }),
            _ => Err(Rejection {
                code: ResponseCode::NOT_FOUND,
                message: "unknown resource".to_string(),
            }),
        };

        match result {
            Ok(response) => response,
            Err(rejection) => {
                warn!(
                    event = events::RD_REQUEST_REJECTED,
                    component = COMPONENT,
                    peer = %request.peer,
                    code = %rejection.code,
                    reason = rejection.message.as_str(),
                    "registration interface request rejected"
                );
                InboundResponse::with_diagnostic(rejection.code, rejection.message)
            }
        }
    }

    async fn register(&self, request: &InboundRequest) -> Result<InboundResponse, Rejection> {
        let parameters = RegistrationParameters::parse(&request.uri_query)?;
        let endpoint = parameters
            .endpoint
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| Rejection::bad_request("missing endpoint name"))?;
        let object_links = parse_links(request)?.unwrap_or_default();

        let mut registration = Registration::new(&endpoint, request.peer, Utc::now())
            .with_lifetime(parameters.lifetime_secs.unwrap_or(self.default_lifetime_secs))
            .with_binding(parameters.binding.unwrap_or_default())
            .with_sms_number(parameters.sms_number)
            .with_object_links(object_links)
            .with_additional_attributes(parameters.additional);
        if let Some(version) = parameters.lwm2m_version {
            registration = registration.with_lwm2m_version(&version);
        }
        let registration_id = registration.id.clone();

        self.lifecycle
            .register(registration)
            .await
            .map_err(store_failure)?;

        let mut response = InboundResponse::new(ResponseCode::CREATED);
        response.location_path = vec![self.root.clone(), registration_id];
        Ok(response)
    }

    async fn update(
        &self,
        request: &InboundRequest,
        registration_id: &str,
    ) -> Result<InboundResponse, Rejection> {
        let parameters = RegistrationParameters::parse(&request.uri_query)?;
        if parameters.endpoint.is_some() {
            return Err(Rejection::bad_request("endpoint name cannot be updated"));
        }

        let mut update = RegistrationUpdate::new(registration_id);
        update.address = Some(request.peer);
        update.lifetime_secs = parameters.lifetime_secs;
        update.binding = parameters.binding;
        update.sms_number = parameters.sms_number;
        update.object_links = parse_links(request)?;
        update.additional_attributes = parameters.additional;

        match self.lifecycle.update(update).await.map_err(store_failure)? {
            Some(_) => Ok(InboundResponse::new(ResponseCode::CHANGED)),
            None => Err(Rejection {
                code: ResponseCode::NOT_FOUND,
                message: format!("no registration {registration_id}"),
            }),
        }
    }

    async fn deregister(&self, registration_id: &str) -> Result<InboundResponse, Rejection> {
        match self
            .lifecycle
            .deregister(registration_id)
            .await
            .map_err(store_failure)?
        {
            Some(_) => Ok(InboundResponse::new(ResponseCode::DELETED)),
            None => Err(Rejection {
                code: ResponseCode::NOT_FOUND,
                message: format!("no registration {registration_id}"),
            }),
        }
    }
}

fn store_failure(err: StoreError) -> Rejection {
    error!(
        event = events::REGISTRATION_STORE_FAILED,
        component = COMPONENT,
        err = %err,
        "registration store failure"
    );
    Rejection {
        code: ResponseCode::INTERNAL_SERVER_ERROR,
        message: err.to_string(),
    }
}

/// Object links carried by the body, `None` when there is no body.
fn parse_links(request: &InboundRequest) -> Result<Option<Vec<Link>>, Rejection> {
    if request.payload.is_empty() {
        return Ok(None);
    }
    match request.content_format {
        None | Some(ContentFormat::LINK) => {}
        Some(other) => {
            return Err(Rejection::bad_request(format!(
                "object links must use link format, got {other}"
            )))
        }
    }
    let text = std::str::from_utf8(&request.payload)
        .map_err(|err| Rejection::bad_request(format!("object links are not UTF-8: {err}")))?;
    parse_link_format(text)
        .map(Some)
        .map_err(|err| Rejection::bad_request(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::RegistrationParameters;

    fn query(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|entry| entry.to_string()).collect()
    }

    #[test]
    fn known_parameters_are_typed_and_the_rest_is_kept() {
        let parameters = RegistrationParameters::parse(&query(&[
            "ep=dev-1",
            "lt=3600",
            "lwm2m=1.1",
            "b=UQ",
            "sms=+123",
            "vendor=acme",
            "flag",
        ]))
        .unwrap_or_else(|rejection| panic!("rejected: {}", rejection.message));

        assert_eq!(parameters.endpoint.as_deref(), Some("dev-1"));
        assert_eq!(parameters.lifetime_secs, Some(3600));
        assert_eq!(parameters.lwm2m_version.as_deref(), Some("1.1"));
        assert!(parameters.binding.expect("binding").is_queue_mode());
        assert_eq!(parameters.sms_number.as_deref(), Some("+123"));
        assert_eq!(parameters.additional.get("vendor").map(String::as_str), Some("acme"));
        assert_eq!(parameters.additional.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn malformed_lifetime_and_binding_are_rejected() {
        for bad in ["lt=abc", "lt=0", "b=X", "=value"] {
            assert!(
                RegistrationParameters::parse(&query(&[bad])).is_err(),
                "{bad} must be rejected"
            );
        }
    }
}
