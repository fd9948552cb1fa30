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

//! Mapping between abstract requests and wire messages, one case per operation.

use crate::codec::{CodecError, ContentFormat, Lwm2mNode, NodeCodec};
use crate::data_plane::downlink::{
    DownlinkRequest, Lwm2mResponse, OperationKind, ResponseContent, WriteMode,
};
use crate::model::link::parse_link_format;
use crate::model::{ObjectPath, Observation, Registration, CONTEXT_CONTENT_FORMAT, CONTEXT_ENDPOINT};
use crate::error::StoreError;
use crate::observe::{AddedObservation, ObservationStore};
use crate::wire::{CoapMethod, ResponseCode, Token, WireRequest, WireResponse, OBSERVE_REGISTER};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const BOOTSTRAP_FINISH_PATH: &str = "bs";

const COMMON_ERRORS: &[ResponseCode] = &[
    ResponseCode::BAD_REQUEST,
    ResponseCode::UNAUTHORIZED,
    ResponseCode::NOT_FOUND,
    ResponseCode::METHOD_NOT_ALLOWED,
    ResponseCode::INTERNAL_SERVER_ERROR,
];
const READ_ERRORS: &[ResponseCode] = &[
    ResponseCode::BAD_REQUEST,
    ResponseCode::UNAUTHORIZED,
    ResponseCode::NOT_FOUND,
    ResponseCode::METHOD_NOT_ALLOWED,
    ResponseCode::NOT_ACCEPTABLE,
    ResponseCode::INTERNAL_SERVER_ERROR,
];
const WRITE_ERRORS: &[ResponseCode] = &[
    ResponseCode::BAD_REQUEST,
    ResponseCode::UNAUTHORIZED,
    ResponseCode::NOT_FOUND,
    ResponseCode::METHOD_NOT_ALLOWED,
    ResponseCode::REQUEST_ENTITY_TOO_LARGE,
    ResponseCode::UNSUPPORTED_CONTENT_FORMAT,
    ResponseCode::INTERNAL_SERVER_ERROR,
];
const CREATE_ERRORS: &[ResponseCode] = &[
    ResponseCode::BAD_REQUEST,
    ResponseCode::UNAUTHORIZED,
    ResponseCode::NOT_FOUND,
    ResponseCode::METHOD_NOT_ALLOWED,
    ResponseCode::UNSUPPORTED_CONTENT_FORMAT,
    ResponseCode::INTERNAL_SERVER_ERROR,
];
const BOOTSTRAP_WRITE_ERRORS: &[ResponseCode] = &[
    ResponseCode::BAD_REQUEST,
    ResponseCode::UNSUPPORTED_CONTENT_FORMAT,
    ResponseCode::INTERNAL_SERVER_ERROR,
];
const BOOTSTRAP_DELETE_ERRORS: &[ResponseCode] =
    &[ResponseCode::BAD_REQUEST, ResponseCode::INTERNAL_SERVER_ERROR];
const BOOTSTRAP_FINISH_ERRORS: &[ResponseCode] = &[
    ResponseCode::BAD_REQUEST,
    ResponseCode::NOT_ACCEPTABLE,
    ResponseCode::INTERNAL_SERVER_ERROR,
];

/// Success code and allowed error codes of an operation.
pub fn expected_codes(operation: OperationKind) -> (ResponseCode, &'static [ResponseCode]) {
    match operation {
        OperationKind::Read | OperationKind::Observe => (ResponseCode::CONTENT, READ_ERRORS),
        OperationKind::Discover => (ResponseCode::CONTENT, COMMON_ERRORS),
        OperationKind::Write => (ResponseCode::CHANGED, WRITE_ERRORS),
        OperationKind::WriteAttributes | OperationKind::Execute => {
            (ResponseCode::CHANGED, COMMON_ERRORS)
        }
        OperationKind::Create => (ResponseCode::CREATED, CREATE_ERRORS),
        OperationKind::Delete => (ResponseCode::DELETED, COMMON_ERRORS),
        OperationKind::BootstrapWrite => (ResponseCode::CHANGED, BOOTSTRAP_WRITE_ERRORS),
        OperationKind::BootstrapDelete => (ResponseCode::DELETED, BOOTSTRAP_DELETE_ERRORS),
        OperationKind::BootstrapFinish => (ResponseCode::CHANGED, BOOTSTRAP_FINISH_ERRORS),
    }
}

#[derive(Debug)]
pub enum TranslationError {
    /// The request cannot be expressed on the wire (wrong path level, empty body).
    InvalidRequest {
        operation: OperationKind,
        reason: String,
    },
    Encoding {
        operation: OperationKind,
        source: CodecError,
    },
    /// The response body could not be decoded.
    Decoding {
        operation: OperationKind,
        path: Option<ObjectPath>,
        source: CodecError,
    },
    /// The response code is neither the success code nor an allowed error code.
    UnexpectedResponse {
        operation: OperationKind,
        path: Option<ObjectPath>,
        code: ResponseCode,
    },
    /// The registration was removed before its observe answer could be recorded.
    RegistrationGone { registration_id: String },
    /// The registration store failed while an observe answer was recorded.
    Store(StoreError),
}

impl TranslationError {
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            TranslationError::Decoding { .. } | TranslationError::UnexpectedResponse { .. }
        )
    }

    fn invalid(operation: OperationKind, reason: impl Into<String>) -> Self {
        TranslationError::InvalidRequest {
            operation,
            reason: reason.into(),
        }
    }
}

fn format_path(path: &Option<ObjectPath>) -> String {
    path.map(|path| path.to_string())
        .unwrap_or_else(|| "/".to_string())
}

impl Display for TranslationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationError::InvalidRequest { operation, reason } => {
                write!(f, "invalid {operation} request: {reason}")
            }
            TranslationError::Encoding { operation, source } => {
                write!(f, "unable to encode {operation} request: {source}")
            }
            TranslationError::Decoding {
                operation,
                path,
                source,
            } => write!(
                f,
                "unable to decode {operation} response for {}: {source}",
                format_path(path)
            ),
            TranslationError::UnexpectedResponse {
                operation,
                path,
                code,
            } => write!(
                f,
                "unexpected response code {code} for {operation} on {}",
                format_path(path)
            ),
            TranslationError::RegistrationGone { registration_id } => write!(
                f,
                "registration {registration_id} removed before its observation was stored"
            ),
            TranslationError::Store(err) => write!(f, "unable to store observation: {err}"),
        }
    }
}

impl Error for TranslationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TranslationError::Encoding { source, .. } | TranslationError::Decoding { source, .. } => {
                Some(source)
            }
            TranslationError::Store(err) => Some(err),
            _ => None,
        }
    }
}

/// Stateless request/response mapper.
///
/// The observation store is only touched by successful Observe responses, which is
/// where every observation is born.
#[derive(Clone)]
pub struct ProtocolTranslator {
    codec: Arc<dyn NodeCodec>,
    observations: Arc<ObservationStore>,
}

impl ProtocolTranslator {
    pub fn new(codec: Arc<dyn NodeCodec>, observations: Arc<ObservationStore>) -> Self {
        Self {
            codec,
            observations,
        }
    }

    /// Builds the wire request for `request` addressed at `registration`'s device.
    pub fn to_wire(
        &self,
        request: &DownlinkRequest,
        registration: &Registration,
        token: Token,
    ) -> Result<WireRequest, TranslationError> {
        let operation = request.kind();
        validate_path(request)?;

        let method = match request {
            DownlinkRequest::Read { .. }
            | DownlinkRequest::Discover { .. }
            | DownlinkRequest::Observe { .. } => CoapMethod::Get,
            DownlinkRequest::Write {
                mode: WriteMode::Replace,
                ..
            }
            | DownlinkRequest::WriteAttributes { .. }
            | DownlinkRequest::BootstrapWrite { .. } => CoapMethod::Put,
            DownlinkRequest::Write {
                mode: WriteMode::Update,
                ..
            }
            | DownlinkRequest::Execute { .. }
            | DownlinkRequest::Create { .. }
            | DownlinkRequest::BootstrapFinish => CoapMethod::Post,
            DownlinkRequest::Delete { .. } | DownlinkRequest::BootstrapDelete { .. } => {
                CoapMethod::Delete
            }
        };

        let mut wire = WireRequest::new(registration.address, method, token);
        wire.uri_path = match request {
            DownlinkRequest::BootstrapWrite { path, .. }
            | DownlinkRequest::BootstrapDelete { path } => uri_segments("/", path),
            DownlinkRequest::BootstrapFinish => vec![BOOTSTRAP_FINISH_PATH.to_string()],
            _ => match request.path() {
                Some(path) => uri_segments(&registration.root_path, path),
                None => Vec::new(),
            },
        };

        match request {
            DownlinkRequest::Read { format, .. } => {
                wire.accept = *format;
            }
            DownlinkRequest::Observe { format, .. } => {
                wire.accept = *format;
                wire.observe = Some(OBSERVE_REGISTER);
            }
            DownlinkRequest::Discover { .. } => {
                wire.accept = Some(ContentFormat::LINK);
            }
            DownlinkRequest::Write {
                path, format, node, ..
            }
            | DownlinkRequest::BootstrapWrite { path, format, node } => {
                wire.content_format = Some(*format);
                wire.payload = self.encode(operation, node, path, *format)?;
            }
            DownlinkRequest::WriteAttributes { attributes, .. } => {
                if attributes.is_empty() {
                    return Err(TranslationError::invalid(operation, "no attributes to write"));
                }
                wire.uri_query = attributes.to_query();
            }
            DownlinkRequest::Execute { arguments, .. } => {
                if let Some(arguments) = arguments {
                    wire.content_format = Some(ContentFormat::TEXT);
                    wire.payload = arguments.as_bytes().to_vec();
                }
            }
            DownlinkRequest::Create {
                path,
                format,
                instances,
            } => {
                let node = match instances.as_slice() {
                    [] => {
                        return Err(TranslationError::invalid(
                            operation,
                            "at least one object instance is required",
                        ))
                    }
                    [instance] => Lwm2mNode::ObjectInstance(instance.clone()),
                    _ => {
                        let mut by_id = BTreeMap::new();
                        for instance in instances {
                            let id = instance.id.ok_or_else(|| {
                                TranslationError::invalid(
                                    operation,
                                    "instance ids are required when creating several instances",
                                )
                            })?;
                            by_id.insert(id, instance.clone());
                        }
                        Lwm2mNode::Object {
                            id: path.object_id().unwrap_or_default(),
                            instances: by_id,
                        }
                    }
                };
                wire.content_format = Some(*format);
                wire.payload = self.encode(operation, &node, path, *format)?;
            }
            DownlinkRequest::Delete { .. }
            | DownlinkRequest::BootstrapDelete { .. }
            | DownlinkRequest::BootstrapFinish => {}
        }

        Ok(wire)
    }

    /// Maps the device's answer to `request` onto an [`Lwm2mResponse`].
    ///
    /// A successful Observe answer carrying an observe option stores the new observation
    /// before returning.
    pub async fn to_response(
        &self,
        request: &DownlinkRequest,
        registration: &Registration,
        response: WireResponse,
    ) -> Result<Lwm2mResponse, TranslationError> {
        let operation = request.kind();
        let path = request.path().copied();
        let (success, errors) = expected_codes(operation);

        if response.code != success {
            if errors.contains(&response.code) {
                return Ok(Lwm2mResponse {
                    operation,
                    code: response.code,
                    content: ResponseContent::Empty,
                    error_message: response.diagnostic_payload(),
                });
            }
            return Err(TranslationError::UnexpectedResponse {
                operation,
                path,
                code: response.code,
            });
        }

        let content = match request {
            DownlinkRequest::Read { path, format } => {
                let (node, _) = self.decode(operation, &response, path, *format)?;
                ResponseContent::Node(node)
            }
            DownlinkRequest::Observe { path, format } => {
                let (node, used_format) = self.decode(operation, &response, path, *format)?;
                let observation = match response.observe {
                    Some(counter) => {
                        let observation =
                            Observation::new(response.token.clone(), &registration.id, *path)
                                .with_context(CONTEXT_CONTENT_FORMAT, used_format.code().to_string())
                                .with_context(CONTEXT_ENDPOINT, registration.endpoint.as_str());
                        let added = self
                            .observations
                            .add_observation(
                                observation.clone(),
                                registration.address,
                                Some(counter),
                            )
                            .await
                            .map_err(TranslationError::Store)?;
                        if added == AddedObservation::RegistrationGone {
                            return Err(TranslationError::RegistrationGone {
                                registration_id: registration.id.clone(),
                            });
                        }
                        Some(observation)
                    }
                    None => None,
                };
                ResponseContent::Observed { node, observation }
            }
            DownlinkRequest::Discover { path } => {
                let text = std::str::from_utf8(&response.payload).map_err(|err| {
                    TranslationError::Decoding {
                        operation,
                        path: Some(*path),
                        source: CodecError::Invalid(err.to_string()),
                    }
                })?;
                let links =
                    parse_link_format(text).map_err(|err| TranslationError::Decoding {
                        operation,
                        path: Some(*path),
                        source: CodecError::Invalid(err.to_string()),
                    })?;
                ResponseContent::Links(links)
            }
            DownlinkRequest::Create {
                path, instances, ..
            } => {
                if !response.location_path.is_empty() {
                    ResponseContent::Location(format!("/{}", response.location_path.join("/")))
                } else {
                    match (instances.as_slice(), path.object_id()) {
                        ([instance], Some(object_id)) => match instance.id {
                            Some(instance_id) => ResponseContent::Location(
                                ObjectPath::instance(object_id, instance_id).to_string(),
                            ),
                            None => ResponseContent::Empty,
                        },
                        _ => ResponseContent::Empty,
                    }
                }
            }
            _ => ResponseContent::Empty,
        };

        Ok(Lwm2mResponse {
            operation,
            code: response.code,
            content,
            error_message: None,
        })
    }

    fn encode(
        &self,
        operation: OperationKind,
        node: &Lwm2mNode,
        path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Vec<u8>, TranslationError> {
        self.codec
            .encode(node, path, format)
            .map_err(|source| TranslationError::Encoding { operation, source })
    }

    /// Decodes a content response, preferring the response's content format over the
    /// requested one.
    fn decode(
        &self,
        operation: OperationKind,
        response: &WireResponse,
        path: &ObjectPath,
        requested: Option<ContentFormat>,
    ) -> Result<(Lwm2mNode, ContentFormat), TranslationError> {
        let decoding_error = |source| TranslationError::Decoding {
            operation,
            path: Some(*path),
            source,
        };
        let format = response
            .content_format
            .or(requested)
            .ok_or_else(|| decoding_error(CodecError::Invalid("missing content format".to_string())))?;
        if response.payload.is_empty() {
            return Err(decoding_error(CodecError::Invalid(
                "empty payload".to_string(),
            )));
        }
        let node = self
            .codec
            .decode(&response.payload, path, format)
            .map_err(decoding_error)?;
        Ok((node, format))
    }
}

fn uri_segments(root_path: &str, path: &ObjectPath) -> Vec<String> {
    root_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .chain(path.to_segments())
        .collect()
}

fn validate_path(request: &DownlinkRequest) -> Result<(), TranslationError> {
    let operation = request.kind();
    let Some(path) = request.path() else {
        return Ok(());
    };

    let valid = match request {
        DownlinkRequest::Read { .. }
        | DownlinkRequest::Discover { .. }
        | DownlinkRequest::Observe { .. }
        | DownlinkRequest::WriteAttributes { .. }
        | DownlinkRequest::BootstrapWrite { .. } => !path.is_root(),
        DownlinkRequest::Write { .. } => {
            path.is_object_instance() || path.is_resource() || path.is_resource_instance()
        }
        DownlinkRequest::Execute { .. } => path.is_resource(),
        DownlinkRequest::Create { .. } => path.is_object(),
        DownlinkRequest::Delete { .. } => path.is_object_instance(),
        DownlinkRequest::BootstrapDelete { .. } | DownlinkRequest::BootstrapFinish => true,
    };

    if valid {
        Ok(())
    } else {
        Err(TranslationError::invalid(
            operation,
            format!("path {path} is not valid for this operation"),
        ))
    }
}
