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

//! # lwm2m-server-core
//!
//! `lwm2m-server-core` is the transport-agnostic core of a LWM2M server: it keeps the
//! registry of registered devices, turns typed management requests into CoAP
//! exchanges and correlates the answers, tracks observe relations and routes
//! notifications to them, and follows the awake/sleeping state of queue-mode devices.
//!
//! Sockets, DTLS and payload encodings stay outside. Applications plug them in through
//! [`transport::CoapTransport`] and [`codec::NodeCodec`], and drive everything through
//! [`Lwm2mServer`].
//!
//! ## Quick start
//!
//! ```
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use lwm2m_server_core::codec::{CodecError, ContentFormat, Lwm2mNode, NodeCodec};
//! use lwm2m_server_core::model::ObjectPath;
//! use lwm2m_server_core::transport::{
//!     CoapTransport, ExchangeHandle, ExchangeListener, TransportError,
//! };
//! use lwm2m_server_core::wire::{CoapMethod, InboundRequest, ResponseCode, Token, WireRequest};
//! use lwm2m_server_core::{Lwm2mServer, ServerConfig};
//!
//! # struct SilentTransport;
//! #
//! # #[async_trait]
//! # impl CoapTransport for SilentTransport {
//! #     async fn send(
//! #         &self,
//! #         _request: WireRequest,
//! #         _listener: Arc<dyn ExchangeListener>,
//! #     ) -> Result<ExchangeHandle, TransportError> {
//! #         Ok(ExchangeHandle::new(1))
//! #     }
//! #     async fn cancel(&self, _handle: ExchangeHandle) {}
//! #     async fn cancel_observation(
//! #         &self,
//! #         _peer: SocketAddr,
//! #         _token: &Token,
//! #     ) -> Result<(), TransportError> {
//! #         Ok(())
//! #     }
//! # }
//! #
//! # struct NoCodec;
//! #
//! # impl NodeCodec for NoCodec {
//! #     fn supports(&self, _format: ContentFormat) -> bool { false }
//! #     fn encode(&self, _node: &Lwm2mNode, _path: &ObjectPath, format: ContentFormat)
//! #         -> Result<Vec<u8>, CodecError> {
//! #         Err(CodecError::UnsupportedFormat(format))
//! #     }
//! #     fn decode(&self, _payload: &[u8], _path: &ObjectPath, format: ContentFormat)
//! #         -> Result<Lwm2mNode, CodecError> {
//! #         Err(CodecError::UnsupportedFormat(format))
//! #     }
//! # }
//! #
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let server = Lwm2mServer::new(
//!     ServerConfig::default(),
//!     Arc::new(SilentTransport),
//!     Arc::new(NoCodec),
//! )
//! .unwrap();
//!
//! let response = server
//!     .handle_registration_request(InboundRequest {
//!         peer: "192.0.2.10:5683".parse().unwrap(),
//!         method: CoapMethod::Post,
//!         confirmable: true,
//!         uri_path: vec!["rd".to_string()],
//!         uri_query: vec!["ep=dev-1".to_string(), "lt=3600".to_string(), "b=UQ".to_string()],
//!         content_format: None,
//!         payload: b"</1/0>,</3/0>".to_vec(),
//!     })
//!     .await;
//!
//! assert_eq!(response.code, ResponseCode::CREATED);
//! assert_eq!(response.location_path[0], "rd");
//!
//! let registration = server
//!     .get_registration_by_endpoint("dev-1")
//!     .await
//!     .unwrap()
//!     .unwrap();
//! assert!(registration.uses_queue_mode());
//! assert_eq!(registration.lifetime_secs, 3600);
//! # });
//! ```
//!
//! ## Layers
//!
//! - [`control_plane`] owns registrations: storage, the `/rd` interface and cleanup.
//! - [`data_plane`] owns downlink requests: translation, dispatch and timeouts.
//! - [`observe`] owns observe relations and inbound notifications.
//! - [`presence`] owns queue-mode awake/sleeping state.

pub mod codec;
pub mod config;
pub mod control_plane;
pub mod data_plane;
pub mod error;
pub mod listeners;
pub mod model;
#[doc(hidden)]
pub mod observability;
pub mod observe;
pub mod presence;
mod runtime;
mod server;
pub mod transport;
pub mod wire;

pub use config::ServerConfig;
pub use error::{SendError, StoreError};
pub use server::Lwm2mServer;
