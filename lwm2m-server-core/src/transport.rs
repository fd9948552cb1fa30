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

//! Transport collaborator boundary.
//!
//! The core never touches sockets, DTLS sessions or retransmission timers. It hands a
//! [`WireRequest`] to a [`CoapTransport`] together with an [`ExchangeListener`] and is
//! called back exactly once per exchange with the terminal event.
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use lwm2m_server_core::transport::{
//!     CoapTransport, ExchangeHandle, ExchangeListener, TransportError,
//! };
//! use lwm2m_server_core::wire::{Token, WireRequest};
//! use std::net::SocketAddr;
//!
//! struct DiscardingTransport;
//!
//! #[async_trait]
//! impl CoapTransport for DiscardingTransport {
//!     async fn send(
//!         &self,
//!         request: WireRequest,
//!         _listener: Arc<dyn ExchangeListener>,
//!     ) -> Result<ExchangeHandle, TransportError> {
//!         Ok(ExchangeHandle::new(request.token.as_bytes().len() as u64))
//!     }
//!
//!     async fn cancel(&self, _handle: ExchangeHandle) {}
//!
//!     async fn cancel_observation(
//!         &self,
//!         _peer: SocketAddr,
//!         _token: &Token,
//!     ) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! let _transport: Arc<dyn CoapTransport> = Arc::new(DiscardingTransport);
//! ```

use crate::wire::{Token, WireRequest, WireResponse};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

/// Transport-assigned identifier of one in-flight exchange, used to stop retransmission.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ExchangeHandle(u64);

impl ExchangeHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Terminal non-response outcome of an exchange as reported by the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExchangeFailure {
    /// Retransmissions were exhausted without an answer.
    Timeout,
    /// The exchange was cancelled at the transport level.
    Cancelled,
    /// The device answered with a reset message.
    Rejected,
    /// The message could not be delivered (socket or security layer failure).
    SendFailed(String),
}

impl Display for ExchangeFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeFailure::Timeout => write!(f, "exchange timed out"),
            ExchangeFailure::Cancelled => write!(f, "exchange cancelled"),
            ExchangeFailure::Rejected => write!(f, "exchange rejected by peer"),
            ExchangeFailure::SendFailed(reason) => write!(f, "unable to send: {reason}"),
        }
    }
}

/// Failure returned synchronously by transport operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportError {
    /// No secure session or route to the peer exists.
    Unreachable(SocketAddr),
    /// Any other transport fault.
    Internal(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unreachable(peer) => write!(f, "peer {peer} is unreachable"),
            TransportError::Internal(reason) => write!(f, "transport failure: {reason}"),
        }
    }
}

impl Error for TransportError {}

/// Receives the terminal event of one exchange.
///
/// Transports call exactly one of the two methods; the core tolerates duplicate or late
/// calls and discards them.
#[async_trait]
pub trait ExchangeListener: Send + Sync {
    async fn on_response(&self, response: WireResponse);

    async fn on_failure(&self, failure: ExchangeFailure);
}

/// Outbound half of the wire transport.
#[async_trait]
pub trait CoapTransport: Send + Sync {
    /// Sends a request and reports its terminal event to `listener`.
    async fn send(
        &self,
        request: WireRequest,
        listener: Arc<dyn ExchangeListener>,
    ) -> Result<ExchangeHandle, TransportError>;

    /// Stops retransmission of an exchange. Cancelling a finished exchange is a no-op.
    async fn cancel(&self, handle: ExchangeHandle);

    /// Best-effort device-side cancellation of an observe relation.
    ///
    /// Implementations either send a proactive deregistration or answer the next
    /// notification carrying `token` with a reset.
    async fn cancel_observation(&self, peer: SocketAddr, token: &Token)
        -> Result<(), TransportError>;
}
