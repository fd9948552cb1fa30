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

//! Error kinds surfaced by the registration store and the request dispatcher.

use crate::data_plane::translator::TranslationError;
use crate::transport::{ExchangeFailure, TransportError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-layer fault. "No such registration" is never a `StoreError`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreError {
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(reason) => {
                write!(f, "registration store unavailable: {reason}")
            }
        }
    }
}

impl Error for StoreError {}

/// Terminal failure of one downlink request.
///
/// A request that simply received no answer in time is not an error for the awaiting
/// API (it resolves to `Ok(None)`); only the callback API reports it as [`SendError::TimedOut`].
#[derive(Debug)]
pub enum SendError {
    /// The device is in queue mode and currently sleeping. No transport attempt was made.
    Unreachable { registration_id: String },
    /// The registration was removed before or while the request was sent.
    UnknownRegistration(String),
    /// The request was cancelled by deregistration or a presence downgrade.
    Cancelled,
    /// No response arrived before the deadline.
    TimedOut,
    /// The request could not be encoded or the response violated the protocol.
    Translation(TranslationError),
    /// The transport refused the request.
    Transport(TransportError),
    /// The transport reported a terminal exchange failure other than timeout/cancel.
    Exchange(ExchangeFailure),
    Store(StoreError),
}

impl SendError {
    /// True for a response code outside the operation's success and error sets or an
    /// undecodable payload.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, SendError::Translation(err) if err.is_protocol_violation())
    }
}

impl Display for SendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Unreachable { registration_id } => {
                write!(f, "device of registration {registration_id} is sleeping")
            }
            SendError::UnknownRegistration(registration_id) => {
                write!(f, "registration {registration_id} is not registered")
            }
            SendError::Cancelled => write!(f, "request cancelled"),
            SendError::TimedOut => write!(f, "request timed out"),
            SendError::Translation(err) => write!(f, "{err}"),
            SendError::Transport(err) => write!(f, "unable to send request: {err}"),
            SendError::Exchange(failure) => write!(f, "request failed: {failure}"),
            SendError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SendError::Translation(err) => Some(err),
            SendError::Transport(err) => Some(err),
            SendError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TranslationError> for SendError {
    fn from(err: TranslationError) -> Self {
        SendError::Translation(err)
    }
}

impl From<TransportError> for SendError {
    fn from(err: TransportError) -> Self {
        SendError::Transport(err)
    }
}

impl From<StoreError> for SendError {
    fn from(err: StoreError) -> Self {
        SendError::Store(err)
    }
}
