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

use async_trait::async_trait;
use lwm2m_server_core::codec::ContentFormat;
use lwm2m_server_core::transport::{
    CoapTransport, ExchangeFailure, ExchangeHandle, ExchangeListener, TransportError,
};
use lwm2m_server_core::wire::{ResponseCode, Token, WireRequest, WireResponse};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// How the simulated device reacts to one request.
#[derive(Clone, Debug)]
pub enum DeviceReply {
    /// Answers with a response carrying the request token.
    Respond(ReplyTemplate),
    /// Never answers; the exchange stays open until cancelled.
    Silent,
    /// The transport reports a terminal failure for the exchange.
    Fail(ExchangeFailure),
    /// The transport refuses the request before sending it.
    Refuse(TransportError),
}

/// Response shape the transport fills in with the request token.
#[derive(Clone, Debug)]
pub struct ReplyTemplate {
    pub code: ResponseCode,
    pub content_format: Option<ContentFormat>,
    pub payload: Vec<u8>,
    pub observe: Option<u32>,
    pub location_path: Vec<String>,
    pub delay: Duration,
}

impl ReplyTemplate {
    pub fn code(code: ResponseCode) -> Self {
        Self {
            code,
            content_format: None,
            payload: Vec::new(),
            observe: None,
            location_path: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn content(content_format: ContentFormat, payload: impl Into<Vec<u8>>) -> Self {
        let mut template = Self::code(ResponseCode::CONTENT);
        template.content_format = Some(content_format);
        template.payload = payload.into();
        template
    }

    pub fn with_observe(mut self, observe: u32) -> Self {
        self.observe = Some(observe);
        self
    }

    pub fn with_location(mut self, location_path: &[&str]) -> Self {
        self.location_path = location_path.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn build(&self, token: Token) -> WireResponse {
        let mut response = WireResponse::new(self.code, token);
        response.content_format = self.content_format;
        response.payload = self.payload.clone();
        response.observe = self.observe;
        response.location_path = self.location_path.clone();
        response
    }
}

/// Records of everything the core asked the transport to do.
#[derive(Clone, Debug, Default)]
pub struct TransportHistory {
    pub sent: Vec<WireRequest>,
    pub cancelled_exchanges: Vec<ExchangeHandle>,
    pub cancelled_observations: Vec<(SocketAddr, Token)>,
}

/// In-memory [`CoapTransport`] simulating devices with scripted replies.
///
/// Replies are consumed in order; once the script is exhausted the default reply is used.
pub struct MockDeviceTransport {
    script: Mutex<VecDeque<DeviceReply>>,
    default_reply: Mutex<DeviceReply>,
    next_handle: AtomicU64,
    history: Mutex<TransportHistory>,
    listeners: Mutex<Vec<(ExchangeHandle, Arc<dyn ExchangeListener>)>>,
}

impl MockDeviceTransport {
    pub fn new(default_reply: DeviceReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new(default_reply),
            next_handle: AtomicU64::new(1),
            history: Mutex::new(TransportHistory::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// A transport whose device never answers.
    pub fn silent() -> Self {
        Self::new(DeviceReply::Silent)
    }

    pub fn push_reply(&self, reply: DeviceReply) {
        self.script.lock().expect("script lock").push_back(reply);
    }

    pub fn set_default_reply(&self, reply: DeviceReply) {
        *self.default_reply.lock().expect("default reply lock") = reply;
    }

    pub fn history(&self) -> TransportHistory {
        self.history.lock().expect("history lock").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.history.lock().expect("history lock").sent.len()
    }

    pub fn last_sent(&self) -> Option<WireRequest> {
        self.history.lock().expect("history lock").sent.last().cloned()
    }

    /// Delivers a late response to an exchange, as a device answering after a timeout would.
    pub async fn deliver_late_response(&self, handle: ExchangeHandle, response: WireResponse) {
        let listener = self
            .listeners
            .lock()
            .expect("listeners lock")
            .iter()
            .find(|(candidate, _)| *candidate == handle)
            .map(|(_, listener)| listener.clone());
        if let Some(listener) = listener {
            listener.on_response(response).await;
        }
    }

    fn next_reply(&self) -> DeviceReply {
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| self.default_reply.lock().expect("default reply lock").clone())
    }
}

#[async_trait]
impl CoapTransport for MockDeviceTransport {
    async fn send(
        &self,
        request: WireRequest,
        listener: Arc<dyn ExchangeListener>,
    ) -> Result<ExchangeHandle, TransportError> {
        let reply = self.next_reply();
        if let DeviceReply::Refuse(err) = reply {
            return Err(err);
        }

        let handle = ExchangeHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let token = request.token.clone();
        debug!(
            handle = handle.id(),
            target = request.path_string().as_str(),
            method = %request.method,
            "mock transport sending request"
        );
        self.history.lock().expect("history lock").sent.push(request);
        self.listeners
            .lock()
            .expect("listeners lock")
            .push((handle, listener.clone()));

        match reply {
            DeviceReply::Respond(template) => {
                tokio::spawn(async move {
                    if !template.delay.is_zero() {
                        tokio::time::sleep(template.delay).await;
                    }
                    listener.on_response(template.build(token)).await;
                });
            }
            DeviceReply::Fail(failure) => {
                tokio::spawn(async move { listener.on_failure(failure).await });
            }
            DeviceReply::Silent | DeviceReply::Refuse(_) => {}
        }
        Ok(handle)
    }

    async fn cancel(&self, handle: ExchangeHandle) {
        self.history
            .lock()
            .expect("history lock")
            .cancelled_exchanges
            .push(handle);
    }

    async fn cancel_observation(
        &self,
        peer: SocketAddr,
        token: &Token,
    ) -> Result<(), TransportError> {
        self.history
            .lock()
            .expect("history lock")
            .cancelled_observations
            .push((peer, token.clone()));
        Ok(())
    }
}
