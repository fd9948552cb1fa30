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

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum BindingTransport {
    Udp,
    Tcp,
    Sms,
    NonIp,
}

impl BindingTransport {
    fn letter(&self) -> char {
        match self {
            BindingTransport::Udp => 'U',
            BindingTransport::Tcp => 'T',
            BindingTransport::Sms => 'S',
            BindingTransport::NonIp => 'N',
        }
    }
}

/// Delivery semantics announced by the device with the `b` parameter.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct BindingMode {
    transports: Vec<BindingTransport>,
    queue_mode: bool,
}

impl BindingMode {
    pub fn new(transports: Vec<BindingTransport>, queue_mode: bool) -> Self {
        let mut transports = transports;
        transports.dedup();
        Self {
            transports,
            queue_mode,
        }
    }

    pub fn udp() -> Self {
        Self::new(vec![BindingTransport::Udp], false)
    }

    pub fn udp_queue() -> Self {
        Self::new(vec![BindingTransport::Udp], true)
    }

    pub fn transports(&self) -> &[BindingTransport] {
        &self.transports
    }

    /// `true` when the device sleeps between contacts and must be reached while awake.
    pub fn is_queue_mode(&self) -> bool {
        self.queue_mode
    }
}

impl Default for BindingMode {
    fn default() -> Self {
        Self::udp()
    }
}

impl Display for BindingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for transport in &self.transports {
            write!(f, "{}", transport.letter())?;
        }
        if self.queue_mode {
            write!(f, "Q")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BindingParseError(String);

impl Display for BindingParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid binding mode '{}'", self.0)
    }
}

impl Error for BindingParseError {}

impl FromStr for BindingMode {
    type Err = BindingParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut transports = Vec::new();
        let mut queue_mode = false;

        for letter in input.chars() {
            let transport = match letter {
                'U' => BindingTransport::Udp,
                'T' => BindingTransport::Tcp,
                'S' => BindingTransport::Sms,
                'N' => BindingTransport::NonIp,
                'Q' if !queue_mode => {
                    queue_mode = true;
                    continue;
                }
                _ => return Err(BindingParseError(input.to_string())),
            };
            if transports.contains(&transport) {
                return Err(BindingParseError(input.to_string()));
            }
            transports.push(transport);
        }

        if transports.is_empty() {
            return Err(BindingParseError(input.to_string()));
        }
        Ok(BindingMode::new(transports, queue_mode))
    }
}
