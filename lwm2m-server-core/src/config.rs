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

//! Server tuning knobs, loadable from a JSON5 document.

use crate::model::DEFAULT_LIFETIME_SECS;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
/// CoAP `MAX_TRANSMIT_WAIT` for the default transmission parameters.
pub const DEFAULT_AWAKE_WINDOW_MS: u64 = 93_000;
pub const DEFAULT_EXPIRATION_GRACE_SECS: u64 = 0;
pub const DEFAULT_EXPIRATION_SWEEP_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_REGISTRATION_ROOT_PATH: &str = "rd";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub request_timeout_ms: u64,
    pub awake_window_ms: u64,
    pub expiration_grace_secs: u64,
    pub expiration_sweep_interval_secs: u64,
    pub default_lifetime_secs: u64,
    pub registration_root_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            awake_window_ms: DEFAULT_AWAKE_WINDOW_MS,
            expiration_grace_secs: DEFAULT_EXPIRATION_GRACE_SECS,
            expiration_sweep_interval_secs: DEFAULT_EXPIRATION_SWEEP_INTERVAL_SECS,
            default_lifetime_secs: DEFAULT_LIFETIME_SECS,
            registration_root_path: DEFAULT_REGISTRATION_ROOT_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_json5_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = json5::from_str(contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json5_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json5_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.awake_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "awake_window_ms must be greater than zero".to_string(),
            ));
        }
        if self.expiration_sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "expiration_sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_lifetime_secs == 0 {
            return Err(ConfigError::Invalid(
                "default_lifetime_secs must be greater than zero".to_string(),
            ));
        }
        let root = self.registration_root_path.trim_matches('/');
        if root.is_empty() || root.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "registration_root_path must be a single path segment, got {:?}",
                self.registration_root_path
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn awake_window(&self) -> Duration {
        Duration::from_millis(self.awake_window_ms)
    }

    pub fn expiration_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiration_sweep_interval_secs)
    }

    /// Root segment of the registration interface without slashes.
    pub fn registration_root(&self) -> &str {
        self.registration_root_path.trim_matches('/')
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(json5::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "unable to read config file {}: {source}", path.display())
            }
            ConfigError::Parse(err) => write!(f, "unable to parse config: {err}"),
            ConfigError::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}
