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

use lwm2m_server_core::codec::{CodecError, ContentFormat, Lwm2mNode, NodeCodec, TimestampedNode};
use lwm2m_server_core::model::ObjectPath;

/// Test codec serializing nodes with `serde_json`.
///
/// `JSON` carries one [`Lwm2mNode`]; `SENML_JSON` carries a list of
/// [`TimestampedNode`] samples.
pub struct JsonTestCodec;

impl JsonTestCodec {
    pub fn encode_samples(samples: &[TimestampedNode]) -> Vec<u8> {
        serde_json::to_vec(samples).expect("samples serialize")
    }

    pub fn encode_node(node: &Lwm2mNode) -> Vec<u8> {
        serde_json::to_vec(node).expect("node serializes")
    }
}

impl NodeCodec for JsonTestCodec {
    fn supports(&self, format: ContentFormat) -> bool {
        format == ContentFormat::JSON || format == ContentFormat::SENML_JSON
    }

    fn encode(
        &self,
        node: &Lwm2mNode,
        _path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Vec<u8>, CodecError> {
        if format == ContentFormat::SENML_JSON {
            return serde_json::to_vec(&[TimestampedNode::untimestamped(node.clone())])
                .map_err(|err| CodecError::Invalid(err.to_string()));
        }
        if format != ContentFormat::JSON {
            return Err(CodecError::UnsupportedFormat(format));
        }
        serde_json::to_vec(node).map_err(|err| CodecError::Invalid(err.to_string()))
    }

    fn decode(
        &self,
        payload: &[u8],
        path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Lwm2mNode, CodecError> {
        if format == ContentFormat::SENML_JSON {
            return self
                .decode_timestamped(payload, path, format)?
                .into_iter()
                .next()
                .map(|sample| sample.node)
                .ok_or_else(|| CodecError::Invalid("no samples".to_string()));
        }
        if format != ContentFormat::JSON {
            return Err(CodecError::UnsupportedFormat(format));
        }
        serde_json::from_slice(payload).map_err(|err| CodecError::Invalid(err.to_string()))
    }

    fn decode_timestamped(
        &self,
        payload: &[u8],
        path: &ObjectPath,
        format: ContentFormat,
    ) -> Result<Vec<TimestampedNode>, CodecError> {
        if format == ContentFormat::SENML_JSON {
            return serde_json::from_slice(payload)
                .map_err(|err| CodecError::Invalid(err.to_string()));
        }
        self.decode(payload, path, format)
            .map(|node| vec![TimestampedNode::untimestamped(node)])
    }
}
