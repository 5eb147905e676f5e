// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Marker names and the marker payload format.
//!
//! Mutable side effect and version markers carry a keyed payload:
//! - 2 bytes: id length (big-endian)
//! - N bytes: id (UTF-8)
//! - 4 bytes: data length (big-endian)
//! - M bytes: data
//!
//! Plain side effect markers carry the recorded bytes as-is. Local activity
//! markers carry a JSON encoded [`LocalActivityMarkerData`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SIDE_EFFECT_MARKER_NAME: &str = "SideEffect";
pub const MUTABLE_SIDE_EFFECT_MARKER_NAME: &str = "MutableSideEffect";
pub const VERSION_MARKER_NAME: &str = "Version";
pub const LOCAL_ACTIVITY_MARKER_NAME: &str = "LocalActivity";

/// Version returned for a change id that has no version marker in history.
pub const DEFAULT_VERSION: i32 = -1;

/// Largest id the 2 byte length prefix can describe.
pub const MAX_MARKER_ID_LEN: usize = u16::MAX as usize;

/// Marker names the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerName {
    SideEffect,
    MutableSideEffect,
    Version,
    LocalActivity,
}

impl MarkerName {
    /// Returns `None` for names outside the known vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            SIDE_EFFECT_MARKER_NAME => Some(MarkerName::SideEffect),
            MUTABLE_SIDE_EFFECT_MARKER_NAME => Some(MarkerName::MutableSideEffect),
            VERSION_MARKER_NAME => Some(MarkerName::Version),
            LOCAL_ACTIVITY_MARKER_NAME => Some(MarkerName::LocalActivity),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerName::SideEffect => SIDE_EFFECT_MARKER_NAME,
            MarkerName::MutableSideEffect => MUTABLE_SIDE_EFFECT_MARKER_NAME,
            MarkerName::Version => VERSION_MARKER_NAME,
            MarkerName::LocalActivity => LOCAL_ACTIVITY_MARKER_NAME,
        }
    }
}

impl std::fmt::Display for MarkerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during marker payload encoding/decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("marker id too long: {0} bytes (max: {MAX_MARKER_ID_LEN})")]
    IdTooLong(usize),

    #[error("marker data too large: {0} bytes")]
    DataTooLarge(usize),

    #[error("truncated marker payload: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("marker id is not valid UTF-8")]
    InvalidId,

    #[error("{0} trailing bytes after marker payload")]
    TrailingBytes(usize),
}

/// Keyed payload of a mutable side effect or version marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPayload {
    pub id: String,
    pub data: Vec<u8>,
}

impl MarkerPayload {
    pub fn new(id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }

    /// Encode to the marker details blob.
    pub fn encode(&self) -> Result<Bytes, MarkerError> {
        let id = self.id.as_bytes();
        if id.len() > MAX_MARKER_ID_LEN {
            return Err(MarkerError::IdTooLong(id.len()));
        }
        let data_len =
            u32::try_from(self.data.len()).map_err(|_| MarkerError::DataTooLarge(self.data.len()))?;

        let mut buf = BytesMut::with_capacity(2 + id.len() + 4 + self.data.len());
        buf.put_u16(id.len() as u16);
        buf.put_slice(id);
        buf.put_u32(data_len);
        buf.put_slice(&self.data);
        Ok(buf.freeze())
    }

    /// Decode a marker details blob.
    pub fn decode(details: &[u8]) -> Result<Self, MarkerError> {
        let mut buf = details;

        ensure_remaining(buf, 2)?;
        let id_len = buf.get_u16() as usize;
        ensure_remaining(buf, id_len)?;
        let id = std::str::from_utf8(&buf[..id_len])
            .map_err(|_| MarkerError::InvalidId)?
            .to_string();
        buf.advance(id_len);

        ensure_remaining(buf, 4)?;
        let data_len = buf.get_u32() as usize;
        ensure_remaining(buf, data_len)?;
        let data = buf[..data_len].to_vec();
        buf.advance(data_len);

        if buf.has_remaining() {
            return Err(MarkerError::TrailingBytes(buf.remaining()));
        }

        Ok(Self { id, data })
    }
}

/// Outcome of a local activity as recorded in its marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalActivityMarkerData {
    pub activity_id: String,
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub err_details: Vec<u8>,
    #[serde(default)]
    pub result: Vec<u8>,
    /// Workflow time when the activity finished.
    pub replay_time: i64,
}

fn ensure_remaining(buf: &[u8], len: usize) -> Result<(), MarkerError> {
    if buf.len() < len {
        return Err(MarkerError::Truncated {
            needed: len - buf.len(),
        });
    }
    Ok(())
}
