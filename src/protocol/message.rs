//! Protocol Messages
//!
//! Binary messages sent from the server to subscribers.
//!
//! # Wire format
//!
//! ```text
//! +--------+---------+---------------------------------------------+
//! | "DCST" | version |  bincode(Message { timestamp, payload })    |
//! | 4 bytes| 1 byte  |                                             |
//! +--------+---------+---------------------------------------------+
//! ```
//!
//! The payload enum carries its own variant tag and every byte buffer or
//! string is length-prefixed, so a decoder never needs out-of-band schema
//! information beyond the version byte.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::error::{ProtocolError, ProtocolResult};
use crate::device::StreamKind;

/// Leading bytes of every encoded message
pub const MAGIC: [u8; 4] = *b"DCST";

/// Current wire format version
pub const PROTOCOL_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1;

/// Discriminant of a message's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    DeviceData,
    Error,
}

/// Message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload<'a> {
    /// One RGBA8888 frame, row-major, `width * height * 4` bytes
    DeviceData {
        kind: StreamKind,
        #[serde(
            serialize_with = "serde_bytes::serialize",
            deserialize_with = "owned_bytes"
        )]
        bytes: Cow<'a, [u8]>,
    },
    /// Human-readable failure sent to a single connection
    Error { text: Cow<'a, str> },
}

/// Deserialize frame bytes into an owned buffer so decoded messages do not
/// borrow from the input
fn owned_bytes<'de, D>(deserializer: D) -> Result<Cow<'static, [u8]>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let buf = serde_bytes::ByteBuf::deserialize(deserializer)?;
    Ok(Cow::Owned(buf.into_vec()))
}

/// A timestamped protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<'a> {
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub payload: Payload<'a>,
}

impl<'a> Message<'a> {
    /// Create a message stamped with the current time
    pub fn new(payload: Payload<'a>) -> Self {
        Self {
            timestamp: now_millis(),
            payload,
        }
    }

    /// Frame data message; borrows the frame when given a slice
    pub fn device_data(kind: StreamKind, bytes: impl Into<Cow<'a, [u8]>>) -> Self {
        Self::new(Payload::DeviceData {
            kind,
            bytes: bytes.into(),
        })
    }

    /// Error message
    pub fn error(text: impl Into<Cow<'a, str>>) -> Self {
        Self::new(Payload::Error { text: text.into() })
    }

    /// Replace the timestamp
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn message_type(&self) -> MessageType {
        match self.payload {
            Payload::DeviceData { .. } => MessageType::DeviceData,
            Payload::Error { .. } => MessageType::Error,
        }
    }

    /// Encode into a fresh buffer
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Encode into `buf`, replacing its contents and keeping its capacity
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> ProtocolResult<()> {
        buf.clear();
        buf.extend_from_slice(&MAGIC);
        buf.push(PROTOCOL_VERSION);
        bincode::serialize_into(&mut *buf, self)?;
        Ok(())
    }

    /// Decode a buffer produced by [`Message::encode`]
    pub fn decode(buf: &[u8]) -> ProtocolResult<Message<'static>> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated(buf.len()));
        }
        if buf[..MAGIC.len()] != MAGIC {
            return Err(ProtocolError::BadMagic);
        }

        let version = buf[MAGIC.len()];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        Ok(bincode::deserialize(&buf[HEADER_LEN..])?)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
