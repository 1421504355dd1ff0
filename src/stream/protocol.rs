//! Wire protocol between a profiling server and its viewers.
//!
//! Every message is a JSON document preceded by its length as a big-endian
//! `u32`. A session is:
//!
//! 1. viewer sends [`ClientMessage::Hello`]
//! 2. server answers [`ServerMessage::Welcome`]
//! 3. server sends a [`ServerMessage::Full`] snapshot, then deltas
//!
//! A viewer that notices a sequence gap sends [`ClientMessage::Resync`] and
//! the server follows up with a full snapshot.

use crate::stats::{Mode, Snapshot};
use crate::utils::config::MAX_FRAME_SIZE;
use crate::utils::error::TransportError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};

/// Messages sent by a viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello { protocol_version: u32 },
    Resync,
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol_version: u32,
        mode: Mode,
        publish_interval_ms: u64,
    },
    /// Complete statistics as of `seq`
    Full { seq: u64, snapshot: Snapshot },
    /// Statistics added between `base_seq` and `seq`
    Delta {
        seq: u64,
        base_seq: u64,
        delta: Snapshot,
    },
}

impl ServerMessage {
    /// Sequence number of a snapshot-carrying message
    pub fn seq(&self) -> Option<u64> {
        match self {
            ServerMessage::Welcome { .. } => None,
            ServerMessage::Full { seq, .. } | ServerMessage::Delta { seq, .. } => Some(*seq),
        }
    }
}

/// Write one length-prefixed message
pub fn write_message<W, M>(writer: &mut W, message: &M) -> Result<(), TransportError>
where
    W: Write,
    M: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            limit: MAX_FRAME_SIZE,
        });
    }
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        size: payload.len(),
        limit: MAX_FRAME_SIZE,
    })?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed message
///
/// A clean end of stream before the length prefix is reported as
/// [`TransportError::Closed`].
pub fn read_message<R, M>(reader: &mut R) -> Result<M, TransportError>
where
    R: Read,
    M: DeserializeOwned,
{
    let mut prefix = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut prefix) {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => TransportError::Closed,
            _ => TransportError::Io(e),
        });
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(serde_json::from_slice(&payload)?)
}
