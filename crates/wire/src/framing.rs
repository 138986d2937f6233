// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing shared by every control-socket message:
//! requests, responses, and the streamed `WatchJob` response sequence.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected rather than read into memory --
/// a defense against a misbehaving peer sending a bogus length prefix.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Write `value` as a length-prefixed JSON frame: 4-byte big-endian length
/// followed by the JSON payload.
pub async fn write_message<W, T>(writer: &mut W, value: &T) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(payload.len(), MAX_FRAME_BYTES));
    }
    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame and deserialize it as `T`.
pub async fn read_message<R, T>(reader: &mut R) -> ProtocolResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::UnexpectedEof)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(len, MAX_FRAME_BYTES));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::UnexpectedEof
        } else {
            ProtocolError::Io(e)
        }
    })?;
    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;
