// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type for framing and (de)serialization failures on the control
//! socket.

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize message: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("message of {0} bytes exceeds the maximum frame size of {1} bytes")]
    FrameTooLarge(usize, usize),

    #[error("connection closed before a complete message was read")]
    UnexpectedEof,
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
