// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for the control-plane socket, plus the JSON-lines event
//! wire format shared by log streaming, the live-broadcast hub, and
//! durable persistence.
//!
//! Wire framing for the control socket: a 4-byte big-endian length prefix
//! followed by a JSON payload. `WatchJob` is the one streaming operation --
//! the daemon writes a sequence of framed [`Response`] messages without
//! waiting for further requests, terminated by [`Response::JobTerminal`]
//! or connection close.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod event_line;
pub mod framing;
pub mod request;
pub mod response;

pub use error::{ProtocolError, ProtocolResult};
pub use event_line::EventLine;
pub use framing::{read_message, write_message};
pub use request::Request;
pub use response::{HealthPayload, JobDetailPayload, JobSummaryPayload, Response, UnitSummaryPayload};
