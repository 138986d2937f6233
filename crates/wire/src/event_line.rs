// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-lines event wire format (spec.md §6): one [`Event`] per line, used
//! by container log streaming, the live-broadcast hub, and durable
//! persistence. A thin serialization wrapper -- `Event` already carries
//! every field the format names (`type`, `timestamp`, optional
//! `unit`/`task`/`pr`/`payload`/`error`); this module only owns the
//! line-oriented encode/decode contract.

use warden_core::event::Event;

/// One line of the JSON-lines event stream.
#[derive(Debug, Clone)]
pub struct EventLine(pub Event);

impl EventLine {
    /// Encode as a single line, terminated by `\n`, suitable for appending
    /// to a log file or writing to a streaming sink.
    pub fn to_line(&self) -> String {
        // `Event` serialization cannot fail (no non-string map keys, no
        // floats that could be NaN/Infinity); treat a failure as a defect.
        let mut s = serde_json::to_string(&self.0).unwrap_or_else(|e| {
            format!(r#"{{"type":"encode_error","error":{:?}}}"#, e.to_string())
        });
        s.push('\n');
        s
    }

    /// Parse one line (without its trailing newline) back into an `Event`.
    pub fn from_line(line: &str) -> Result<Event, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

#[cfg(test)]
#[path = "event_line_tests.rs"]
mod tests;
