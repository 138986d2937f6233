// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff retry configuration.
//!
//! Passed explicitly into every retry site as a value (Design Note:
//! "Re-implement as a value passed explicitly into every retry site; never
//! a mutable package-level variable").

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for an exponential backoff retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    pub max_attempts: u32,
}

mod millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl RetryConfig {
    /// `initial delay 1s, multiplier 2, cap 30s, max attempts 3` — the
    /// worker's default for transient subprocess/network failures.
    pub const fn worker_default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }

    /// Delay to wait before the given 1-indexed attempt number. `attempt =
    /// 1` is the delay before the *second* try (the first try has no
    /// preceding delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(attempt as i32 - 1);
        let millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }

    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::worker_default()
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
