// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff retry loop shared by every transient-failure call
//! site (spec.md §4.4: "Every sub-invocation that may fail transiently ...
//! uses exponential backoff"). [`warden_core::RetryConfig`] is passed in
//! explicitly rather than read from a package-level global (Design Note).

use std::future::Future;
use tokio_util::sync::CancellationToken;
use warden_core::RetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum BackoffError<E> {
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("exhausted {attempts} attempt(s): {source}")]
    Exhausted { attempts: u32, #[source] source: E },
}

impl<E> BackoffError<E> {
    pub fn into_source(self) -> Option<E> {
        match self {
            BackoffError::Exhausted { source, .. } => Some(source),
            BackoffError::Cancelled { .. } => None,
        }
    }
}

/// Run `op` up to `config.max_attempts` times, sleeping
/// `config.delay_for_attempt(n)` between attempts. Each retried operation
/// gets the per-attempt cancellation check, not a wall-clock from the
/// first attempt (spec.md §5): on cancellation mid-retry, the loop exits
/// at the next backoff boundary with [`BackoffError::Cancelled`].
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, BackoffError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(BackoffError::Cancelled { attempts: attempt });
        }
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if config.is_exhausted(attempt) {
                    return Err(BackoffError::Exhausted { attempts: attempt, source: e });
                }
                let delay = config.delay_for_attempt(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(BackoffError::Cancelled { attempts: attempt }),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
