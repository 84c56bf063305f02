// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-interval and exponential-backoff polling.
//!
//! Every wait in the engine carries a cap and a cancellation token. A timed
//! out wait reports the last message its probe returned so the operator sees
//! why it gave up; a cancelled one returns [`EngineError::Cancelled`] as soon
//! as the token fires.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::EngineError;

/// One probe observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    /// Not there yet; the message is reported if the wait times out.
    Pending(Option<String>),
}

impl<T> Poll<T> {
    pub fn pending() -> Self {
        Self::Pending(None)
    }

    pub fn pending_with(message: impl Into<String>) -> Self {
        Self::Pending(Some(message.into()))
    }
}

/// Exponential backoff: `initial`, `initial * factor`, ... for `steps`
/// attempts, each delay clamped to `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: u32,
    pub steps: u32,
    pub cap: Duration,
}

impl Backoff {
    /// Readiness waits of the bucket server: 1s doubling, 10 steps.
    pub const READINESS: Backoff = Backoff {
        initial: Duration::from_secs(1),
        factor: 2,
        steps: 10,
        cap: Duration::from_secs(60),
    };

    /// Optimistic-concurrency retries: 10ms growing fivefold, 5 steps.
    pub const CONFLICT: Backoff = Backoff {
        initial: Duration::from_millis(10),
        factor: 5,
        steps: 5,
        cap: Duration::from_secs(1),
    };

    /// Delay before attempt `n + 1`.
    pub fn delay(&self, n: u32) -> Duration {
        let mut d = self.initial;
        for _ in 0..n {
            d = d.saturating_mul(self.factor);
            if d >= self.cap {
                return self.cap;
            }
        }
        d.min(self.cap)
    }

    /// Sum of all delays, the longest a backoff wait can take.
    pub fn total(&self) -> Duration {
        (0..self.steps).map(|n| self.delay(n)).sum()
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub async fn sleep(cancel: &CancellationToken, delay: Duration) -> Result<(), EngineError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn check(cancel: &CancellationToken) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

/// Probe every `interval` until it is ready or `timeout` elapses.
///
/// The first probe runs immediately.
pub async fn poll_until<T, F, Fut>(
    cancel: &CancellationToken,
    what: &str,
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, EngineError>>,
{
    let deadline = Instant::now() + timeout;
    let mut last = None;
    loop {
        check(cancel)?;
        match probe().await? {
            Poll::Ready(value) => return Ok(value),
            Poll::Pending(message) => {
                if message.is_some() {
                    last = message;
                }
            }
        }
        if Instant::now() + interval > deadline {
            return Err(EngineError::timeout(what, last));
        }
        sleep(cancel, interval).await?;
    }
}

/// Probe with exponential backoff until ready or the steps run out.
pub async fn poll_backoff<T, F, Fut>(
    cancel: &CancellationToken,
    what: &str,
    backoff: Backoff,
    mut probe: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, EngineError>>,
{
    let mut last = None;
    for step in 0..backoff.steps {
        check(cancel)?;
        match probe().await? {
            Poll::Ready(value) => return Ok(value),
            Poll::Pending(message) => {
                if message.is_some() {
                    last = message;
                }
            }
        }
        sleep(cancel, backoff.delay(step)).await?;
    }
    Err(EngineError::timeout(what, last))
}

/// Run `op` again while it fails with an error `retryable` accepts.
pub async fn retry<T, F, Fut>(
    cancel: &CancellationToken,
    backoff: Backoff,
    retryable: impl Fn(&EngineError) -> bool,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut step = 0;
    loop {
        check(cancel)?;
        match op().await {
            Err(e) if retryable(&e) && step + 1 < backoff.steps => {
                sleep(cancel, backoff.delay(step)).await?;
                step += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
#[path = "poll_tests.rs"]
mod tests;
