//! Bounded, paced delivery of outreach messages.
//!
//! Each [`DeliveryManager::send`] call walks a small state machine:
//! attempt → (success | backoff → attempt | exhausted). Every attempt first asks
//! the session provider for credentials, forcing a refresh on retry rounds, then
//! waits a jittered delay before posting.

use crate::grailed::{Messenger, SessionProvider, messages::DeliveryError};
use crate::metrics;
use crate::models::Listing;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Attempt index to run after `failed` failed, or `None` once the budget is spent.
    pub fn next_attempt(&self, failed: u32) -> Option<u32> {
        let next = failed + 1;
        (next < self.max_attempts).then_some(next)
    }
}

/// Uniform pre-send delay in `[min, max)`.
pub struct Jitter {
    rng: StdRng,
    min_ms: u64,
    max_ms: u64,
}

impl Jitter {
    pub const DEFAULT_MIN_MS: u64 = 2_000;
    pub const DEFAULT_MAX_MS: u64 = 7_000;

    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            min_ms: Self::DEFAULT_MIN_MS,
            max_ms: Self::DEFAULT_MAX_MS,
        }
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            min_ms: Self::DEFAULT_MIN_MS,
            max_ms: Self::DEFAULT_MAX_MS,
        }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            rng: StdRng::seed_from_u64(0),
            min_ms: 0,
            max_ms: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(self.rng.random_range(self.min_ms..self.max_ms))
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new()
    }
}

enum Step {
    Attempt(u32),
    Backoff(u32),
    Delivered(u32),
    Exhausted,
}

pub struct DeliveryManager<S, M> {
    session: S,
    messenger: M,
    retry: RetryPolicy,
    jitter: Jitter,
}

impl<S: SessionProvider, M: Messenger> DeliveryManager<S, M> {
    pub fn new(session: S, messenger: M) -> Self {
        Self {
            session,
            messenger,
            retry: RetryPolicy::default(),
            jitter: Jitter::new(),
        }
    }

    #[cfg(test)]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[cfg(test)]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns `true` once the marketplace accepted the message; `false` after
    /// the retry budget is exhausted. Never panics or propagates errors.
    pub async fn send(&mut self, listing: &Listing, text: &str) -> bool {
        let max_attempts = self.retry.max_attempts;
        let mut step = if max_attempts == 0 {
            Step::Exhausted
        } else {
            Step::Attempt(0)
        };

        loop {
            step = match step {
                Step::Attempt(attempt) => match self.attempt(attempt, listing, text).await {
                    Ok(()) => Step::Delivered(attempt),
                    Err(err) => {
                        warn!(
                            target = "lowball.delivery",
                            listing_id = %listing.id,
                            title = %listing.title,
                            attempt = attempt + 1,
                            max_attempts,
                            error = %err,
                            "error sending message"
                        );
                        if let DeliveryError::Rejected { status, headers } = &err {
                            warn!(
                                target = "lowball.delivery",
                                status = %status,
                                headers = %headers,
                                "delivery response"
                            );
                        }
                        match self.retry.next_attempt(attempt) {
                            Some(next) => Step::Backoff(next),
                            None => Step::Exhausted,
                        }
                    }
                },
                Step::Backoff(next) => {
                    info!(
                        target = "lowball.delivery",
                        "retrying in {} seconds...",
                        self.retry.backoff.as_secs()
                    );
                    if !self.retry.backoff.is_zero() {
                        sleep(self.retry.backoff).await;
                    }
                    Step::Attempt(next)
                }
                Step::Delivered(attempt) => {
                    info!(
                        target = "lowball.delivery",
                        listing_id = %listing.id,
                        title = %listing.title,
                        message = %text,
                        "message sent successfully"
                    );
                    metrics::message_sent(attempt + 1);
                    return true;
                }
                Step::Exhausted => {
                    error!(
                        target = "lowball.delivery",
                        listing_id = %listing.id,
                        "failed to send message after {max_attempts} attempts"
                    );
                    metrics::message_failed(max_attempts);
                    return false;
                }
            };
        }
    }

    async fn attempt(
        &mut self,
        attempt: u32,
        listing: &Listing,
        text: &str,
    ) -> Result<(), DeliveryError> {
        let credentials = self.session.ensure_fresh(attempt).await?;
        let delay = self.jitter.next_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.messenger
            .post_message(&credentials, listing, text)
            .await
    }
}
