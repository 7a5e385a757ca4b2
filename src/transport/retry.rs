//! Capped exponential backoff around single send attempts.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{ConnectionPool, TransportError};
use crate::codec::{self, FieldTable, ProtocolMessage};
use crate::config::GatewayConfig;

/// Delay before retry number `attempt` (1-based):
/// `min(base * 2^(attempt - 1), max)`.
///
/// A `max` below `base` is raised to `base`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1 << exponent).min(max.max(base))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_delay_ms),
            Duration::from_millis(config.max_retry_delay_ms),
        )
    }

    /// Total tries per send, never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.base_delay, self.max_delay)
    }
}

/// Sends protocol messages through the pool, retrying socket-level failures
/// on fresh connections.
#[derive(Debug, Clone)]
pub struct RetryingSender {
    pool: Arc<ConnectionPool>,
    fields: Arc<FieldTable>,
    policy: RetryPolicy,
}

impl RetryingSender {
    pub fn new(pool: Arc<ConnectionPool>, fields: Arc<FieldTable>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            fields,
            policy,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Encode once, then try up to the policy's attempt count.
    ///
    /// Encoding and decoding failures are returned at once; on exhaustion the
    /// last attempt's error is returned. Shutdown interrupts a backoff wait.
    pub async fn send(&self, message: &ProtocolMessage) -> Result<ProtocolMessage, TransportError> {
        let payload = codec::encode(message, &self.fields)?;
        debug!("outgoing message:\n{message}");

        let attempts = self.policy.max_attempts();
        let mut attempt = 1;
        loop {
            let started = Instant::now();
            match self.attempt(&payload).await {
                Ok(reply) => {
                    info!(
                        mti = message.mti(),
                        reply_mti = reply.mti(),
                        attempt,
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "round trip completed"
                    );
                    debug!("incoming message:\n{reply}");
                    return Ok(reply);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "send attempt failed, backing off"
                    );
                    self.pause(delay).await?;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempt, attempts, error = %e, "send failed");
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, payload: &[u8]) -> Result<ProtocolMessage, TransportError> {
        let mut conn = self.pool.acquire().await?;
        let reply = match conn.exchange(payload).await {
            Ok(reply) => reply,
            Err(e) => {
                conn.invalidate();
                return Err(e);
            }
        };
        match codec::decode(&reply, &self.fields) {
            Ok(message) => {
                conn.release();
                Ok(message)
            }
            Err(e) => {
                // the stream framing held, but the host spoke something else
                conn.invalidate();
                Err(e.into())
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), TransportError> {
        let mut shutdown = self.pool.shutdown_signal();
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = shutdown.wait_for(|closed| *closed) => Err(TransportError::Interrupted),
        }
    }
}
