//! Retry decisions for failed request attempts
//!
//! Each transport failure is classified once into an [`ErrorKind`]; the
//! policy then looks the kind up in a fixed table. The attempt cutoff is
//! checked first and overrides every classification, and the explicit kinds
//! (timeouts, TLS) are decided before the idempotency fallback.

use crate::transport::ErrorKind;
use std::time::Duration;

/// Default number of attempts per logical request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// What the table says about an error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Always safe to repeat
    Retry,
    /// Never repeated automatically
    NoRetry,
    /// Repeated only when the request has no enclosed entity
    RetryIfIdempotent,
}

/// Default disposition of each error kind
pub fn disposition(kind: ErrorKind) -> Disposition {
    match kind {
        ErrorKind::NoResponseFromPeer => Disposition::Retry,
        ErrorKind::UnknownHost => Disposition::Retry,
        ErrorKind::ConnectTimeout => Disposition::NoRetry,
        ErrorKind::TlsHandshakeFailure => Disposition::NoRetry,
        ErrorKind::TlsError => Disposition::NoRetry,
        ErrorKind::IoTimeout => Disposition::NoRetry,
        ErrorKind::Io => Disposition::RetryIfIdempotent,
    }
}

/// Decide whether attempt number `attempt_count` may be followed by another
///
/// `attempt_count` is the number of attempts already executed.
pub fn decide(
    kind: ErrorKind,
    attempt_count: u32,
    request_is_idempotent: bool,
    max_attempts: u32,
) -> bool {
    if attempt_count >= max_attempts {
        return false;
    }

    match disposition(kind) {
        Disposition::Retry => true,
        Disposition::NoRetry => false,
        Disposition::RetryIfIdempotent => request_is_idempotent,
    }
}

/// Exponential delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the second attempt
    pub base: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay after `attempt_count` failed attempts: `base * 2^(n-1)`, capped
    pub fn delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(16);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Retry configuration for a request executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Optional pause between attempts; none by default
    pub backoff: Option<Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: None,
        }
    }

    /// A policy that never repeats an attempt
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Apply [`decide`] with this policy's attempt limit
    pub fn should_retry(&self, kind: ErrorKind, attempt_count: u32, idempotent: bool) -> bool {
        decide(kind, attempt_count, idempotent, self.max_attempts)
    }

    /// Pause before the next attempt
    pub fn delay_for(&self, attempt_count: u32) -> Duration {
        self.backoff
            .map(|backoff| backoff.delay(attempt_count))
            .unwrap_or(Duration::ZERO)
    }
}
