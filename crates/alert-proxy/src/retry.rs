//! Retry Policy: a pure function classifying publish errors as retryable or
//! terminal, plus a jittered exponential backoff iterator. Both are
//! side-effect-free so they are exhaustively unit-testable without an async
//! runtime.

use std::time::Duration;

use rand::Rng;

use crate::model::PublishErrorCode;

/// Shape of a publish failure as seen by the retry classifier. Constructed
/// by the publisher from the underlying `reqwest`/transport error or HTTP
/// response status.
#[derive(Debug, Clone)]
pub enum PublishFailure {
    /// A non-2xx HTTP response was received.
    HttpStatus(u16),
    /// DNS resolution failed.
    Dns,
    /// TLS handshake/certificate error.
    Tls,
    /// Connection refused.
    ConnectionRefused,
    /// Connection reset by peer.
    ConnectionReset,
    /// Host or network unreachable.
    Unreachable,
    /// An I/O-level timeout occurred on this specific attempt (not a
    /// request-wide deadline).
    PerAttemptTimeout,
    /// A redirect limit was exceeded.
    TooManyRedirects,
    /// A sentinel marking an error as never retryable regardless of shape.
    NonRetryable,
    /// Anything else.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    pub retryable: bool,
    pub category: PublishErrorCode,
}

/// Classify a publish failure as retryable or terminal (spec.md §4.6).
#[must_use]
pub fn classify_error(failure: &PublishFailure) -> ErrorClass {
    match failure {
        PublishFailure::HttpStatus(status) => classify_http_status(*status),
        PublishFailure::Dns => ErrorClass {
            retryable: true,
            category: PublishErrorCode::Dns,
        },
        PublishFailure::Tls => ErrorClass {
            retryable: false,
            category: PublishErrorCode::Tls,
        },
        PublishFailure::ConnectionRefused => ErrorClass {
            retryable: true,
            category: PublishErrorCode::Refused,
        },
        PublishFailure::ConnectionReset | PublishFailure::Unreachable => ErrorClass {
            retryable: true,
            category: PublishErrorCode::Unknown,
        },
        PublishFailure::PerAttemptTimeout => ErrorClass {
            retryable: true,
            category: PublishErrorCode::Timeout,
        },
        PublishFailure::TooManyRedirects => ErrorClass {
            retryable: false,
            category: PublishErrorCode::HttpError,
        },
        PublishFailure::NonRetryable => ErrorClass {
            retryable: false,
            category: PublishErrorCode::Unknown,
        },
        PublishFailure::Other => ErrorClass {
            retryable: false,
            category: PublishErrorCode::Unknown,
        },
    }
}

fn classify_http_status(status: u16) -> ErrorClass {
    match status {
        200..=299 => ErrorClass {
            retryable: false,
            category: PublishErrorCode::HttpError, // unreachable in practice: success is not an error
        },
        408 | 429 => ErrorClass {
            retryable: true,
            category: if status == 429 {
                PublishErrorCode::RateLimit
            } else {
                PublishErrorCode::Timeout
            },
        },
        500..=599 => ErrorClass {
            retryable: true,
            category: PublishErrorCode::HttpError,
        },
        _ => ErrorClass {
            retryable: false,
            category: PublishErrorCode::HttpError,
        },
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub factor: f64,
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            factor: 2.0,
            max_attempts: 3,
        }
    }
}

/// Exponential backoff with full jitter. Each call to `next()` returns the
/// sleep duration before the *next* attempt; the iterator yields exactly
/// `max_attempts - 1` values (no sleep is needed after the final attempt).
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt + 1 >= self.config.max_attempts {
            return None;
        }
        let exp = self.config.factor.powi(self.attempt as i32);
        let ceiling = self.config.base.mul_f64(exp);
        let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..=1.0);
        self.attempt += 1;
        Some(ceiling.mul_f64(jitter_frac))
    }
}
