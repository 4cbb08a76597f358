//! Parallel Publisher: bounded-concurrency fan-out to N targets with
//! per-target timeout, sequential per-target retries, and sanitized,
//! normalized outcome accounting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::model::{Alert, Classification, PublishErrorCode, PublishOutcome, Target};
use crate::retry::{classify_error, Backoff, BackoffConfig, PublishFailure};
use crate::sanitize::sanitize;

/// Minimum per-attempt timeout, regardless of how little budget remains —
/// gives a last attempt a fighting chance instead of firing a 0ms request.
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct PublishConfig {
    pub max_publishing_targets: usize,
    pub timeout_per_target: Duration,
    pub retry_enabled: bool,
    pub retry_max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_publishing_targets: 10,
            timeout_per_target: Duration::from_secs(5),
            retry_enabled: true,
            retry_max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PublishSummary {
    pub targets: usize,
    pub success: usize,
    pub failed: usize,
    pub total_publish_time: Duration,
}

/// A single dispatch attempt to a target: the thing a `TargetClient`
/// performs once. The publisher owns retry sequencing above this.
#[async_trait]
pub trait TargetClient: Send + Sync {
    async fn attempt(
        &self,
        target: &Target,
        alert: &Alert,
        classification: &Classification,
        timeout: Duration,
    ) -> Result<u16, PublishFailure>;
}

/// Generic HTTP sink: POSTs a JSON envelope to `Target.url`, attaching
/// `Target.auth` as a bearer token or a named header.
pub struct HttpTargetClient {
    client: reqwest::Client,
}

impl HttpTargetClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTargetClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetClient for HttpTargetClient {
    async fn attempt(
        &self,
        target: &Target,
        alert: &Alert,
        classification: &Classification,
        timeout: Duration,
    ) -> Result<u16, PublishFailure> {
        let envelope = serde_json::json!({
            "fingerprint": alert.fingerprint,
            "alertName": alert.alert_name,
            "status": alert.status,
            "labels": alert.labels,
            "annotations": alert.annotations,
            "classification": classification,
        });

        let mut request = self.client.post(&target.url).json(&envelope).timeout(timeout);
        request = match &target.auth {
            Some(crate::model::TargetAuth::Bearer { token }) => request.bearer_auth(token),
            Some(crate::model::TargetAuth::Header { name, value }) => request.header(name, value),
            None => request,
        };

        match request.send().await {
            Ok(resp) => Ok(resp.status().as_u16()),
            Err(e) => Err(classify_reqwest_error(&e)),
        }
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> PublishFailure {
    if e.is_timeout() {
        PublishFailure::PerAttemptTimeout
    } else if e.is_connect() {
        PublishFailure::ConnectionRefused
    } else if e.is_redirect() {
        PublishFailure::TooManyRedirects
    } else {
        PublishFailure::Other
    }
}

/// Fan out a single alert's publish to every target in `targets`, bounded by
/// `config.max_publishing_targets` concurrent workers.
pub async fn publish_many(
    client: Arc<dyn TargetClient>,
    alert: &Alert,
    classification: &Classification,
    targets: &[Target],
    config: PublishConfig,
    cancel: CancellationToken,
) -> (Vec<PublishOutcome>, PublishSummary) {
    if targets.is_empty() {
        return (Vec::new(), PublishSummary::default());
    }

    let semaphore = Arc::new(Semaphore::new(config.max_publishing_targets.max(1)));
    let mut handles = Vec::with_capacity(targets.len());

    for target in targets {
        let semaphore = Arc::clone(&semaphore);
        let client = Arc::clone(&client);
        let target = target.clone();
        let alert = alert.clone();
        let classification = classification.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            publish_one(client, &target, &alert, &classification, config, cancel).await
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(_join_err) => {
                // The task panicked; record it as an unknown failure rather
                // than silently dropping the target from the response.
                outcomes.push(PublishOutcome {
                    target_name: "unknown".to_string(),
                    target_type: "unknown".to_string(),
                    success: false,
                    http_status: None,
                    error_code: Some(PublishErrorCode::Unknown),
                    error_message: Some("publish task panicked".to_string()),
                    retry_count: 0,
                    duration: Duration::ZERO,
                });
            }
        }
    }

    let summary = PublishSummary {
        targets: outcomes.len(),
        success: outcomes.iter().filter(|o| o.success).count(),
        failed: outcomes.iter().filter(|o| !o.success).count(),
        total_publish_time: outcomes.iter().map(|o| o.duration).sum(),
    };

    (outcomes, summary)
}

async fn publish_one(
    client: Arc<dyn TargetClient>,
    target: &Target,
    alert: &Alert,
    classification: &Classification,
    config: PublishConfig,
    cancel: CancellationToken,
) -> PublishOutcome {
    let started = Instant::now();
    let deadline = started + config.timeout_per_target;
    let mut backoff = Backoff::new(config.backoff);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let remaining_attempts = config.retry_max_attempts.saturating_sub(attempt - 1).max(1);
        let remaining_budget = deadline.saturating_duration_since(Instant::now());
        if remaining_budget.is_zero() {
            return timeout_outcome(target, attempt - 1, started.elapsed());
        }
        let per_attempt_timeout =
            (remaining_budget / remaining_attempts).max(MIN_ATTEMPT_TIMEOUT);

        let call = client.attempt(target, alert, classification, per_attempt_timeout);
        let result = tokio::select! {
            () = cancel.cancelled() => {
                return cancelled_outcome(target, attempt - 1, started.elapsed());
            }
            r = tokio::time::timeout(per_attempt_timeout, call) => r,
        };

        let failure = match result {
            Err(_elapsed) => PublishFailure::PerAttemptTimeout,
            Ok(Err(failure)) => failure,
            Ok(Ok(status)) if (200..300).contains(&status) => {
                return PublishOutcome {
                    target_name: target.name.clone(),
                    target_type: target.target_type.clone(),
                    success: true,
                    http_status: Some(status),
                    error_code: None,
                    error_message: None,
                    retry_count: attempt - 1,
                    duration: started.elapsed(),
                };
            }
            Ok(Ok(status)) => PublishFailure::HttpStatus(status),
        };

        let class = classify_error(&failure);
        let can_retry = config.retry_enabled
            && class.retryable
            && attempt < config.retry_max_attempts
            && deadline > Instant::now();

        if !can_retry {
            let http_status = match &failure {
                PublishFailure::HttpStatus(s) => Some(*s),
                _ => None,
            };
            return PublishOutcome {
                target_name: target.name.clone(),
                target_type: target.target_type.clone(),
                success: false,
                http_status,
                error_code: Some(class.category),
                error_message: Some(sanitize(&describe_failure(&failure))),
                retry_count: attempt - 1,
                duration: started.elapsed(),
            };
        }

        if let Some(sleep_for) = backoff.next() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let sleep_for = sleep_for.min(remaining);
            tokio::select! {
                () = cancel.cancelled() => {
                    return cancelled_outcome(target, attempt - 1, started.elapsed());
                }
                () = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}

fn timeout_outcome(target: &Target, retry_count: u32, duration: Duration) -> PublishOutcome {
    PublishOutcome {
        target_name: target.name.clone(),
        target_type: target.target_type.clone(),
        success: false,
        http_status: None,
        error_code: Some(PublishErrorCode::Timeout),
        error_message: Some("per-target budget exceeded".to_string()),
        retry_count,
        duration,
    }
}

fn cancelled_outcome(target: &Target, retry_count: u32, duration: Duration) -> PublishOutcome {
    PublishOutcome {
        target_name: target.name.clone(),
        target_type: target.target_type.clone(),
        success: false,
        http_status: None,
        error_code: Some(PublishErrorCode::Unknown),
        error_message: Some("request cancelled".to_string()),
        retry_count,
        duration,
    }
}

fn describe_failure(failure: &PublishFailure) -> String {
    match failure {
        PublishFailure::HttpStatus(status) => format!("target returned HTTP {status}"),
        PublishFailure::Dns => "DNS resolution failed".to_string(),
        PublishFailure::Tls => "TLS handshake failed".to_string(),
        PublishFailure::ConnectionRefused => "connection refused".to_string(),
        PublishFailure::ConnectionReset => "connection reset".to_string(),
        PublishFailure::Unreachable => "host/network unreachable".to_string(),
        PublishFailure::PerAttemptTimeout => "attempt timed out".to_string(),
        PublishFailure::TooManyRedirects => "too many redirects".to_string(),
        PublishFailure::NonRetryable => "non-retryable error".to_string(),
        PublishFailure::Other => "unknown publish error".to_string(),
    }
}
