//! The internal, format-agnostic alert model and the response types the
//! pipeline ultimately assembles. Every stage downstream of the parsers
//! operates exclusively on these types.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an alert in the normalized model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

/// A single alert after parsing, independent of its source format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub fingerprint: String,
    pub alert_name: String,
    pub status: AlertStatus,
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generator_url: Option<String>,
}

/// Reserved annotation key used to preserve the optional Prometheus `value`
/// field, which has no equivalent slot in the normalized model.
pub const PROMETHEUS_VALUE_ANNOTATION: &str = "__prometheus_value";

/// Severity bucket assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Unknown,
}

/// Where a classification result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Engine,
    Fallback,
    Default,
}

/// Confidence bucket derived from `Classification::confidence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub severity: Severity,
    pub category: String,
    pub confidence: f64,
    pub source: ClassificationSource,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Classification {
    /// Clamp confidence into `[0.0, 1.0]` at construction time so downstream
    /// bucketing never has to defend against out-of-range input.
    #[must_use]
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        confidence: f64,
        source: ClassificationSource,
        recommendations: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
            recommendations,
            timestamp,
        }
    }

    #[must_use]
    pub fn confidence_bucket(&self) -> ConfidenceBucket {
        if self.confidence >= 0.8 {
            ConfidenceBucket::High
        } else if self.confidence >= 0.5 {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }
}

/// A downstream publishing sink, owned by the Target Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Opaque auth material (bearer token, header set, etc). The core never
    /// inspects this beyond attaching it to the outbound request.
    #[serde(default)]
    pub auth: Option<TargetAuth>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetAuth {
    Bearer { token: String },
    Header { name: String, value: String },
}

/// Normalized error codes surfaced in `PublishOutcome` and in the HTTP error
/// body (see `error.rs` for the latter's distinct, API-facing enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishErrorCode {
    Timeout,
    RateLimit,
    Dns,
    Tls,
    Refused,
    HttpError,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub target_name: String,
    pub target_type: String,
    pub success: bool,
    #[serde(default)]
    pub http_status: Option<u16>,
    #[serde(default)]
    pub error_code: Option<PublishErrorCode>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub retry_count: u32,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertOutcomeStatus {
    Success,
    Partial,
    Filtered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertOutcome {
    pub fingerprint: String,
    pub alert_name: String,
    pub status: AlertOutcomeStatus,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default, with = "duration_secs_opt")]
    pub classification_time: Option<Duration>,
    pub filter_action: FilterAction,
    #[serde(default)]
    pub filter_reason: Option<String>,
    #[serde(default)]
    pub publish_outcomes: Vec<PublishOutcome>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub received: usize,
    pub processed: usize,
    pub classified: usize,
    pub filtered: usize,
    pub published: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishCounts {
    pub targets: usize,
    pub success: usize,
    pub failed: usize,
    #[serde(with = "duration_secs")]
    pub total_publish_time: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub overall_status: OverallStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub processing_time: Duration,
    pub counts: Counts,
    pub publish_counts: PublishCounts,
    pub alert_outcomes: Vec<AlertOutcome>,
    pub request_id: String,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        Ok(secs.map(|s| Duration::from_secs_f64(s.max(0.0))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let c = Classification::new(
            Severity::Warning,
            "unknown",
            1.5,
            ClassificationSource::Default,
            vec![],
            Utc::now(),
        );
        assert!((c.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_buckets() {
        let mk = |c: f64| {
            Classification::new(
                Severity::Info,
                "x",
                c,
                ClassificationSource::Default,
                vec![],
                Utc::now(),
            )
        };
        assert_eq!(mk(0.9).confidence_bucket(), ConfidenceBucket::High);
        assert_eq!(mk(0.8).confidence_bucket(), ConfidenceBucket::High);
        assert_eq!(mk(0.6).confidence_bucket(), ConfidenceBucket::Medium);
        assert_eq!(mk(0.5).confidence_bucket(), ConfidenceBucket::Medium);
        assert_eq!(mk(0.1).confidence_bucket(), ConfidenceBucket::Low);
    }
}
