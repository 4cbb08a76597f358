//! Classifier Gateway: an adapter to an external classification capability
//! with timeout, and a deterministic fallback. The gateway is stateless from
//! the pipeline's point of view; any caching/rate-limiting belongs to the
//! wrapped capability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::model::{Alert, Classification, ClassificationSource, Severity};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier timed out")]
    Timeout,
    #[error("classifier error: {0}")]
    Upstream(String),
}

/// The external classification capability, injected as a trait object.
#[async_trait]
pub trait ClassifierEngine: Send + Sync {
    async fn classify(&self, alert: &Alert) -> Result<Classification, ClassifierError>;
}

/// Built-in engine used when no external classifier is wired in. Always
/// returns the deterministic severity-from-labels fallback result, tagged
/// `source = default`. This is the crate's concrete stand-in for "the
/// classification engine's model details", which are out of scope.
pub struct NullClassifier;

#[async_trait]
impl ClassifierEngine for NullClassifier {
    async fn classify(&self, alert: &Alert) -> Result<Classification, ClassifierError> {
        Ok(default_classification(alert, ClassificationSource::Default))
    }
}

/// Derive severity from `labels["severity"]`, defaulting to `info` when
/// absent or unrecognized.
fn severity_from_labels(alert: &Alert) -> Severity {
    match alert.labels.get("severity").map(String::as_str) {
        Some("critical") => Severity::Critical,
        Some("warning") => Severity::Warning,
        Some("info") => Severity::Info,
        _ => Severity::Info,
    }
}

/// Build the deterministic severity-from-labels classification used
/// whenever no engine result is available, tagged with the given source.
#[must_use]
pub fn default_classification(alert: &Alert, source: ClassificationSource) -> Classification {
    Classification::new(
        severity_from_labels(alert),
        "unknown",
        0.5,
        source,
        Vec::new(),
        Utc::now(),
    )
}

pub struct ClassifierGateway {
    engine: Arc<dyn ClassifierEngine>,
    enabled: bool,
    timeout: Duration,
    fallback_enabled: bool,
}

impl ClassifierGateway {
    #[must_use]
    pub fn new(
        engine: Arc<dyn ClassifierEngine>,
        enabled: bool,
        timeout: Duration,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            engine,
            enabled,
            timeout,
            fallback_enabled,
        }
    }

    pub async fn classify(&self, alert: &Alert) -> Result<Classification, ClassifierError> {
        if !self.enabled {
            return Ok(default_classification(alert, ClassificationSource::Default));
        }

        match tokio::time::timeout(self.timeout, self.engine.classify(alert)).await {
            Ok(Ok(classification)) => Ok(classification),
            Ok(Err(e)) if self.fallback_enabled => {
                tracing::warn!(error = %e, "classifier error, using fallback");
                Ok(default_classification(alert, ClassificationSource::Fallback))
            }
            Ok(Err(e)) => Err(e),
            Err(_) if self.fallback_enabled => {
                tracing::warn!("classifier timed out, using fallback");
                Ok(default_classification(alert, ClassificationSource::Fallback))
            }
            Err(_) => Err(ClassifierError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn alert_with_severity(sev: &str) -> Alert {
        Alert {
            fingerprint: "f".to_string(),
            alert_name: "X".to_string(),
            status: crate::model::AlertStatus::Firing,
            labels: HashMap::from([("severity".to_string(), sev.to_string())]),
            annotations: HashMap::new(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: None,
        }
    }

    struct AlwaysErrors;
    #[async_trait]
    impl ClassifierEngine for AlwaysErrors {
        async fn classify(&self, _alert: &Alert) -> Result<Classification, ClassifierError> {
            Err(ClassifierError::Upstream("boom".to_string()))
        }
    }

    struct NeverReturns;
    #[async_trait]
    impl ClassifierEngine for NeverReturns {
        async fn classify(&self, _alert: &Alert) -> Result<Classification, ClassifierError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn disabled_returns_default_immediately() {
        let gw = ClassifierGateway::new(Arc::new(NullClassifier), false, Duration::from_secs(5), true);
        let c = gw.classify(&alert_with_severity("critical")).await.unwrap();
        assert_eq!(c.source, ClassificationSource::Default);
        assert_eq!(c.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn engine_error_with_fallback_enabled_falls_back() {
        let gw = ClassifierGateway::new(Arc::new(AlwaysErrors), true, Duration::from_secs(5), true);
        let c = gw.classify(&alert_with_severity("warning")).await.unwrap();
        assert_eq!(c.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn engine_error_with_fallback_disabled_propagates() {
        let gw = ClassifierGateway::new(Arc::new(AlwaysErrors), true, Duration::from_secs(5), false);
        let err = gw.classify(&alert_with_severity("warning")).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Upstream(_)));
    }

    #[tokio::test]
    async fn timeout_with_fallback_enabled_falls_back() {
        let gw = ClassifierGateway::new(
            Arc::new(NeverReturns),
            true,
            Duration::from_millis(20),
            true,
        );
        let c = gw.classify(&alert_with_severity("info")).await.unwrap();
        assert_eq!(c.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn timeout_with_fallback_disabled_errors() {
        let gw = ClassifierGateway::new(
            Arc::new(NeverReturns),
            true,
            Duration::from_millis(20),
            false,
        );
        let err = gw.classify(&alert_with_severity("info")).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Timeout));
    }

    #[test]
    fn unknown_severity_label_defaults_to_info() {
        let alert = alert_with_severity("bogus");
        assert_eq!(severity_from_labels(&alert), Severity::Info);
    }
}
