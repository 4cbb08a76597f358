//! Pipeline Orchestrator: per-alert sequencing of classify → filter →
//! publish, budgeted per stage, with a bounded worker pool across alerts in
//! a batch. States form a linear machine:
//! `received → classified → filter_decided → (filtered | published | publish_failed)`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::classify::ClassifierGateway;
use crate::filter::FilterGateway;
use crate::model::{
    Alert, AlertOutcome, AlertOutcomeStatus, FilterAction, PublishErrorCode, PublishOutcome,
    Target,
};
use crate::publish::{self, PublishConfig, TargetClient};

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub classification_timeout: Duration,
    pub filtering_timeout: Duration,
    pub publishing_timeout: Duration,
    pub continue_on_error: bool,
    pub max_concurrent_alerts: usize,
    /// Gates the publishing stage (spec.md §6 `enable_publishing`). When
    /// disabled, the stage is skipped entirely and the alert is counted as
    /// `success` with zero targets, the same outcome an empty target list
    /// produces (spec.md §4.7 point 2).
    pub publishing_enabled: bool,
    pub publish: PublishConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            classification_timeout: Duration::from_secs(5),
            filtering_timeout: Duration::from_secs(1),
            publishing_timeout: Duration::from_secs(5),
            continue_on_error: true,
            max_concurrent_alerts: 10,
            publishing_enabled: true,
            publish: PublishConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("classification failed for alert '{alert_name}' and continue_on_error is disabled: {source}")]
    ClassificationFatal {
        alert_name: String,
        #[source]
        source: crate::classify::ClassifierError,
    },
}

pub struct Orchestrator {
    classifier: Arc<ClassifierGateway>,
    filter: Arc<FilterGateway>,
    target_client: Arc<dyn TargetClient>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        classifier: Arc<ClassifierGateway>,
        filter: Arc<FilterGateway>,
        target_client: Arc<dyn TargetClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            classifier,
            filter,
            target_client,
            config,
        }
    }

    /// Process a validated batch of alerts against the given target
    /// snapshot, bounded by `max_concurrent_alerts` concurrent workers.
    /// `cancel` is the request-scoped cancellation token; every suspension
    /// inside a per-alert pipeline observes it.
    pub async fn run(
        &self,
        alerts: Vec<Alert>,
        targets: Vec<Target>,
        cancel: CancellationToken,
    ) -> Result<Vec<AlertOutcome>, OrchestratorError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_alerts.max(1)));
        let targets = Arc::new(targets);

        let mut handles = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let semaphore = Arc::clone(&semaphore);
            let classifier = Arc::clone(&self.classifier);
            let filter = Arc::clone(&self.filter);
            let target_client = Arc::clone(&self.target_client);
            let targets = Arc::clone(&targets);
            let config = self.config;
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                process_alert(
                    &alert,
                    &targets,
                    &classifier,
                    &filter,
                    target_client,
                    config,
                    cancel,
                )
                .await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => return Err(e),
                Err(_join_err) => {
                    // A panicked worker is recorded as a failed outcome for
                    // observability rather than losing the alert silently.
                    // This can't identify which alert failed, so it is
                    // surfaced as a fatal condition upstream instead.
                    return Err(OrchestratorError::ClassificationFatal {
                        alert_name: "unknown".to_string(),
                        source: crate::classify::ClassifierError::Upstream(
                            "worker task panicked".to_string(),
                        ),
                    });
                }
            }
        }

        Ok(outcomes)
    }
}

async fn process_alert(
    alert: &Alert,
    targets: &[Target],
    classifier: &ClassifierGateway,
    filter: &FilterGateway,
    target_client: Arc<dyn TargetClient>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
) -> Result<AlertOutcome, OrchestratorError> {
    // --- Classification stage ---
    let classify_started = Instant::now();
    let classification = match tokio::time::timeout(
        config.classification_timeout,
        classifier.classify(alert),
    )
    .await
    {
        Ok(Ok(c)) => Some(c),
        Ok(Err(e)) => {
            if config.continue_on_error {
                tracing::warn!(alert_name = %alert.alert_name, error = %e, "classification error, continuing with no classification");
                None
            } else {
                return Err(OrchestratorError::ClassificationFatal {
                    alert_name: alert.alert_name.clone(),
                    source: e,
                });
            }
        }
        Err(_elapsed) => {
            if config.continue_on_error {
                tracing::warn!(alert_name = %alert.alert_name, "classification stage budget exceeded, continuing with no classification");
                None
            } else {
                return Err(OrchestratorError::ClassificationFatal {
                    alert_name: alert.alert_name.clone(),
                    source: crate::classify::ClassifierError::Timeout,
                });
            }
        }
    };
    let classification_time = classify_started.elapsed();

    // --- Filtering stage ---
    let decision = tokio::time::timeout(
        config.filtering_timeout,
        filter.decide(alert, classification.as_ref()),
    )
    .await
    .unwrap_or_else(|_elapsed| crate::filter::FilterDecision {
        action: FilterAction::Allow,
        reason: "filter error (default allow)".to_string(),
    });

    if decision.action == FilterAction::Deny {
        return Ok(AlertOutcome {
            fingerprint: alert.fingerprint.clone(),
            alert_name: alert.alert_name.clone(),
            status: AlertOutcomeStatus::Filtered,
            classification,
            classification_time: Some(classification_time),
            filter_action: FilterAction::Deny,
            filter_reason: Some(decision.reason),
            publish_outcomes: Vec::new(),
            error_message: None,
        });
    }

    // --- Publishing stage ---
    let default_classification = classification.clone().unwrap_or_else(|| {
        crate::classify::default_classification(alert, crate::model::ClassificationSource::Default)
    });

    let (publish_outcomes, status) = if targets.is_empty() || !config.publishing_enabled {
        (Vec::new(), AlertOutcomeStatus::Success)
    } else {
        match tokio::time::timeout(
            config.publishing_timeout,
            publish::publish_many(
                target_client,
                alert,
                &default_classification,
                targets,
                config.publish,
                cancel,
            ),
        )
        .await
        {
            Ok((outcomes, summary)) => (outcomes.clone(), status_from_summary(&summary, outcomes.len())),
            Err(_elapsed) => (timed_out_outcomes(targets), AlertOutcomeStatus::Failed),
        }
    };

    Ok(AlertOutcome {
        fingerprint: alert.fingerprint.clone(),
        alert_name: alert.alert_name.clone(),
        status,
        classification,
        classification_time: Some(classification_time),
        filter_action: FilterAction::Allow,
        filter_reason: Some(decision.reason),
        publish_outcomes,
        error_message: None,
    })
}

fn status_from_summary(
    summary: &publish::PublishSummary,
    target_count: usize,
) -> AlertOutcomeStatus {
    if target_count == 0 {
        AlertOutcomeStatus::Success
    } else if summary.failed == 0 {
        AlertOutcomeStatus::Success
    } else if summary.success == 0 {
        AlertOutcomeStatus::Failed
    } else {
        AlertOutcomeStatus::Partial
    }
}

fn timed_out_outcomes(targets: &[Target]) -> Vec<PublishOutcome> {
    targets
        .iter()
        .map(|t| PublishOutcome {
            target_name: t.name.clone(),
            target_type: t.target_type.clone(),
            success: false,
            http_status: None,
            error_code: Some(PublishErrorCode::Timeout),
            error_message: Some("publishing stage budget exceeded".to_string()),
            retry_count: 0,
            duration: Duration::ZERO,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierEngine, ClassifierError, NullClassifier};
    use crate::filter::{AllowAllFilter, FilterDecision, FilterEngine, FilterError};
    use crate::model::{AlertStatus, Classification};
    use crate::publish::TargetClient;
    use crate::retry::PublishFailure;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    fn alert(name: &str) -> Alert {
        Alert {
            fingerprint: format!("fp-{name}"),
            alert_name: name.to_string(),
            status: AlertStatus::Firing,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: None,
        }
    }

    fn target(name: &str) -> Target {
        Target {
            name: name.to_string(),
            target_type: "webhook".to_string(),
            url: "http://example.invalid".to_string(),
            enabled: true,
            auth: None,
        }
    }

    struct DenyFilter;
    impl FilterEngine for DenyFilter {
        fn decide(
            &self,
            _alert: &Alert,
            _classification: Option<&Classification>,
        ) -> Result<FilterDecision, FilterError> {
            Ok(FilterDecision {
                action: FilterAction::Deny,
                reason: "noise".to_string(),
            })
        }
    }

    struct NeverClassifies;
    #[async_trait]
    impl ClassifierEngine for NeverClassifies {
        async fn classify(&self, _alert: &Alert) -> Result<Classification, ClassifierError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    struct AllSucceed;
    #[async_trait]
    impl TargetClient for AllSucceed {
        async fn attempt(
            &self,
            _t: &Target,
            _a: &Alert,
            _c: &Classification,
            _timeout: Duration,
        ) -> Result<u16, PublishFailure> {
            Ok(200)
        }
    }

    struct OneFailsOneSucceeds;
    #[async_trait]
    impl TargetClient for OneFailsOneSucceeds {
        async fn attempt(
            &self,
            t: &Target,
            _a: &Alert,
            _c: &Classification,
            _timeout: Duration,
        ) -> Result<u16, PublishFailure> {
            if t.name == "good" {
                Ok(200)
            } else {
                Ok(500)
            }
        }
    }

    fn orchestrator(
        classifier_enabled: bool,
        filter: Arc<dyn FilterEngine>,
        target_client: Arc<dyn TargetClient>,
    ) -> Orchestrator {
        let classifier = Arc::new(ClassifierGateway::new(
            Arc::new(NullClassifier),
            classifier_enabled,
            Duration::from_secs(5),
            true,
        ));
        let filter = Arc::new(FilterGateway::new(filter, true, Duration::from_secs(1)));
        Orchestrator::new(
            classifier,
            filter,
            target_client,
            OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn denied_alert_is_filtered_before_publishing() {
        let orch = orchestrator(true, Arc::new(DenyFilter), Arc::new(AllSucceed));
        let outcomes = orch
            .run(
                vec![alert("X")],
                vec![target("a")],
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, AlertOutcomeStatus::Filtered);
        assert_eq!(outcomes[0].filter_action, FilterAction::Deny);
        assert!(outcomes[0].publish_outcomes.is_empty());
    }

    #[tokio::test]
    async fn no_targets_yields_success_with_no_publish_outcomes() {
        let orch = orchestrator(true, Arc::new(AllowAllFilter), Arc::new(AllSucceed));
        let outcomes = orch
            .run(vec![alert("X")], vec![], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, AlertOutcomeStatus::Success);
        assert!(outcomes[0].publish_outcomes.is_empty());
    }

    struct PanicIfCalled;
    #[async_trait]
    impl TargetClient for PanicIfCalled {
        async fn attempt(
            &self,
            _t: &Target,
            _a: &Alert,
            _c: &Classification,
            _timeout: Duration,
        ) -> Result<u16, PublishFailure> {
            panic!("publishing stage must not run when publishing_enabled is false");
        }
    }

    #[tokio::test]
    async fn disabled_publishing_yields_success_without_invoking_target_client() {
        let classifier = Arc::new(ClassifierGateway::new(
            Arc::new(NullClassifier),
            true,
            Duration::from_secs(5),
            true,
        ));
        let filter = Arc::new(FilterGateway::new(
            Arc::new(AllowAllFilter),
            true,
            Duration::from_secs(1),
        ));
        let orch = Orchestrator::new(
            classifier,
            filter,
            Arc::new(PanicIfCalled),
            OrchestratorConfig {
                publishing_enabled: false,
                ..OrchestratorConfig::default()
            },
        );
        let outcomes = orch
            .run(
                vec![alert("X")],
                vec![target("a")],
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, AlertOutcomeStatus::Success);
        assert!(outcomes[0].publish_outcomes.is_empty());
    }

    #[tokio::test]
    async fn mixed_target_results_yield_partial_alert_status() {
        let orch = orchestrator(
            true,
            Arc::new(AllowAllFilter),
            Arc::new(OneFailsOneSucceeds),
        );
        let outcomes = orch
            .run(
                vec![alert("X")],
                vec![target("good"), target("bad")],
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, AlertOutcomeStatus::Partial);
    }

    #[tokio::test]
    async fn classification_timeout_with_continue_on_error_still_publishes() {
        let classifier = Arc::new(ClassifierGateway::new(
            Arc::new(NeverClassifies),
            true,
            Duration::from_millis(20),
            false,
        ));
        let filter = Arc::new(FilterGateway::new(
            Arc::new(AllowAllFilter),
            true,
            Duration::from_secs(1),
        ));
        let orch = Orchestrator::new(
            classifier,
            filter,
            Arc::new(AllSucceed),
            OrchestratorConfig {
                continue_on_error: true,
                ..OrchestratorConfig::default()
            },
        );
        let outcomes = orch
            .run(
                vec![alert("X")],
                vec![target("a")],
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, AlertOutcomeStatus::Success);
        assert!(outcomes[0].classification.is_none());
    }

    #[tokio::test]
    async fn classification_timeout_without_continue_on_error_is_fatal() {
        let classifier = Arc::new(ClassifierGateway::new(
            Arc::new(NeverClassifies),
            true,
            Duration::from_millis(20),
            false,
        ));
        let filter = Arc::new(FilterGateway::new(
            Arc::new(AllowAllFilter),
            true,
            Duration::from_secs(1),
        ));
        let orch = Orchestrator::new(
            classifier,
            filter,
            Arc::new(AllSucceed),
            OrchestratorConfig {
                continue_on_error: false,
                ..OrchestratorConfig::default()
            },
        );
        let err = orch
            .run(
                vec![alert("X")],
                vec![target("a")],
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ClassificationFatal { .. }));
    }
}
