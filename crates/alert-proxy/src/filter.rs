//! Filter Engine: allow/deny decision given an alert and its classification.
//! Rules come from an external, opaque rule source. Fail-open on error or
//! timeout — the core would rather over-deliver than silently drop alerts
//! because the filtering capability misbehaved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Alert, Classification, FilterAction};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter engine error: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone)]
pub struct FilterDecision {
    pub action: FilterAction,
    pub reason: String,
}

pub trait FilterEngine: Send + Sync {
    fn decide(
        &self,
        alert: &Alert,
        classification: Option<&Classification>,
    ) -> Result<FilterDecision, FilterError>;
}

/// Admits every alert. Used when no rule source is configured.
pub struct AllowAllFilter;

impl FilterEngine for AllowAllFilter {
    fn decide(
        &self,
        _alert: &Alert,
        _classification: Option<&Classification>,
    ) -> Result<FilterDecision, FilterError> {
        Ok(FilterDecision {
            action: FilterAction::Allow,
            reason: "no rules configured".to_string(),
        })
    }
}

/// A label-match allow/deny rule loaded from `filtering.rules_file`.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub label: String,
    pub value: String,
    pub action: FilterAction,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum RulesFileError {
    #[error("failed to read filtering rules file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse filtering rules file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Evaluates a small ordered list of label-match rules, falling back to a
/// configured default action when none match. The concrete stand-in for the
/// "external rule source" spec.md leaves opaque.
pub struct StaticRulesFilter {
    rules: Vec<Rule>,
    default_action: FilterAction,
}

impl StaticRulesFilter {
    #[must_use]
    pub fn new(rules: Vec<Rule>, default_action: FilterAction) -> Self {
        Self {
            rules,
            default_action,
        }
    }

    #[must_use]
    pub fn from_labels(labels: &HashMap<String, String>, default_action: FilterAction) -> Self {
        let rules = labels
            .iter()
            .map(|(label, value)| Rule {
                label: label.clone(),
                value: value.clone(),
                action: FilterAction::Deny,
                reason: format!("matched rule {label}={value}"),
            })
            .collect();
        Self::new(rules, default_action)
    }

    /// Load a YAML list of `Rule`s from `filtering.rules_file`, same
    /// loading convention as the target registry's YAML file.
    pub fn load_from_file(path: &str, default_action: FilterAction) -> Result<Self, RulesFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RulesFileError::Io {
            path: path.to_string(),
            source,
        })?;
        let rules: Vec<Rule> =
            serde_yaml::from_str(&contents).map_err(|source| RulesFileError::Parse {
                path: path.to_string(),
                source,
            })?;
        Ok(Self::new(rules, default_action))
    }
}

impl FilterEngine for StaticRulesFilter {
    fn decide(
        &self,
        alert: &Alert,
        _classification: Option<&Classification>,
    ) -> Result<FilterDecision, FilterError> {
        for rule in &self.rules {
            if alert.labels.get(&rule.label).is_some_and(|v| v == &rule.value) {
                return Ok(FilterDecision {
                    action: rule.action,
                    reason: rule.reason.clone(),
                });
            }
        }
        Ok(FilterDecision {
            action: self.default_action,
            reason: "default action".to_string(),
        })
    }
}

pub struct FilterGateway {
    engine: Arc<dyn FilterEngine>,
    enabled: bool,
    timeout: Duration,
}

impl FilterGateway {
    #[must_use]
    pub fn new(engine: Arc<dyn FilterEngine>, enabled: bool, timeout: Duration) -> Self {
        Self {
            engine,
            enabled,
            timeout,
        }
    }

    pub async fn decide(
        &self,
        alert: &Alert,
        classification: Option<&Classification>,
    ) -> FilterDecision {
        if !self.enabled {
            return FilterDecision {
                action: FilterAction::Allow,
                reason: "filtering disabled".to_string(),
            };
        }

        let engine = self.engine.clone();
        let alert = alert.clone();
        let classification = classification.cloned();
        let call = tokio::task::spawn_blocking(move || {
            engine.decide(&alert, classification.as_ref())
        });

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(decision))) => decision,
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "filter engine error, failing open");
                FilterDecision {
                    action: FilterAction::Allow,
                    reason: "filter error (default allow)".to_string(),
                }
            }
            Ok(Err(join_err)) => {
                tracing::warn!(error = %join_err, "filter engine task panicked, failing open");
                FilterDecision {
                    action: FilterAction::Allow,
                    reason: "filter error (default allow)".to_string(),
                }
            }
            Err(_) => {
                tracing::warn!("filter engine timed out, failing open");
                FilterDecision {
                    action: FilterAction::Allow,
                    reason: "filter error (default allow)".to_string(),
                }
            }
        }
    }
}
