//! Prometheus v1 (flat array) and v2 (grouped) webhook payload parsing.
//! Both variants share the same per-alert shape and state-mapping rules,
//! so one `Parser` impl handles both once the detector has distinguished
//! them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detect::Format;
use crate::fingerprint;
use crate::model::{Alert, AlertStatus, PROMETHEUS_VALUE_ANNOTATION};

use super::{ConvertError, ParseError, Parser, Webhook, ALERT_NAME_LABEL_KEY};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrometheusAlert {
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub state: String,
    #[serde(rename = "activeAt")]
    pub active_at: DateTime<Utc>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrometheusGroup {
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub alerts: Vec<PrometheusAlert>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrometheusV2Payload {
    #[serde(default)]
    pub groups: Vec<PrometheusGroup>,
}

pub struct PrometheusParser;

impl Parser for PrometheusParser {
    fn parse(&self, bytes: &[u8]) -> Result<Webhook, ParseError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| ParseError::Malformed {
            format: Format::PrometheusV1,
            message: e.to_string(),
        })?;

        if value.is_array() {
            let alerts: Vec<PrometheusAlert> =
                serde_json::from_value(value).map_err(|e| ParseError::Malformed {
                    format: Format::PrometheusV1,
                    message: e.to_string(),
                })?;
            Ok(Webhook::PrometheusV1(alerts))
        } else {
            let payload: PrometheusV2Payload =
                serde_json::from_value(value).map_err(|e| ParseError::Malformed {
                    format: Format::PrometheusV2,
                    message: e.to_string(),
                })?;
            Ok(Webhook::PrometheusV2(payload))
        }
    }

    fn convert(&self, webhook: Webhook) -> Result<Vec<Alert>, ConvertError> {
        match webhook {
            Webhook::PrometheusV1(alerts) => alerts
                .into_iter()
                .map(|a| convert_alert(a, &HashMap::new()))
                .collect(),
            Webhook::PrometheusV2(payload) => payload
                .groups
                .into_iter()
                .flat_map(|g| {
                    let group_labels = g.labels;
                    g.alerts
                        .into_iter()
                        .map(move |a| convert_alert(a, &group_labels))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Webhook::Alertmanager(_) => {
                unreachable!("prometheus parser received an alertmanager webhook")
            }
        }
    }
}

fn convert_alert(
    alert: PrometheusAlert,
    group_labels: &HashMap<String, String>,
) -> Result<Alert, ConvertError> {
    // Alert labels override group labels on key collision (spec.md §4.2, §8 invariant 6).
    let mut labels = group_labels.clone();
    labels.extend(alert.labels);

    let alert_name = labels
        .get(ALERT_NAME_LABEL_KEY)
        .filter(|s| !s.is_empty())
        .ok_or(ConvertError::MissingAlertName(ALERT_NAME_LABEL_KEY))?
        .clone();

    let status = match alert.state.as_str() {
        "firing" | "pending" => AlertStatus::Firing,
        "inactive" => AlertStatus::Resolved,
        other => return Err(ConvertError::InvalidStatus(other.to_string())),
    };

    let mut annotations = HashMap::new();
    if let Some(value) = alert.value {
        annotations.insert(PROMETHEUS_VALUE_ANNOTATION.to_string(), value.to_string());
    }

    let fingerprint = fingerprint::compute(&alert_name, &labels);

    Ok(Alert {
        fingerprint,
        alert_name,
        status,
        labels,
        annotations,
        starts_at: alert.active_at,
        ends_at: None,
        generator_url: alert.generator_url,
    })
}
