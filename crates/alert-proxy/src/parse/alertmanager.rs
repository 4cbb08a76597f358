//! Alertmanager v0.25+ webhook payload parsing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detect::Format;
use crate::fingerprint;
use crate::model::{Alert, AlertStatus};

use super::{ConvertError, ParseError, Parser, Webhook, ALERT_NAME_LABEL_KEY};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    pub version: String,
    pub group_key: String,
    #[serde(default)]
    pub truncated_alerts: u32,
    pub status: String,
    pub receiver: String,
    #[serde(default)]
    pub group_labels: HashMap<String, String>,
    #[serde(default)]
    pub common_labels: HashMap<String, String>,
    #[serde(default)]
    pub common_annotations: HashMap<String, String>,
    #[serde(default)]
    pub external_url: String,
    pub alerts: Vec<AlertmanagerAlert>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertmanagerAlert {
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    #[serde(default, rename = "endsAt")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

pub struct AlertmanagerParser;

impl Parser for AlertmanagerParser {
    fn parse(&self, bytes: &[u8]) -> Result<Webhook, ParseError> {
        let payload: AlertmanagerPayload =
            serde_json::from_slice(bytes).map_err(|e| ParseError::Malformed {
                format: Format::Alertmanager,
                message: e.to_string(),
            })?;
        Ok(Webhook::Alertmanager(payload))
    }

    fn convert(&self, webhook: Webhook) -> Result<Vec<Alert>, ConvertError> {
        let Webhook::Alertmanager(payload) = webhook else {
            unreachable!("alertmanager parser received a non-alertmanager webhook")
        };

        payload
            .alerts
            .into_iter()
            .map(|a| convert_alert(a, &payload.group_labels))
            .collect()
    }
}

fn convert_alert(
    alert: AlertmanagerAlert,
    group_labels: &HashMap<String, String>,
) -> Result<Alert, ConvertError> {
    // Alert-level labels take precedence over group labels on collision,
    // mirroring the v2 flattening rule (spec.md §4.2) for consistency even
    // though Alertmanager's own webhook already merges these server-side.
    let mut labels = group_labels.clone();
    labels.extend(alert.labels);

    let alert_name = labels
        .get(ALERT_NAME_LABEL_KEY)
        .filter(|s| !s.is_empty())
        .ok_or(ConvertError::MissingAlertName(ALERT_NAME_LABEL_KEY))?
        .clone();

    let status = match alert.status.as_str() {
        "firing" => AlertStatus::Firing,
        "resolved" => AlertStatus::Resolved,
        other => return Err(ConvertError::InvalidStatus(other.to_string())),
    };

    let ends_at = alert.ends_at.filter(|t| t.timestamp() != 0);

    let fingerprint = match alert.fingerprint.filter(|s| !s.is_empty()) {
        Some(fp) => fp,
        None => fingerprint::compute(&alert_name, &labels),
    };

    Ok(Alert {
        fingerprint,
        alert_name,
        status,
        labels,
        annotations: alert.annotations,
        starts_at: alert.starts_at,
        ends_at,
        generator_url: alert.generator_url,
    })
}
