//! Format auto-detection over a parsed JSON value. Pure and safe under
//! concurrent invocation — no shared state, no I/O.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Alertmanager,
    PrometheusV1,
    PrometheusV2,
    Generic,
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("empty payload")]
    Empty,
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Detect the wire format of a raw payload.
pub fn detect(bytes: &[u8]) -> Result<Format, DetectError> {
    if bytes.is_empty() {
        return Err(DetectError::Empty);
    }
    let value: Value = serde_json::from_slice(bytes)?;
    Ok(detect_value(&value))
}

fn detect_value(value: &Value) -> Format {
    if let Some(obj) = value.as_object() {
        let present = ["version", "groupKey", "receiver"]
            .iter()
            .filter(|k| obj.get(**k).is_some_and(|v| v.as_str().is_some_and(|s| !s.is_empty())))
            .count();
        if present >= 2 {
            return Format::Alertmanager;
        }
        if let Some(alerts) = obj.get("alerts").and_then(Value::as_array) {
            if let Some(first) = alerts.first() {
                if is_alertmanager_alert_shape(first) {
                    return Format::Alertmanager;
                }
            }
        }
        if let Some(groups) = obj.get("groups").and_then(Value::as_array) {
            if !groups.is_empty() {
                let all_shaped = groups.iter().all(|g| {
                    g.get("labels").and_then(Value::as_object).is_some()
                        && g.get("alerts")
                            .and_then(Value::as_array)
                            .is_some_and(|a| !a.is_empty())
                });
                let first_alert_shaped = groups.first().and_then(|g| {
                    g.get("alerts")
                        .and_then(Value::as_array)
                        .and_then(|a| a.first())
                        .map(is_prometheus_shape)
                });
                if all_shaped && first_alert_shaped == Some(true) {
                    return Format::PrometheusV2;
                }
            }
        }
        return Format::Generic;
    }
    if let Some(arr) = value.as_array() {
        if !arr.is_empty() && arr.first().is_some_and(is_prometheus_shape) {
            return Format::PrometheusV1;
        }
    }
    Format::Generic
}

fn is_alertmanager_alert_shape(alert: &Value) -> bool {
    let status_ok = alert
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s == "firing" || s == "resolved");
    let labels_ok = alert
        .get("labels")
        .and_then(Value::as_object)
        .is_some_and(|m| !m.is_empty());
    status_ok && labels_ok
}

fn is_prometheus_shape(alert: &Value) -> bool {
    let labels_ok = alert
        .get("labels")
        .and_then(Value::as_object)
        .is_some_and(|m| !m.is_empty());
    let state_ok = alert
        .get("state")
        .and_then(Value::as_str)
        .is_some_and(|s| matches!(s, "firing" | "pending" | "inactive"));
    let active_at_ok = alert.get("activeAt").is_some_and(|v| {
        v.as_str().is_some_and(|s| !s.is_empty()) || v.as_i64().is_some_and(|n| n != 0)
    });
    let generator_url_ok = alert
        .get("generatorURL")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    labels_ok && state_ok && active_at_ok && generator_url_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_an_error() {
        assert!(matches!(detect(b""), Err(DetectError::Empty)));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(detect(b"{not json"), Err(DetectError::InvalidJson(_))));
    }

    #[test]
    fn detects_alertmanager_by_top_level_fields() {
        let body = br#"{"version":"4","groupKey":"g","receiver":"r","status":"firing","alerts":[]}"#;
        assert_eq!(detect(body).unwrap(), Format::Alertmanager);
    }

    #[test]
    fn detects_alertmanager_by_alert_shape() {
        let body = br#"{"alerts":[{"status":"firing","labels":{"a":"b"}}]}"#;
        assert_eq!(detect(body).unwrap(), Format::Alertmanager);
    }

    #[test]
    fn detects_prometheus_v1_array() {
        let body = br#"[{"labels":{"a":"b"},"state":"firing","activeAt":"2025-01-01T00:00:00Z","generatorURL":"http://p:9090"}]"#;
        assert_eq!(detect(body).unwrap(), Format::PrometheusV1);
    }

    #[test]
    fn detects_prometheus_v2_groups() {
        let body = br#"{"groups":[{"labels":{"job":"api"},"alerts":[{"labels":{"a":"b"},"state":"firing","activeAt":"2025-01-01T00:00:00Z","generatorURL":"http://p:9090"}]}]}"#;
        assert_eq!(detect(body).unwrap(), Format::PrometheusV2);
    }

    #[test]
    fn unrecognized_shape_is_generic() {
        let body = br#"{"hello":"world"}"#;
        assert_eq!(detect(body).unwrap(), Format::Generic);
    }

    #[test]
    fn empty_array_is_generic() {
        assert_eq!(detect(b"[]").unwrap(), Format::Generic);
    }
}
