//! Structural and semantic validation over the normalized `Alert[]`.
//! Fail-soft internally (every alert is checked and every error collected),
//! fail-hard externally (the server layer turns any error into a 400).

use chrono::{Duration as ChronoDuration, Utc};
use std::net::IpAddr;
use url::{Host, Url};

use crate::model::Alert;
use crate::parse::ALERT_NAME_LABEL_KEY;

/// Clock-skew tolerance for `starts_at` in the future.
const MAX_CLOCK_SKEW: ChronoDuration = ChronoDuration::minutes(5);

const LABEL_KEY_PATTERN_DESC: &str = "[A-Za-z_][A-Za-z0-9_]*";

#[derive(Debug, Clone)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub tag: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

pub struct Validator {
    pub block_private_ips: bool,
    pub require_generator_url: bool,
}

impl Validator {
    #[must_use]
    pub fn new(block_private_ips: bool, require_generator_url: bool) -> Self {
        Self {
            block_private_ips,
            require_generator_url,
        }
    }

    #[must_use]
    pub fn validate(&self, alerts: &[Alert]) -> ValidationResult {
        let mut errors = Vec::new();

        if alerts.is_empty() {
            errors.push(FieldError {
                field: "alerts".to_string(),
                message: "alerts must not be empty".to_string(),
                tag: "required".to_string(),
                value: None,
            });
        }

        for (idx, alert) in alerts.iter().enumerate() {
            self.validate_alert(idx, alert, &mut errors);
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
        }
    }

    fn validate_alert(&self, idx: usize, alert: &Alert, errors: &mut Vec<FieldError>) {
        let prefix = format!("alerts[{idx}]");

        if alert.alert_name.is_empty() {
            errors.push(FieldError {
                field: format!("{prefix}.labels.{ALERT_NAME_LABEL_KEY}"),
                message: "alert_name must be non-empty".to_string(),
                tag: "required".to_string(),
                value: None,
            });
        }

        for key in alert.labels.keys() {
            // The canonical alert-name key is exempt from the label-key
            // pattern: it is a reserved, system-assigned key (not a
            // user-supplied label), and its hyphenated form predates this
            // check in every producer's wire shape.
            if key != ALERT_NAME_LABEL_KEY && !is_valid_label_key(key) {
                errors.push(FieldError {
                    field: format!("{prefix}.labels.{key}"),
                    message: format!("label key must match {LABEL_KEY_PATTERN_DESC}"),
                    tag: "pattern".to_string(),
                    value: Some(key.clone()),
                });
            }
        }
        for (key, value) in &alert.labels {
            if value.is_empty() {
                errors.push(FieldError {
                    field: format!("{prefix}.labels.{key}"),
                    message: "label value must be non-empty".to_string(),
                    tag: "required".to_string(),
                    value: None,
                });
            }
        }

        let skew = alert.starts_at - Utc::now();
        if skew > MAX_CLOCK_SKEW {
            errors.push(FieldError {
                field: format!("{prefix}.starts_at"),
                message: "starts_at is more than 5 minutes in the future".to_string(),
                tag: "clock_skew".to_string(),
                value: Some(alert.starts_at.to_rfc3339()),
            });
        }

        if let Some(ends_at) = alert.ends_at {
            if ends_at < alert.starts_at {
                errors.push(FieldError {
                    field: format!("{prefix}.ends_at"),
                    message: "ends_at must not be before starts_at".to_string(),
                    tag: "ordering".to_string(),
                    value: Some(ends_at.to_rfc3339()),
                });
            }
        }

        match &alert.generator_url {
            Some(raw) => self.validate_url(&format!("{prefix}.generator_url"), raw, errors),
            None if self.require_generator_url => {
                errors.push(FieldError {
                    field: format!("{prefix}.generator_url"),
                    message: "generator_url is required".to_string(),
                    tag: "required".to_string(),
                    value: None,
                });
            }
            None => {}
        }
    }

    fn validate_url(&self, field: &str, raw: &str, errors: &mut Vec<FieldError>) {
        let Ok(url) = Url::parse(raw) else {
            errors.push(FieldError {
                field: field.to_string(),
                message: "must be an absolute URL".to_string(),
                tag: "url".to_string(),
                value: Some(raw.to_string()),
            });
            return;
        };

        if url.scheme() != "http" && url.scheme() != "https" {
            errors.push(FieldError {
                field: field.to_string(),
                message: "scheme must be http or https".to_string(),
                tag: "url_scheme".to_string(),
                value: Some(raw.to_string()),
            });
            return;
        }

        if self.block_private_ips {
            if let Some(host) = url.host() {
                if is_unsafe_host(&host) {
                    errors.push(FieldError {
                        field: field.to_string(),
                        message: "host resolves to a private, loopback, or link-local address"
                            .to_string(),
                        tag: "url_host_unsafe".to_string(),
                        value: Some(raw.to_string()),
                    });
                }
            }
        }
    }
}

fn is_valid_label_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_unsafe_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(d) => *d == "localhost",
        Host::Ipv4(ip) => is_unsafe_ip(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_unsafe_ip(IpAddr::V6(*ip)),
    }
}

fn is_unsafe_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local() || v4.is_private(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}
