//! Format-tagged webhook documents and the parser contract shared by every
//! format. A parser never performs network I/O; `parse` turns bytes into a
//! `Webhook`, `convert` turns a `Webhook` into the normalized `Alert[]`.

pub mod alertmanager;
pub mod prometheus;

use thiserror::Error;

use crate::detect::Format;
use crate::model::Alert;

/// The label key this system treats as the alert's display name, across
/// every supported format's test fixtures and wire shape.
pub const ALERT_NAME_LABEL_KEY: &str = "alert_name-equivalent";

#[derive(Debug, Clone)]
pub enum Webhook {
    Alertmanager(alertmanager::AlertmanagerPayload),
    PrometheusV1(Vec<prometheus::PrometheusAlert>),
    PrometheusV2(prometheus::PrometheusV2Payload),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed {format:?} payload: {message}")]
    Malformed { format: Format, message: String },
    #[error("unsupported format")]
    UnsupportedFormat,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("alert missing required label '{0}'")]
    MissingAlertName(&'static str),
    #[error("alert has unrecognized status/state '{0}'")]
    InvalidStatus(String),
}

pub trait Parser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Webhook, ParseError>;
    fn convert(&self, webhook: Webhook) -> Result<Vec<Alert>, ConvertError>;
}

/// Resolve the parser for a detected format. `Format::Generic` has no
/// parser: detecting it is itself a parse error (see `DESIGN.md`'s
/// resolution of the spec's open question on generic-webhook handling).
pub fn parser_for(format: Format) -> Result<Box<dyn Parser>, ParseError> {
    match format {
        Format::Alertmanager => Ok(Box::new(alertmanager::AlertmanagerParser)),
        Format::PrometheusV1 | Format::PrometheusV2 => Ok(Box::new(prometheus::PrometheusParser)),
        Format::Generic => Err(ParseError::UnsupportedFormat),
    }
}
