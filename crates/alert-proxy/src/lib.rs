//! Alert-proxy webhook ingestion core.
//!
//! Accepts alert batches from monitoring producers (Prometheus direct and
//! Alertmanager), normalizes them to a common internal model, enriches each
//! alert with a classification, applies allow/deny filtering, and fans out
//! the surviving alerts in parallel to downstream notification targets.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod model;
pub mod orchestrator;
pub mod parse;
pub mod publish;
pub mod retry;
pub mod sanitize;
pub mod server;
pub mod targets;
pub mod validate;

pub use config::Config;
pub use error::ApiError;
pub use server::{build_router, AppState};
