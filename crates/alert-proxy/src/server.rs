//! HTTP server: the `/webhook/proxy` ingest endpoint plus `/healthz` and
//! `/readyz`, wired the way the teacher's `integrations::server` and
//! `healer::platform::server` build their routers (state extractor, tower
//! layering, `tracing` spans per request).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::classify::{ClassifierGateway, NullClassifier};
use crate::config::Config;
use crate::detect::{self, Format};
use crate::error::{ApiError, ErrorDetail};
use crate::filter::{AllowAllFilter, FilterGateway, StaticRulesFilter};
use crate::model::{OverallStatus, Response as ProxyResponse};
use crate::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
use crate::parse::{self, ParseError};
use crate::publish::{HttpTargetClient, PublishConfig, TargetClient};
use crate::targets::TargetRegistry;
use crate::validate::Validator;

/// Shared application state built once at startup and cloned (cheaply, via
/// `Arc`) into every request's extractor.
pub struct AppState {
    pub config: Config,
    pub registry: TargetRegistry,
    pub orchestrator: Arc<Orchestrator>,
    ready: AtomicBool,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, registry: TargetRegistry) -> Self {
        let target_client: Arc<dyn TargetClient> = Arc::new(HttpTargetClient::new());
        let classifier = Arc::new(ClassifierGateway::new(
            Arc::new(NullClassifier),
            config.enable_classification,
            config.classification_timeout,
            config.classification_fallback_enabled,
        ));
        let filter_engine: Arc<dyn crate::filter::FilterEngine> = match &config.filtering_rules_file {
            Some(path) => match StaticRulesFilter::load_from_file(path, config.filtering_default_action) {
                Ok(loaded) => Arc::new(loaded),
                Err(e) => {
                    tracing::warn!(error = %e, path = %path, "failed to load filtering rules file, defaulting to allow-all");
                    Arc::new(AllowAllFilter)
                }
            },
            None => Arc::new(StaticRulesFilter::new(Vec::new(), config.filtering_default_action)),
        };
        let filter = Arc::new(FilterGateway::new(
            filter_engine,
            config.enable_filtering,
            config.filtering_timeout,
        ));

        let orchestrator_config = OrchestratorConfig {
            classification_timeout: config.classification_timeout,
            filtering_timeout: config.filtering_timeout,
            publishing_timeout: config.publishing_timeout,
            continue_on_error: config.continue_on_error,
            max_concurrent_alerts: config.max_concurrent_alerts,
            publishing_enabled: config.enable_publishing,
            publish: PublishConfig {
                max_publishing_targets: config.max_publishing_targets,
                timeout_per_target: config.publishing_timeout_per_target,
                retry_enabled: config.publishing_retry_enabled,
                retry_max_attempts: config.publishing_retry_max_attempts,
                ..PublishConfig::default()
            },
        };

        Self {
            config,
            registry,
            orchestrator: Arc::new(Orchestrator::new(
                classifier,
                filter,
                target_client,
                orchestrator_config,
            )),
            ready: AtomicBool::new(false),
        }
    }

    /// Build state from pre-assembled components, bypassing the
    /// `NullClassifier`/`HttpTargetClient` defaults `new` wires in. Used by
    /// integration tests that need to inject a classifier or target client
    /// double (e.g. a classifier that never returns, to exercise the
    /// request-deadline path).
    #[must_use]
    pub fn from_components(
        config: Config,
        registry: TargetRegistry,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            config,
            registry,
            orchestrator,
            ready: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Build the alert-proxy router. `RequestBodyLimitLayer` enforces the hard
/// cap before axum buffers beyond it; the handler separately enforces the
/// configured (possibly smaller) `max_request_size` for the documented
/// `PAYLOAD_TOO_LARGE` JSON error body.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/proxy", post(webhook_proxy))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(RequestBodyLimitLayer::new(
            crate::config::MAX_REQUEST_SIZE_HARD_CAP,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    match headers.get(header::CONTENT_TYPE) {
        None => true,
        Some(value) => value
            .to_str()
            .map(|s| s.split(';').next().unwrap_or("").trim() == "application/json")
            .unwrap_or(false),
    }
}

#[instrument(skip(state, headers, body))]
async fn webhook_proxy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ProxyResponse>), ApiError> {
    let request_id = request_id(&headers);
    let started = Instant::now();

    if !is_json_content_type(&headers) {
        return Err(ApiError::UnsupportedMediaType {
            request_id: request_id.clone(),
        });
    }

    if body.len() > state.config.max_request_size {
        return Err(ApiError::PayloadTooLarge {
            request_id: request_id.clone(),
        });
    }

    let format = detect::detect(&body).map_err(|e| {
        ApiError::Validation {
            details: vec![ErrorDetail {
                field: "body".to_string(),
                error: e.to_string(),
            }],
            request_id: request_id.clone(),
        }
    })?;

    // Generic webhooks are rejected explicitly rather than silently
    // degraded to Alertmanager parsing (DESIGN.md's resolution of
    // spec.md §9's open question).
    if format == Format::Generic {
        return Err(ApiError::Validation {
            details: vec![ErrorDetail {
                field: "body".to_string(),
                error: "unrecognized webhook format".to_string(),
            }],
            request_id: request_id.clone(),
        });
    }

    let parser = parse::parser_for(format).map_err(|e| parse_error_to_api(e, &request_id))?;
    let webhook = parser
        .parse(&body)
        .map_err(|e| parse_error_to_api(e, &request_id))?;
    let alerts = parser.convert(webhook).map_err(|e| ApiError::Validation {
        details: vec![ErrorDetail {
            field: "alerts".to_string(),
            error: e.to_string(),
        }],
        request_id: request_id.clone(),
    })?;

    if alerts.len() > state.config.max_alerts_per_req {
        return Err(ApiError::Validation {
            details: vec![ErrorDetail {
                field: "alerts".to_string(),
                error: format!(
                    "request carries {} alerts, exceeding max_alerts_per_req ({})",
                    alerts.len(),
                    state.config.max_alerts_per_req
                ),
            }],
            request_id: request_id.clone(),
        });
    }

    let validator = Validator::new(state.config.block_private_ips, format != Format::Alertmanager);
    let validation = validator.validate(&alerts);
    if !validation.valid {
        let details = validation
            .errors
            .into_iter()
            .map(|e| ErrorDetail {
                field: e.field,
                error: e.message,
            })
            .collect();
        return Err(ApiError::Validation {
            details,
            request_id: request_id.clone(),
        });
    }

    let received = alerts.len();
    let targets = state.registry.enabled_targets();

    let cancel = CancellationToken::new();
    let remaining = state
        .config
        .request_timeout
        .saturating_sub(started.elapsed());
    let timer_cancel = cancel.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(remaining).await;
        timer_cancel.cancel();
    });

    let outcomes = tokio::time::timeout(
        remaining,
        state.orchestrator.run(alerts, targets, cancel),
    )
    .await;
    timer.abort();

    let outcomes = match outcomes {
        Ok(Ok(outcomes)) => outcomes,
        Ok(Err(OrchestratorError::ClassificationFatal { alert_name, source })) => {
            warn!(request_id = %request_id, alert_name = %alert_name, error = %source, "orchestrator fatal error");
            return Err(ApiError::Internal {
                message: format!("classification failed for '{alert_name}': {source}"),
                request_id: request_id.clone(),
            });
        }
        Err(_elapsed) => {
            warn!(request_id = %request_id, "request deadline exceeded before response");
            return Err(ApiError::Timeout {
                request_id: request_id.clone(),
            });
        }
    };

    let response = aggregate(received, outcomes, started.elapsed(), request_id);
    let status = match response.overall_status {
        OverallStatus::Success => StatusCode::OK,
        OverallStatus::Partial => StatusCode::from_u16(207).unwrap_or(StatusCode::OK),
        OverallStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    };

    info!(
        request_id = %response.request_id,
        received = response.counts.received,
        processed = response.counts.processed,
        filtered = response.counts.filtered,
        failed = response.counts.failed,
        overall_status = ?response.overall_status,
        "request processed"
    );

    Ok((status, Json(response)))
}

fn parse_error_to_api(err: ParseError, request_id: &str) -> ApiError {
    ApiError::Validation {
        details: vec![ErrorDetail {
            field: "body".to_string(),
            error: err.to_string(),
        }],
        request_id: request_id.to_string(),
    }
}
