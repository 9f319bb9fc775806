//! API Handlers
use crate::metrics::{encode, metrics};
use crate::middleware::RequestId;
use crate::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chainval_core::value::{ExtensibleNode, TypeTag};
use chainval_core::{ApiVersion, Severity, CHAINVAL_VERSION};
use chainval_rules::Rule;
use chainval_validate::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Parameter name used as the root of every location
    #[serde(default)]
    pub param: Option<String>,
    /// The structured argument, or the chain head when `chain` is set
    #[serde(default)]
    pub argument: Option<ExtensibleNode>,
    /// Validate `argument` as a bare extension chain
    #[serde(default)]
    pub chain: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub request_id: Uuid,
    pub checked_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
pub struct TypeSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<TypeTag>,
    pub fields: usize,
    pub extends: Vec<String>,
    pub introduced: ApiVersion,
}

#[derive(Debug, Serialize)]
pub struct RuleSummary {
    pub id: String,
    pub owner: String,
    pub shape: &'static str,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    pub enabled: bool,
}

impl From<&Rule> for RuleSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id.clone(),
            owner: rule.owner_name.clone(),
            shape: rule.shape.name(),
            severity: rule.severity,
            expression: rule.expression().map(|e| e.source().to_string()),
            enabled: rule.enabled,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn validate(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<ValidateRequest>,
) -> (StatusCode, Json<Value>) {
    let mode = if request.chain { "chain" } else { "argument" };
    let started = Instant::now();

    let outcome = match (request.chain, request.argument.as_ref()) {
        (true, head) => state.validator.validate_chain(head),
        (false, Some(root)) => match &request.param {
            Some(param) => state.validator.validate_named(param, root),
            None => state.validator.validate(root),
        },
        (false, None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "request_id": request_id,
                    "error": "`argument` is required unless `chain` is set",
                })),
            )
        }
    };

    let m = metrics();
    m.duration
        .with_label_values(&[mode])
        .observe(started.elapsed().as_secs_f64());
    m.validations.with_label_values(&[mode]).inc();
    for d in &outcome.diagnostics {
        let severity = d.severity.to_string();
        m.diagnostics.with_label_values(&[severity.as_str()]).inc();
    }
    if outcome.skip_call {
        m.skipped.with_label_values(&[mode]).inc();
    }
    tracing::info!(
        %request_id,
        mode,
        diagnostics = outcome.diagnostics.len(),
        skip_call = outcome.skip_call,
        "validated"
    );

    let response = ValidateResponse {
        request_id,
        checked_at: Utc::now(),
        outcome,
    };
    match serde_json::to_value(&response) {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "request_id": request_id, "error": e.to_string() })),
        ),
    }
}

pub async fn list_types(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let types: Vec<TypeSummary> = state
        .validator
        .registry()
        .iter()
        .map(|d| TypeSummary {
            name: d.name.clone(),
            tag: d.tag,
            fields: d.fields.len(),
            extends: d.extends.clone(),
            introduced: d.introduced,
        })
        .collect();
    (StatusCode::OK, Json(json!({ "types": types })))
}

pub async fn list_rules(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let rules: Vec<RuleSummary> = state.validator.rules().iter().map(RuleSummary::from).collect();
    (StatusCode::OK, Json(json!({ "rules": rules })))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": CHAINVAL_VERSION,
            "types": state.validator.registry().len(),
            "rules": state.validator.rules().len(),
        })),
    )
}

pub async fn metrics_text() -> impl IntoResponse {
    match encode(metrics().registry()) {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
    }
}
