//! chainval API /v1: REST endpoints over a shared [`Validator`]
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use chainval_validate::Validator;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<Validator>,
}

impl AppState {
    pub fn new(validator: Validator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/validate", post(handlers::validate))
        .route("/v1/registry/types", get(handlers::list_types))
        .route("/v1/rules", get(handlers::list_rules))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_text))
        .layer(from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .with_state(state)
}

pub async fn run(addr: &str, validator: Validator) -> anyhow::Result<()> {
    let app = create_app(AppState::new(validator));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("chainval API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
