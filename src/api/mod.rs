//! JSON REST API
//!
//! Every route lives under `/api`. All processing routes require a bearer
//! token; `/api/health` does not. Unknown routes get a `NOT_FOUND` envelope.

mod auth;
mod error;
mod handlers;
mod params;

pub use auth::{hash_token, Caller, TokenAuthenticator};
pub use error::{ApiError, INTERNAL_MESSAGE};
pub use params::{parse_id, parse_pagination, parse_start_body, PageParams};

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use crate::config::PaginationSection;
use crate::pipeline::{RunOrchestrator, RunQuery};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RunOrchestrator>,
    pub query: Arc<RunQuery>,
    pub auth: Arc<TokenAuthenticator>,
    pub pagination: PaginationSection,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/projects/:project_id/processing/start",
            post(handlers::start_processing),
        )
        .route(
            "/projects/:project_id/processing/runs",
            get(handlers::list_runs),
        )
        .route("/processing/runs/:id", get(handlers::get_run))
        .route("/processing/runs/:id/stages", get(handlers::get_run_stages))
        .route("/processing/runs/:id/cancel", post(handlers::cancel_run));

    Router::new()
        .nest(dataprep_protocol::API_PREFIX, api)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}
