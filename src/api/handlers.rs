use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use dataprep_protocol::{PaginatedEnvelope, Pagination, SuccessEnvelope};
use serde_json::{json, Value};

use super::auth::Caller;
use super::error::ApiError;
use super::params::{parse_id, parse_pagination, parse_start_body};
use super::AppState;
use crate::state::{ProcessingRun, ProcessingStage};

type ApiResult<T> = Result<T, ApiError>;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub async fn start_processing(
    State(state): State<AppState>,
    caller: Caller,
    Path(project_id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SuccessEnvelope<ProcessingRun>>)> {
    let project_id = parse_id(&project_id, "projectId")?;
    let quality_settings = parse_start_body(&body)?;

    let run = state.orchestrator.start_processing(
        project_id,
        caller.organisation_id,
        caller.user_id,
        quality_settings,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(SuccessEnvelope::new(run))))
}

pub async fn list_runs(
    State(state): State<AppState>,
    caller: Caller,
    Path(project_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<PaginatedEnvelope<ProcessingRun>>> {
    let project_id = parse_id(&project_id, "projectId")?;
    let params = parse_pagination(&query, &state.pagination)?;

    let page = state.query.list_runs(
        project_id,
        caller.organisation_id,
        params.page,
        params.limit,
    )
    .await?;
    let pagination = Pagination::new(page.page, page.limit, page.total);
    Ok(Json(PaginatedEnvelope::new(page.runs, pagination)))
}

pub async fn get_run(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessEnvelope<ProcessingRun>>> {
    let run_id = parse_id(&id, "id")?;
    let run = state.query.get_run(run_id, caller.organisation_id).await?;
    Ok(Json(SuccessEnvelope::new(run)))
}

pub async fn get_run_stages(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessEnvelope<Vec<ProcessingStage>>>> {
    let run_id = parse_id(&id, "id")?;
    let stages = state.query.get_run_stages(run_id, caller.organisation_id).await?;
    Ok(Json(SuccessEnvelope::new(stages)))
}

pub async fn cancel_run(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessEnvelope<ProcessingRun>>> {
    let run_id = parse_id(&id, "id")?;
    let run = state.query.cancel_run(run_id, caller.organisation_id).await?;
    Ok(Json(SuccessEnvelope::new(run)))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route {} not found", uri.path()))
}
