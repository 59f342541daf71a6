/// HTTP request handlers
use crate::domain::{
    BatchReport, Health, ObservationFilter, ObservationUpload, RowOutcome, RowResult, Stats,
};
use crate::errors::{ApiError, ApiResult};
use crate::services::ObservationService;
use axum::{
    extract::{Path, Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub observation_service: Arc<ObservationService>,
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Submit a single observation
pub async fn submit_observation(
    State(state): State<AppState>,
    Json(upload): Json<ObservationUpload>,
) -> ApiResult<Json<SuccessResponse<RowResult>>> {
    let row = state.observation_service.submit(upload).await;
    match row.outcome {
        RowOutcome::Rejected { reason, message } => Err(ApiError::Rejected { reason, message }),
        RowOutcome::StorageFailed { message } => Err(ApiError::Internal(message)),
        RowOutcome::Accepted { .. } => Ok(Json(SuccessResponse::new(row))),
    }
}

/// Bulk CSV upload; the body is the CSV text
pub async fn upload_observations(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<SuccessResponse<BatchReport>>> {
    if body.trim().is_empty() {
        return Err(ApiError::InvalidInput("empty upload".to_string()));
    }
    let report = state.observation_service.process_upload(&body).await;
    Ok(Json(SuccessResponse::new(report)))
}

/// Download matching observations as CSV
pub async fn export_observations(
    State(state): State<AppState>,
    Query(filter): Query<ObservationFilter>,
) -> ApiResult<impl IntoResponse> {
    let (file_name, bytes) = state.observation_service.export(&filter).await?;
    Ok((
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    ))
}

#[derive(Deserialize)]
pub struct IdsParams {
    /// Comma-separated observation ids
    pub ids: String,
}

fn parse_ids(raw: &str) -> ApiResult<Vec<i64>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ApiError::InvalidInput(format!("bad observation id: {}", s)))
        })
        .collect::<ApiResult<Vec<i64>>>()?;
    if ids.is_empty() {
        return Err(ApiError::InvalidInput("no observation ids given".to_string()));
    }
    Ok(ids)
}

/// Download id, satellite and time for a list of observations
pub async fn export_observation_ids(
    State(state): State<AppState>,
    Query(params): Query<IdsParams>,
) -> ApiResult<impl IntoResponse> {
    let ids = parse_ids(&params.ids)?;
    let (file_name, bytes) = state.observation_service.export_ids(&ids).await?;
    Ok((
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    ))
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<SuccessResponse<Stats>>> {
    let stats = state.observation_service.stats().await?;
    Ok(Json(SuccessResponse::new(stats)))
}

/// Current name for a catalog number
pub async fn names_from_norad_id(
    Path(catalog_number): Path<u32>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    match state.observation_service.current_name(catalog_number).await {
        Some(name) => Ok(Json(json!(SuccessResponse::new(json!({
            "norad_id": catalog_number,
            "name": name
        }))))),
        None => Err(ApiError::NotFound(format!(
            "no current name for catalog number {}",
            catalog_number
        ))),
    }
}

#[derive(Deserialize)]
pub struct NameParams {
    pub name: String,
}

/// Current catalog number for a satellite name
pub async fn norad_ids_from_name(
    Query(params): Query<NameParams>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let name = params.name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidInput("name is required".to_string()));
    }
    match state.observation_service.current_catalog_number(name).await {
        Some(catalog_number) => Ok(Json(json!(SuccessResponse::new(json!({
            "name": name,
            "norad_id": catalog_number
        }))))),
        None => Err(ApiError::NotFound(format!(
            "no current catalog number for {}",
            name
        ))),
    }
}
