//! Handlers for incident endpoints. Incidents are created by the pipeline,
//! so the API exposes list/get and status updates only.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiState};
use crate::models::{IncidentFilter, IncidentStatus, IncidentUpdate, Severity};
use crate::persistence::traits::AppRepository;

/// Query parameters for the incident list: pagination plus filters.
#[derive(Debug, Deserialize)]
pub struct IncidentListParams {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    page_size: Option<u32>,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    status: Option<IncidentStatus>,
}

/// Lists the user's incidents, newest first.
pub async fn list_incidents(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
    Query(params): Query<IncidentListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 100);
    let filter = IncidentFilter { severity: params.severity, status: params.status };

    let (incidents, total) = state.repo.list_incidents(user_id, &filter, page, page_size).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "incidents": incidents,
            "total": total,
            "page": page,
            "page_size": page_size,
        })),
    ))
}

/// Retrieves one incident by id.
pub async fn get_incident(
    State(state): State<ApiState>,
    Path((user_id, incident_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let incident = state
        .repo
        .get_incident(user_id, incident_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Incident not found".to_string()))?;
    Ok((StatusCode::OK, Json(json!({ "incident": incident }))))
}

/// Applies a status, notes or assignment update to an incident.
pub async fn update_incident(
    State(state): State<ApiState>,
    Path((user_id, incident_id)): Path<(i64, i64)>,
    Json(payload): Json<IncidentUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let incident = state.repo.update_incident(user_id, incident_id, &payload).await?;
    Ok((StatusCode::OK, Json(json!({ "incident": incident }))))
}
