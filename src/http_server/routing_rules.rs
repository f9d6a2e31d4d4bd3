//! Handlers for notification routing rule endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use super::{ApiError, ApiState, Pagination};
use crate::models::NewRoutingRule;
use crate::persistence::traits::AppRepository;

/// Creates a routing rule for the user.
pub async fn create_routing_rule(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<NewRoutingRule>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state.repo.create_routing_rule(user_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "routing_rule": rule }))))
}

/// Lists the user's routing rules, paginated.
pub async fn list_routing_rules(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, page_size) = pagination.resolve();
    let (rules, total) = state.repo.list_routing_rules(user_id, page, page_size).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "routing_rules": rules,
            "total": total,
            "page": page,
            "page_size": page_size,
        })),
    ))
}

/// Retrieves one routing rule by id.
pub async fn get_routing_rule(
    State(state): State<ApiState>,
    Path((user_id, routing_rule_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state
        .repo
        .get_routing_rule(user_id, routing_rule_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Routing rule not found".to_string()))?;
    Ok((StatusCode::OK, Json(json!({ "routing_rule": rule }))))
}

/// Replaces a routing rule's configuration.
pub async fn update_routing_rule(
    State(state): State<ApiState>,
    Path((user_id, routing_rule_id)): Path<(i64, i64)>,
    Json(payload): Json<NewRoutingRule>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state.repo.update_routing_rule(user_id, routing_rule_id, &payload).await?;
    Ok((StatusCode::OK, Json(json!({ "routing_rule": rule }))))
}

/// Deletes a routing rule.
pub async fn delete_routing_rule(
    State(state): State<ApiState>,
    Path((user_id, routing_rule_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    state.repo.delete_routing_rule(user_id, routing_rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
