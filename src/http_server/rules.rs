//! Handlers for rule-related endpoints in the HTTP server.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use super::{ApiError, ApiState, Pagination};
use crate::models::{NewRule, RuleUpdate};
use crate::persistence::traits::AppRepository;

/// Creates a new detection rule for the user.
pub async fn create_rule(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<NewRule>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state.repo.create_rule(user_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "rule": rule }))))
}

/// Lists the user's rules, paginated.
pub async fn list_rules(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, page_size) = pagination.resolve();
    let (rules, total) = state.repo.list_rules(user_id, page, page_size).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "rules": rules,
            "total": total,
            "page": page,
            "page_size": page_size,
        })),
    ))
}

/// Retrieves one rule by id.
pub async fn get_rule(
    State(state): State<ApiState>,
    Path((user_id, rule_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state
        .repo
        .get_rule(user_id, rule_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Rule not found".to_string()))?;
    Ok((StatusCode::OK, Json(json!({ "rule": rule }))))
}

/// Applies a partial update to a rule.
pub async fn update_rule(
    State(state): State<ApiState>,
    Path((user_id, rule_id)): Path<(i64, i64)>,
    Json(payload): Json<RuleUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state.repo.update_rule(user_id, rule_id, &payload).await?;
    Ok((StatusCode::OK, Json(json!({ "rule": rule }))))
}

/// Soft-disables a rule. Rules are never hard-deleted.
pub async fn delete_rule(
    State(state): State<ApiState>,
    Path((user_id, rule_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    state.repo.disable_rule(user_id, rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
