use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;
use super::{created, ApiError};

pub async fn list_plans(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Plan>>, ApiError> {
    let plans = state.store.list_plans().await?;
    Ok(Json(plans))
}

pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Plan>, ApiError> {
    let plan = state.store.get_plan(id).await?
        .ok_or_else(|| ApiError::not_found("Plan"))?;
    Ok(Json(plan))
}

pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<Plan>), ApiError> {
    req.validate()?;
    let plan = state.store.create_plan(&req).await?;
    tracing::info!("Created plan {} ({}) down to /{}", plan.prefix, plan.id, plan.mask_len);
    Ok(created(plan))
}

pub async fn delete_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_plan(id).await?;
    tracing::info!("Deleted plan {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_layouts(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<i64>,
) -> Result<Json<Vec<Layout>>, ApiError> {
    if state.store.get_plan(plan_id).await?.is_none() {
        return Err(ApiError::not_found("Plan"));
    }
    let layouts = state.store.list_layouts(plan_id).await?;
    Ok(Json(layouts))
}
