use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::planning::get_net_nodes_list;
use crate::AppState;
use super::{created, ApiError};

pub async fn create_layout(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<i64>,
    Json(req): Json<LayoutRequest>,
) -> Result<(StatusCode, Json<Layout>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let mut layout = Layout::new(plan_id, req);
    let mut tx = state.store.begin().await?;
    layout.save(&mut tx).await?;
    tx.commit().await?;
    Ok(created(layout))
}

pub async fn get_layout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Layout>, ApiError> {
    let mut tx = state.store.begin().await?;
    let layout = Layout::load(&mut tx, id).await?;
    tx.commit().await?;
    Ok(Json(layout))
}

pub async fn update_layout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<LayoutRequest>,
) -> Result<Json<Layout>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let mut tx = state.store.begin().await?;
    let mut layout = Layout::load(&mut tx, id).await?;
    layout.apply(req);
    layout.update(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(layout))
}

pub async fn delete_layout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.store.begin().await?;
    let layout = Layout::load(&mut tx, id).await?;
    layout.delete(&mut tx).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Usage report; `family` defaults to the plan's own
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Vec<NetNode>>, ApiError> {
    let mut tx = state.store.begin().await?;
    let mut layout = Layout::load(&mut tx, id).await?;
    tx.commit().await?;

    let plan = state.store.get_plan(layout.plan_id).await?
        .ok_or_else(|| ApiError::not_found("Plan"))?;
    let family = match query.family {
        Some(family) => family,
        None => plan.family()?,
    };
    let report = get_net_nodes_list(&plan, &mut layout, family)?;
    Ok(Json(report))
}
