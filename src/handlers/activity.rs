// src/handlers/activity.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError, models::activity::ActivityParams, services::activity::ActivityAggregator,
};

/// Returns the bounded "recent activity" summary: up to 15 events from the
/// last 7 days across attempts, registrations and exam creations.
/// Admin only.
pub async fn recent_activity(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let events = ActivityAggregator::from_pool(pool).recent().await?;

    Ok(Json(json!({ "data": events })))
}

/// Returns one page of the merged activity feed with pagination metadata.
/// Accepts `search`, `category`, `window_days`, `page` and `page_size`.
/// Admin only.
pub async fn list_activity(
    State(pool): State<PgPool>,
    Query(params): Query<ActivityParams>,
) -> Result<impl IntoResponse, AppError> {
    let (events, pagination) = ActivityAggregator::from_pool(pool).page(&params).await?;

    Ok(Json(json!({
        "data": events,
        "pagination": pagination,
    })))
}
