// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{attempt::ExamAttempt, exam::{CreateExamRequest, Exam}},
    services::replication::{ExamDraft, ReplicationEngine, insert_exam, load_exam_tree},
    utils::jwt::Claims,
};

/// Query parameters for listing exams.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub q: Option<String>,
}

/// Lists all exams, optionally filtered by status and search keyword.
/// Soft-deleted exams are never listed.
pub async fn list_exams(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    // Prepare search pattern
    let search_pattern = params.q.map(|k| format!("%{}%", k));

    let exams = sqlx::query_as::<_, Exam>(
        "SELECT id, code, title, description, status, duration_minutes, \
                created_by, created_at, updated_at, deleted_at \
         FROM exams \
         WHERE deleted_at IS NULL \
           AND ($1::TEXT IS NULL OR status = $1) \
           AND ($2::TEXT IS NULL OR title ILIKE $2) \
         ORDER BY created_at DESC",
    )
    .bind(params.status)
    .bind(search_pattern)
    .fetch_all(&pool)
    .await?;

    Ok(Json(exams))
}

/// Retrieves a single exam by ID with its sections and question links.
pub async fn get_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let tree = load_exam_tree(&pool, id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    Ok(Json(tree))
}

/// Creates a new exam in draft status with a freshly generated code.
/// Admin only.
pub async fn create_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let created_by = claims.sub.parse::<i64>().ok();

    let mut tx = pool.begin().await?;
    let exam_id = insert_exam(&mut tx, "new exam", |code| {
        ExamDraft::new(
            code,
            payload.title.clone(),
            payload.description.clone(),
            payload.duration_minutes,
            created_by,
        )
    })
    .await?;
    tx.commit().await?;

    let exam = sqlx::query_as::<_, Exam>(
        "SELECT id, code, title, description, status, duration_minutes, \
                created_by, created_at, updated_at, deleted_at \
         FROM exams WHERE id = $1",
    )
    .bind(exam_id)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(exam)))
}

/// Duplicates an exam together with its sections and question links.
/// The copy gets a fresh code, a "(Copy)" title marker and draft status.
/// Admin only.
pub async fn duplicate_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let tree = ReplicationEngine::new(pool).duplicate_exam(id).await?;

    Ok((StatusCode::CREATED, Json(tree)))
}

/// Starts a new attempt on a published exam for the authenticated user.
/// Each attempt feeds the activity feed's attempt source.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM exams WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    if status != "published" {
        return Err(AppError::BadRequest(
            "Exam is not open for attempts".to_string(),
        ));
    }

    let attempt = sqlx::query_as::<_, ExamAttempt>(
        "INSERT INTO exam_attempts (exam_id, user_id, status) \
         VALUES ($1, $2, 'in_progress') \
         RETURNING id, exam_id, user_id, status, score, created_at",
    )
    .bind(id)
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to start attempt on exam {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(attempt)))
}
