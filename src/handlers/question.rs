// src/handlers/question.rs

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
    models::question::{CreateQuestionRequest, Question},
    services::replication::{
        QuestionDraft, ReplicationEngine, insert_question, load_question_tree,
    },
    utils::jwt::Claims,
};

/// Query parameters for listing questions.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub question_type: Option<String>,
    pub q: Option<String>,
}

/// Lists questions, optionally filtered by type and search keyword.
/// Admin only.
pub async fn list_questions(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let search_pattern = params.q.map(|k| format!("%{}%", k));

    let questions = sqlx::query_as::<_, Question>(
        "SELECT id, code, question_type, content, answer, is_verified, \
                verified_at, verified_by, created_by, created_at, deleted_at \
         FROM questions \
         WHERE deleted_at IS NULL \
           AND ($1::TEXT IS NULL OR question_type = $1) \
           AND ($2::TEXT IS NULL OR content ILIKE $2) \
         ORDER BY created_at DESC",
    )
    .bind(params.question_type)
    .bind(search_pattern)
    .fetch_all(&pool)
    .await?;

    Ok(Json(questions))
}

/// Retrieves a single question by ID with its options and attachments.
/// Admin only.
pub async fn get_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let tree = load_question_tree(&pool, id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(tree))
}

/// Creates a new question with its options in one transaction.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let created_by = claims.sub.parse::<i64>().ok();

    let mut tx = pool.begin().await?;

    let question_id = insert_question(&mut tx, "new question", |code| {
        QuestionDraft::new(
            code,
            payload.question_type.clone(),
            payload.content.clone(),
            payload.answer.clone(),
            created_by,
        )
    })
    .await?;

    for (position, option) in payload.options.iter().enumerate() {
        sqlx::query(
            "INSERT INTO question_options (question_id, label, content, is_correct, position) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(question_id)
        .bind(&option.label)
        .bind(&option.content)
        .bind(option.is_correct)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": question_id})),
    ))
}

/// Duplicates a question together with its options and attachments.
/// The copy gets a fresh code and cleared verification fields.
/// Admin only.
pub async fn duplicate_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let tree = ReplicationEngine::new(pool).duplicate_question(id).await?;

    Ok((StatusCode::CREATED, Json(tree)))
}
