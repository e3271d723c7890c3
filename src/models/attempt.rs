// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'exam_attempts' table in the database.
/// One row per user sitting of an exam; the newest rows feed the
/// activity feed's attempt source.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: i64,
    pub exam_id: i64,
    pub user_id: i64,

    /// 'in_progress', 'submitted' or 'graded'.
    pub status: String,

    pub score: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
