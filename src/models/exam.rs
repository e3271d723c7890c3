// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Exam lifecycle statuses. Stored as plain text columns.
pub const EXAM_STATUS_DRAFT: &str = "draft";

/// Represents the 'exams' table in the database.
///
/// `code` is the human-readable unique identifier, distinct from `id`.
/// Rows are soft-deleted via `deleted_at`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: Option<String>,

    /// 'draft', 'published' or 'archived'.
    pub status: String,

    pub duration_minutes: i32,
    pub created_by: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'exam_sections' table: a named, ordered block of an exam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamSection {
    pub id: i64,
    pub exam_id: i64,
    pub title: String,
    pub position: i32,
}

/// Represents the 'exam_questions' table: the link between an exam and a
/// question, optionally placed inside a section of the same exam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub id: i64,
    pub exam_id: i64,
    pub section_id: Option<i64>,
    pub question_id: i64,
    pub position: i32,
    pub points: i32,
}

/// An exam together with its eagerly loaded child collections.
#[derive(Debug, Serialize)]
pub struct ExamTree {
    pub exam: Exam,
    pub sections: Vec<ExamSection>,
    pub questions: Vec<ExamQuestion>,
}

/// DTO for creating a new exam.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
}
