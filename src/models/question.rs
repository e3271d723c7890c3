// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'questions' table in the database.
///
/// Like exams, questions carry a unique human-readable `code` and are
/// soft-deleted via `deleted_at`. Verification is a manual review step;
/// a duplicated question always starts unverified.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub code: String,

    /// Question type: 'single', 'multiple' or 'essay'.
    pub question_type: String,

    /// The text content of the question.
    pub content: String,

    /// The correct answer key, if the type is auto-gradable.
    pub answer: Option<String>,

    pub is_verified: bool,
    pub verified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub verified_by: Option<i64>,

    pub created_by: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'question_options' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,

    /// Option label (e.g. "A", "B").
    pub label: String,
    pub content: String,
    pub is_correct: bool,
    pub position: i32,
}

/// Represents the 'question_attachments' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionAttachment {
    pub id: i64,
    pub question_id: i64,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
}

/// A question together with its eagerly loaded child collections.
#[derive(Debug, Serialize)]
pub struct QuestionTree {
    pub question: Question,
    pub options: Vec<QuestionOption>,
    pub attachments: Vec<QuestionAttachment>,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 20))]
    pub question_type: String,
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[validate(length(max = 500))]
    pub answer: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Vec<CreateOptionRequest>,
}

/// One option of a new question. Serialize is required so validation
/// errors can embed the offending value as a parameter.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOptionRequest {
    pub label: String,
    pub content: String,
    pub is_correct: bool,
}

fn validate_options(options: &[CreateOptionRequest]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.label.is_empty() || opt.label.len() > 10 {
            return Err(validator::ValidationError::new("invalid_option_label"));
        }
        if opt.content.is_empty() || opt.content.len() > 500 {
            return Err(validator::ValidationError::new("invalid_option_content"));
        }
    }
    Ok(())
}
