// src/services/replication.rs

use std::collections::HashMap;

use rand::Rng;
use sqlx::{Acquire, PgPool, Postgres, Transaction};

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        exam::{EXAM_STATUS_DRAFT, Exam, ExamQuestion, ExamSection, ExamTree},
        question::{Question, QuestionAttachment, QuestionOption, QuestionTree},
    },
};

/// Characters used in generated codes. Ambiguous glyphs (0/O, 1/I) are
/// skipped so codes survive being read aloud or retyped.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_SUFFIX_LEN: usize = 8;

/// How many fresh codes an insert may try before the operation fails.
pub const CODE_RETRY_LIMIT: u32 = 3;

const COPY_MARKER: &str = " (Copy)";

/// Generates a human-readable code candidate, e.g. "EX-7KQ2MR4W".
/// Uniqueness is enforced by the database constraint; collisions are
/// retried by the caller with a fresh candidate.
pub fn generate_code(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", prefix, suffix)
}

fn copy_title(title: &str) -> String {
    format!("{}{}", title, COPY_MARKER)
}

/// The insertable fields of an exam row. Both freshly created exams and
/// duplicates go through this shape, so they share one insert path.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamDraft {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub status: &'static str,
    pub duration_minutes: i32,
    pub created_by: Option<i64>,
}

impl ExamDraft {
    /// Draft for a brand-new exam.
    pub fn new(
        code: String,
        title: String,
        description: Option<String>,
        duration_minutes: i32,
        created_by: Option<i64>,
    ) -> Self {
        Self {
            code,
            title,
            description,
            status: EXAM_STATUS_DRAFT,
            duration_minutes,
            created_by,
        }
    }

    /// Draft copied from an existing exam, lifecycle resets applied:
    /// fresh code, copy marker on the title, status back to draft.
    pub fn from_source(source: &Exam, code: String) -> Self {
        Self {
            code,
            title: copy_title(&source.title),
            description: source.description.clone(),
            status: EXAM_STATUS_DRAFT,
            duration_minutes: source.duration_minutes,
            created_by: source.created_by,
        }
    }
}

/// The insertable fields of a question row. Drafts always start
/// unverified, whether brand-new or copied from a verified source.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub code: String,
    pub question_type: String,
    pub content: String,
    pub answer: Option<String>,
    pub is_verified: bool,
    pub verified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub verified_by: Option<i64>,
    pub created_by: Option<i64>,
}

impl QuestionDraft {
    /// Draft for a brand-new question.
    pub fn new(
        code: String,
        question_type: String,
        content: String,
        answer: Option<String>,
        created_by: Option<i64>,
    ) -> Self {
        Self {
            code,
            question_type,
            content,
            answer,
            is_verified: false,
            verified_at: None,
            verified_by: None,
            created_by,
        }
    }

    /// Draft copied from an existing question, verification cleared.
    pub fn from_source(source: &Question, code: String) -> Self {
        Self {
            code,
            question_type: source.question_type.clone(),
            content: source.content.clone(),
            answer: source.answer.clone(),
            is_verified: false,
            verified_at: None,
            verified_by: None,
            created_by: source.created_by,
        }
    }
}

/// Rewrites an optional section reference through the old->new id map built
/// while duplicating tier-1 rows. A miss means the source row pointed at a
/// section outside its own exam, which must abort the duplication.
fn remap_section(ids: &HashMap<i64, i64>, old: Option<i64>) -> Result<Option<i64>, i64> {
    match old {
        None => Ok(None),
        Some(old) => ids.get(&old).copied().map(Some).ok_or(old),
    }
}

/// Duplicates exams and questions together with their child collections.
///
/// Every duplication runs inside one transaction: either the whole copied
/// tree commits or nothing does. Calls are not idempotent; each one
/// produces an independent copy with its own code.
pub struct ReplicationEngine {
    pool: PgPool,
}

impl ReplicationEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deep-copies an exam: the root row, its sections, and its
    /// exam-question links, with both tiers of foreign keys rewritten onto
    /// the new ids. Returns the freshly reloaded duplicate tree.
    pub async fn duplicate_exam(&self, exam_id: i64) -> Result<ExamTree, AppError> {
        let source = load_exam_tree(&self.pool, exam_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", exam_id)))?;

        let mut tx = self.pool.begin().await?;

        let context = format!("exam {}", exam_id);
        let new_exam_id = insert_exam(&mut tx, &context, |code| {
            ExamDraft::from_source(&source.exam, code)
        })
        .await?;

        // Tier 1: sections, in source order. Old ids are remembered so the
        // tier-2 links can be rewired onto their duplicated section.
        let mut section_ids: HashMap<i64, i64> = HashMap::with_capacity(source.sections.len());
        for section in &source.sections {
            let new_id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO exam_sections (exam_id, title, position) \
                 VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(new_exam_id)
            .bind(&section.title)
            .bind(section.position)
            .fetch_one(&mut *tx)
            .await?;
            section_ids.insert(section.id, new_id);
        }

        // Tier 2: exam-question links, rewritten at both levels.
        for link in &source.questions {
            let section_id = remap_section(&section_ids, link.section_id).map_err(|old| {
                AppError::ReplicationFailed(format!(
                    "exam {}: link {} references section {} outside the duplicated tree",
                    exam_id, link.id, old
                ))
            })?;

            sqlx::query(
                "INSERT INTO exam_questions (exam_id, section_id, question_id, position, points) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(new_exam_id)
            .bind(section_id)
            .bind(link.question_id)
            .bind(link.position)
            .bind(link.points)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!("Duplicated exam {} as exam {}", exam_id, new_exam_id);

        load_exam_tree(&self.pool, new_exam_id).await?.ok_or_else(|| {
            AppError::InternalServerError(format!(
                "duplicated exam {} missing after commit",
                new_exam_id
            ))
        })
    }

    /// Deep-copies a question with its options and attachments, clearing
    /// the verification fields on the copy.
    pub async fn duplicate_question(&self, question_id: i64) -> Result<QuestionTree, AppError> {
        let source = load_question_tree(&self.pool, question_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Question {} not found", question_id)))?;

        let mut tx = self.pool.begin().await?;

        let context = format!("question {}", question_id);
        let new_question_id = insert_question(&mut tx, &context, |code| {
            QuestionDraft::from_source(&source.question, code)
        })
        .await?;

        for option in &source.options {
            sqlx::query(
                "INSERT INTO question_options (question_id, label, content, is_correct, position) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(new_question_id)
            .bind(&option.label)
            .bind(&option.content)
            .bind(option.is_correct)
            .bind(option.position)
            .execute(&mut *tx)
            .await?;
        }

        for attachment in &source.attachments {
            sqlx::query(
                "INSERT INTO question_attachments (question_id, file_name, file_path, mime_type) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(new_question_id)
            .bind(&attachment.file_name)
            .bind(&attachment.file_path)
            .bind(&attachment.mime_type)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            "Duplicated question {} as question {}",
            question_id,
            new_question_id
        );

        load_question_tree(&self.pool, new_question_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "duplicated question {} missing after commit",
                    new_question_id
                ))
            })
    }
}

/// Inserts an exam row, regenerating the code on a uniqueness collision.
/// Each attempt runs in a savepoint so a collision does not poison the
/// outer transaction. `draft_for` builds the row for one candidate code.
pub async fn insert_exam(
    tx: &mut Transaction<'_, Postgres>,
    context: &str,
    draft_for: impl Fn(String) -> ExamDraft,
) -> Result<i64, AppError> {
    for attempt in 1..=CODE_RETRY_LIMIT {
        let draft = draft_for(generate_code("EX"));

        let mut sp = tx.begin().await?;
        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO exams (code, title, description, status, duration_minutes, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&draft.code)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.status)
        .bind(draft.duration_minutes)
        .bind(draft.created_by)
        .fetch_one(&mut *sp)
        .await;

        match inserted {
            Ok(id) => {
                sp.commit().await?;
                return Ok(id);
            }
            Err(e) if is_unique_violation(&e) => {
                sp.rollback().await?;
                tracing::warn!(
                    "Exam code {} collided (attempt {}), regenerating",
                    draft.code,
                    attempt
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::ReplicationFailed(format!(
        "{}: exhausted {} unique code attempts",
        context, CODE_RETRY_LIMIT
    )))
}

/// Question counterpart of `insert_exam`.
pub async fn insert_question(
    tx: &mut Transaction<'_, Postgres>,
    context: &str,
    draft_for: impl Fn(String) -> QuestionDraft,
) -> Result<i64, AppError> {
    for attempt in 1..=CODE_RETRY_LIMIT {
        let draft = draft_for(generate_code("QS"));

        let mut sp = tx.begin().await?;
        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO questions \
             (code, question_type, content, answer, is_verified, verified_at, verified_by, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(&draft.code)
        .bind(&draft.question_type)
        .bind(&draft.content)
        .bind(&draft.answer)
        .bind(draft.is_verified)
        .bind(draft.verified_at)
        .bind(draft.verified_by)
        .bind(draft.created_by)
        .fetch_one(&mut *sp)
        .await;

        match inserted {
            Ok(id) => {
                sp.commit().await?;
                return Ok(id);
            }
            Err(e) if is_unique_violation(&e) => {
                sp.rollback().await?;
                tracing::warn!(
                    "Question code {} collided (attempt {}), regenerating",
                    draft.code,
                    attempt
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::ReplicationFailed(format!(
        "{}: exhausted {} unique code attempts",
        context, CODE_RETRY_LIMIT
    )))
}

/// Eagerly loads an exam with its child collections in declared order.
/// Returns `None` for unknown or soft-deleted exams.
pub async fn load_exam_tree(pool: &PgPool, exam_id: i64) -> Result<Option<ExamTree>, AppError> {
    let exam = sqlx::query_as::<_, Exam>(
        "SELECT id, code, title, description, status, duration_minutes, \
                created_by, created_at, updated_at, deleted_at \
         FROM exams WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(exam_id)
    .fetch_optional(pool)
    .await?;

    let Some(exam) = exam else {
        return Ok(None);
    };

    let sections = sqlx::query_as::<_, ExamSection>(
        "SELECT id, exam_id, title, position \
         FROM exam_sections WHERE exam_id = $1 ORDER BY position, id",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    let questions = sqlx::query_as::<_, ExamQuestion>(
        "SELECT id, exam_id, section_id, question_id, position, points \
         FROM exam_questions WHERE exam_id = $1 ORDER BY position, id",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(ExamTree {
        exam,
        sections,
        questions,
    }))
}

/// Eagerly loads a question with its options and attachments.
pub async fn load_question_tree(
    pool: &PgPool,
    question_id: i64,
) -> Result<Option<QuestionTree>, AppError> {
    let question = sqlx::query_as::<_, Question>(
        "SELECT id, code, question_type, content, answer, is_verified, \
                verified_at, verified_by, created_by, created_at, deleted_at \
         FROM questions WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(question_id)
    .fetch_optional(pool)
    .await?;

    let Some(question) = question else {
        return Ok(None);
    };

    let options = sqlx::query_as::<_, QuestionOption>(
        "SELECT id, question_id, label, content, is_correct, position \
         FROM question_options WHERE question_id = $1 ORDER BY position, id",
    )
    .bind(question_id)
    .fetch_all(pool)
    .await?;

    let attachments = sqlx::query_as::<_, QuestionAttachment>(
        "SELECT id, question_id, file_name, file_path, mime_type \
         FROM question_attachments WHERE question_id = $1 ORDER BY id",
    )
    .bind(question_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(QuestionTree {
        question,
        options,
        attachments,
    }))
}
