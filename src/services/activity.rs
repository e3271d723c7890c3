// src/services/activity.rs

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::activity::{ActivityCategory, ActivityEvent, ActivityParams, CategoryFilter, PageInfo},
};

/// Volume policy for the bounded "recent activity" summary.
const RECENT_WINDOW_DAYS: i64 = 7;
const RECENT_ATTEMPTS: i64 = 10;
const RECENT_REGISTRATIONS: i64 = 5;
const RECENT_CREATIONS: i64 = 5;
const RECENT_TOTAL: usize = 15;

const DEFAULT_WINDOW_DAYS: i64 = 7;
const DEFAULT_PAGE_SIZE: i64 = 15;

/// What the aggregator asks of each source: a trailing window in days, an
/// optional `%term%` pattern matched server-side against the source's own
/// text fields, and an optional row cap.
#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub window_days: i64,
    pub search: Option<String>,
    pub limit: Option<i64>,
}

/// A provider of one activity category. Each implementation queries its own
/// storage collection and normalizes the rows into `ActivityEvent`s.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn category(&self) -> ActivityCategory;

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ActivityEvent>, AppError>;
}

/// Raw exam-attempt row joined with its user and exam.
#[derive(Debug, sqlx::FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub user_name: String,
    pub user_email: String,
    pub exam_title: String,
}

/// Raw user-registration row.
#[derive(Debug, sqlx::FromRow)]
pub struct RegistrationRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Raw exam-creation row joined with its (possibly deleted) creator.
#[derive(Debug, sqlx::FromRow)]
pub struct CreationRow {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub creator_name: Option<String>,
    pub creator_email: Option<String>,
}

pub fn attempt_event(row: AttemptRow) -> ActivityEvent {
    let title = format!("{} started exam", row.user_name);
    ActivityEvent {
        id: format!("attempt-{}", row.id),
        category: ActivityCategory::Attempt,
        title,
        description: row.exam_title,
        actor_name: row.user_name,
        actor_email: row.user_email,
        timestamp: row.created_at,
        status: row.status,
    }
}

pub fn registration_event(row: RegistrationRow) -> ActivityEvent {
    let title = format!("New {} registered", row.role);
    let description = format!("{} ({})", row.name, row.email);
    ActivityEvent {
        id: format!("registration-{}", row.id),
        category: ActivityCategory::Registration,
        title,
        description,
        actor_name: row.name,
        actor_email: row.email,
        timestamp: row.created_at,
        status: "completed".to_string(),
    }
}

pub fn creation_event(row: CreationRow) -> ActivityEvent {
    let creator = row.creator_name.unwrap_or_else(|| "Unknown".to_string());
    let description = format!("{} by {}", row.title, creator);
    ActivityEvent {
        id: format!("creation-{}", row.id),
        category: ActivityCategory::Creation,
        title: "New exam created".to_string(),
        description,
        actor_name: creator,
        actor_email: row.creator_email.unwrap_or_default(),
        timestamp: row.created_at,
        status: row.status,
    }
}

struct AttemptSource {
    pool: PgPool,
}

#[async_trait]
impl EventSource for AttemptSource {
    fn category(&self) -> ActivityCategory {
        ActivityCategory::Attempt
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ActivityEvent>, AppError> {
        let since = Utc::now() - Duration::days(query.window_days);

        // LIMIT NULL means no cap.
        let rows = sqlx::query_as::<_, AttemptRow>(
            "SELECT a.id, a.status, a.created_at, \
                    u.name AS user_name, u.email AS user_email, \
                    e.title AS exam_title \
             FROM exam_attempts a \
             JOIN users u ON u.id = a.user_id \
             JOIN exams e ON e.id = a.exam_id \
             WHERE a.created_at >= $1 \
               AND e.deleted_at IS NULL \
               AND ($2::TEXT IS NULL \
                    OR u.name ILIKE $2 OR u.email ILIKE $2 OR e.title ILIKE $2) \
             ORDER BY a.created_at DESC \
             LIMIT $3",
        )
        .bind(since)
        .bind(query.search.as_deref())
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Attempt source query failed: {:?}", e);
            AppError::AggregationFailed(format!("attempt source: {}", e))
        })?;

        Ok(rows.into_iter().map(attempt_event).collect())
    }
}

struct RegistrationSource {
    pool: PgPool,
}

#[async_trait]
impl EventSource for RegistrationSource {
    fn category(&self) -> ActivityCategory {
        ActivityCategory::Registration
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ActivityEvent>, AppError> {
        let since = Utc::now() - Duration::days(query.window_days);

        let rows = sqlx::query_as::<_, RegistrationRow>(
            "SELECT id, name, email, role, created_at \
             FROM users \
             WHERE created_at >= $1 \
               AND ($2::TEXT IS NULL OR name ILIKE $2 OR email ILIKE $2) \
             ORDER BY created_at DESC \
             LIMIT $3",
        )
        .bind(since)
        .bind(query.search.as_deref())
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Registration source query failed: {:?}", e);
            AppError::AggregationFailed(format!("registration source: {}", e))
        })?;

        Ok(rows.into_iter().map(registration_event).collect())
    }
}

struct CreationSource {
    pool: PgPool,
}

#[async_trait]
impl EventSource for CreationSource {
    fn category(&self) -> ActivityCategory {
        ActivityCategory::Creation
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ActivityEvent>, AppError> {
        let since = Utc::now() - Duration::days(query.window_days);

        let rows = sqlx::query_as::<_, CreationRow>(
            "SELECT e.id, e.title, e.status, e.created_at, \
                    u.name AS creator_name, u.email AS creator_email \
             FROM exams e \
             LEFT JOIN users u ON u.id = e.created_by \
             WHERE e.created_at >= $1 \
               AND e.deleted_at IS NULL \
               AND ($2::TEXT IS NULL OR e.title ILIKE $2 OR u.name ILIKE $2) \
             ORDER BY e.created_at DESC \
             LIMIT $3",
        )
        .bind(since)
        .bind(query.search.as_deref())
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Creation source query failed: {:?}", e);
            AppError::AggregationFailed(format!("creation source: {}", e))
        })?;

        Ok(rows.into_iter().map(creation_event).collect())
    }
}

/// Merges the three activity streams into one time-ordered feed.
///
/// Stateless per call; the sources are queried concurrently and a failure
/// of any one fails the whole call, so the feed is never silently partial.
pub struct ActivityAggregator {
    attempts: Box<dyn EventSource>,
    registrations: Box<dyn EventSource>,
    creations: Box<dyn EventSource>,
}

impl ActivityAggregator {
    /// Wires the three sqlx-backed sources onto one pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            attempts: Box::new(AttemptSource { pool: pool.clone() }),
            registrations: Box::new(RegistrationSource { pool: pool.clone() }),
            creations: Box::new(CreationSource { pool }),
        }
    }

    /// Builds an aggregator over arbitrary providers, one per category.
    pub fn new(
        attempts: Box<dyn EventSource>,
        registrations: Box<dyn EventSource>,
        creations: Box<dyn EventSource>,
    ) -> Self {
        Self {
            attempts,
            registrations,
            creations,
        }
    }

    /// Bounded summary for the dashboard: each source capped small over a
    /// fixed 7-day window, merged and cut to the 15 most recent events.
    pub async fn recent(&self) -> Result<Vec<ActivityEvent>, AppError> {
        let capped = |limit| SourceQuery {
            window_days: RECENT_WINDOW_DAYS,
            search: None,
            limit: Some(limit),
        };

        // The queries must outlive the joined futures that borrow them.
        let attempts_query = capped(RECENT_ATTEMPTS);
        let registrations_query = capped(RECENT_REGISTRATIONS);
        let creations_query = capped(RECENT_CREATIONS);

        let (attempts, registrations, creations) = tokio::try_join!(
            self.attempts.fetch(&attempts_query),
            self.registrations.fetch(&registrations_query),
            self.creations.fetch(&creations_query),
        )?;

        let mut events = merge_events(vec![attempts, registrations, creations]);
        events.truncate(RECENT_TOTAL);
        Ok(events)
    }

    /// Paged query: every matching row from each enabled source is loaded,
    /// merged, sorted, and sliced in memory. Fine for an admin dashboard's
    /// volumes; revisit with source-level offset pushdown if they grow.
    pub async fn page(
        &self,
        params: &ActivityParams,
    ) -> Result<(Vec<ActivityEvent>, PageInfo), AppError> {
        let page = params.page.unwrap_or(1);
        let per_page = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 || per_page < 1 {
            return Err(AppError::BadRequest(
                "page and page_size must be at least 1".to_string(),
            ));
        }

        let window_days = params.window_days.unwrap_or(DEFAULT_WINDOW_DAYS);
        if window_days < 1 {
            return Err(AppError::BadRequest(
                "window_days must be at least 1".to_string(),
            ));
        }

        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let query = SourceQuery {
            window_days,
            search,
            limit: None,
        };

        let (attempts, registrations, creations) = tokio::try_join!(
            fetch_if_enabled(self.attempts.as_ref(), params.category, &query),
            fetch_if_enabled(self.registrations.as_ref(), params.category, &query),
            fetch_if_enabled(self.creations.as_ref(), params.category, &query),
        )?;

        let events = merge_events(vec![attempts, registrations, creations]);
        let pagination = PageInfo::new(events.len() as i64, page, per_page);

        Ok((slice_page(events, page, per_page), pagination))
    }
}

async fn fetch_if_enabled(
    source: &dyn EventSource,
    filter: CategoryFilter,
    query: &SourceQuery,
) -> Result<Vec<ActivityEvent>, AppError> {
    if filter.includes(source.category()) {
        source.fetch(query).await
    } else {
        Ok(Vec::new())
    }
}

/// Flattens per-source batches into one feed, newest first. Timestamp ties
/// fall back to the event id so ordering (and paging) stays deterministic.
pub fn merge_events(batches: Vec<Vec<ActivityEvent>>) -> Vec<ActivityEvent> {
    let mut events: Vec<ActivityEvent> = batches.into_iter().flatten().collect();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    events
}

fn slice_page(events: Vec<ActivityEvent>, page: i64, per_page: i64) -> Vec<ActivityEvent> {
    let offset = ((page - 1) * per_page) as usize;
    events
        .into_iter()
        .skip(offset)
        .take(per_page as usize)
        .collect()
}
