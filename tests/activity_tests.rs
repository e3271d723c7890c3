// tests/activity_tests.rs
//
// Drives the activity aggregator through in-memory event sources so the
// merge/sort/filter/paginate contract is tested without a database.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use exambank::error::AppError;
use exambank::models::activity::{ActivityCategory, ActivityEvent, ActivityParams, CategoryFilter};
use exambank::services::activity::{
    ActivityAggregator, AttemptRow, CreationRow, EventSource, RegistrationRow, SourceQuery,
    attempt_event, creation_event, registration_event,
};

/// In-memory stand-in for one sqlx-backed source. Honors the same contract:
/// trailing window, `%term%` search over the event's text fields, optional
/// cap, newest first.
struct FakeSource {
    category: ActivityCategory,
    events: Vec<ActivityEvent>,
    fail: bool,
}

impl FakeSource {
    fn new(category: ActivityCategory, events: Vec<ActivityEvent>) -> Self {
        Self {
            category,
            events,
            fail: false,
        }
    }

    fn failing(category: ActivityCategory) -> Self {
        Self {
            category,
            events: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl EventSource for FakeSource {
    fn category(&self) -> ActivityCategory {
        self.category
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ActivityEvent>, AppError> {
        if self.fail {
            return Err(AppError::AggregationFailed(
                "fake source: query failed".to_string(),
            ));
        }

        let cutoff = Utc::now() - Duration::days(query.window_days);
        let mut rows: Vec<ActivityEvent> = self
            .events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .filter(|e| matches_search(e, query.search.as_deref()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }
}

fn matches_search(event: &ActivityEvent, pattern: Option<&str>) -> bool {
    let Some(pattern) = pattern else { return true };
    let term = pattern.trim_matches('%').to_lowercase();
    [
        &event.actor_name,
        &event.actor_email,
        &event.description,
        &event.title,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&term))
}

fn attempt(id: i64, name: &str, email: &str, exam: &str, status: &str, mins_ago: i64) -> ActivityEvent {
    attempt_event(AttemptRow {
        id,
        status: status.to_string(),
        created_at: Utc::now() - Duration::minutes(mins_ago),
        user_name: name.to_string(),
        user_email: email.to_string(),
        exam_title: exam.to_string(),
    })
}

fn registration(id: i64, name: &str, email: &str, role: &str, mins_ago: i64) -> ActivityEvent {
    registration_event(RegistrationRow {
        id,
        name: name.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        created_at: Utc::now() - Duration::minutes(mins_ago),
    })
}

fn creation(id: i64, title: &str, creator: Option<&str>, status: &str, mins_ago: i64) -> ActivityEvent {
    creation_event(CreationRow {
        id,
        title: title.to_string(),
        status: status.to_string(),
        created_at: Utc::now() - Duration::minutes(mins_ago),
        creator_name: creator.map(str::to_string),
        creator_email: creator.map(|c| format!("{}@example.com", c.to_lowercase())),
    })
}

fn aggregator(
    attempts: Vec<ActivityEvent>,
    registrations: Vec<ActivityEvent>,
    creations: Vec<ActivityEvent>,
) -> ActivityAggregator {
    ActivityAggregator::new(
        Box::new(FakeSource::new(ActivityCategory::Attempt, attempts)),
        Box::new(FakeSource::new(ActivityCategory::Registration, registrations)),
        Box::new(FakeSource::new(ActivityCategory::Creation, creations)),
    )
}

fn assert_sorted_descending(events: &[ActivityEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].timestamp >= pair[1].timestamp,
            "feed out of order: {} before {}",
            pair[0].id,
            pair[1].id
        );
    }
}

#[tokio::test]
async fn recent_merges_all_sources_sorted_descending() {
    // Arrange: 3 attempts, 2 registrations, 1 creation within the window
    let agg = aggregator(
        vec![
            attempt(1, "Alice", "alice@example.com", "Algebra I", "in_progress", 10),
            attempt(2, "Bob", "bob@example.com", "Algebra I", "submitted", 40),
            attempt(3, "Cara", "cara@example.com", "History", "graded", 70),
        ],
        vec![
            registration(1, "Zoe", "zoe@example.com", "student", 25),
            registration(2, "Yann", "yann@example.com", "teacher", 55),
        ],
        vec![creation(1, "Algebra I", Some("Dana"), "published", 90)],
    );

    // Act
    let events = agg.recent().await.expect("recent() failed");

    // Assert
    assert_eq!(events.len(), 6);
    assert_sorted_descending(&events);

    assert_eq!(events[0].title, "Alice started exam");
    assert_eq!(events[0].description, "Algebra I");
    assert_eq!(events[0].status, "in_progress");

    let zoe = events.iter().find(|e| e.id == "registration-1").unwrap();
    assert_eq!(zoe.title, "New student registered");
    assert_eq!(zoe.description, "Zoe (zoe@example.com)");
    assert_eq!(zoe.status, "completed");

    let created = events.iter().find(|e| e.id == "creation-1").unwrap();
    assert_eq!(created.title, "New exam created");
    assert_eq!(created.description, "Algebra I by Dana");
}

#[tokio::test]
async fn recent_caps_each_source_and_truncates_to_fifteen() {
    // Attempts are the newest, then registrations, then creations, so the
    // capped merge (10 + 5 + 5) truncates away the creation block.
    let attempts = (1..=12)
        .map(|i| attempt(i, "U", "u@example.com", "E", "graded", i))
        .collect();
    let registrations = (1..=7)
        .map(|i| registration(i, "R", "r@example.com", "student", 100 + i))
        .collect();
    let creations = (1..=6)
        .map(|i| creation(i, "E", Some("C"), "draft", 200 + i))
        .collect();

    let events = aggregator(attempts, registrations, creations)
        .recent()
        .await
        .expect("recent() failed");

    assert_eq!(events.len(), 15);
    assert_sorted_descending(&events);

    let count = |c: ActivityCategory| events.iter().filter(|e| e.category == c).count();
    assert_eq!(count(ActivityCategory::Attempt), 10);
    assert_eq!(count(ActivityCategory::Registration), 5);
    assert_eq!(count(ActivityCategory::Creation), 0);
}

#[tokio::test]
async fn recent_ignores_events_outside_the_window() {
    let agg = aggregator(
        vec![
            attempt(1, "Alice", "alice@example.com", "Algebra I", "graded", 60),
            attempt(2, "Old", "old@example.com", "Algebra I", "graded", 60 * 24 * 8),
        ],
        vec![],
        vec![],
    );

    let events = agg.recent().await.expect("recent() failed");

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "attempt-1");
}

#[tokio::test]
async fn page_under_all_equals_the_sum_of_single_categories() {
    let agg = aggregator(
        vec![
            attempt(1, "Alice", "alice@example.com", "Algebra I", "graded", 10),
            attempt(2, "Bob", "bob@example.com", "History", "graded", 20),
        ],
        vec![registration(1, "Zoe", "zoe@example.com", "student", 15)],
        vec![
            creation(1, "Algebra I", Some("Dana"), "published", 30),
            creation(2, "History", None, "draft", 40),
            creation(3, "Physics", Some("Dana"), "draft", 50),
        ],
    );

    async fn total(agg: &ActivityAggregator, category: CategoryFilter) -> i64 {
        let params = ActivityParams {
            category,
            ..Default::default()
        };
        let (_, pagination) = agg.page(&params).await.expect("page() failed");
        pagination.total
    }

    let total_all = total(&agg, CategoryFilter::All).await;
    let total_attempts = total(&agg, CategoryFilter::Attempt).await;
    let total_registrations = total(&agg, CategoryFilter::Registration).await;
    let total_creations = total(&agg, CategoryFilter::Creation).await;

    assert_eq!(total_attempts, 2);
    assert_eq!(total_registrations, 1);
    assert_eq!(total_creations, 3);
    assert_eq!(total_all, total_attempts + total_registrations + total_creations);
}

#[tokio::test]
async fn page_slices_and_reports_pagination_arithmetic() {
    let attempts = (1..=42)
        .map(|i| attempt(i, "U", "u@example.com", "E", "graded", i))
        .collect();

    let params = ActivityParams {
        page: Some(3),
        page_size: Some(15),
        ..Default::default()
    };
    let (events, pagination) = aggregator(attempts, vec![], vec![])
        .page(&params)
        .await
        .expect("page() failed");

    assert_eq!(events.len(), 12);
    assert_sorted_descending(&events);
    assert_eq!(pagination.current_page, 3);
    assert_eq!(pagination.per_page, 15);
    assert_eq!(pagination.total, 42);
    assert_eq!(pagination.last_page, 3);
    assert_eq!(pagination.from, 31);
    assert_eq!(pagination.to, 42);
}

#[tokio::test]
async fn page_on_empty_feed_returns_zeroed_pagination() {
    let (events, pagination) = aggregator(vec![], vec![], vec![])
        .page(&ActivityParams::default())
        .await
        .expect("page() failed");

    assert!(events.is_empty());
    assert_eq!(pagination.total, 0);
    assert_eq!(pagination.last_page, 0);
    assert_eq!(pagination.from, 0);
    assert_eq!(pagination.to, 0);
}

#[tokio::test]
async fn page_rejects_zero_page_size_before_computing_metadata() {
    let params = ActivityParams {
        page_size: Some(0),
        ..Default::default()
    };
    let err = aggregator(vec![], vec![], vec![])
        .page(&params)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let params = ActivityParams {
        page: Some(0),
        ..Default::default()
    };
    let err = aggregator(vec![], vec![], vec![])
        .page(&params)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn page_respects_the_trailing_window() {
    let agg = aggregator(
        vec![
            attempt(1, "Alice", "alice@example.com", "E", "graded", 60),
            attempt(2, "Old", "old@example.com", "E", "graded", 60 * 24 * 10),
        ],
        vec![],
        vec![],
    );

    let (events, pagination) = agg.page(&ActivityParams::default()).await.unwrap();
    assert_eq!(pagination.total, 1);
    assert_eq!(events[0].id, "attempt-1");

    let wide = ActivityParams {
        window_days: Some(30),
        ..Default::default()
    };
    let (_, pagination) = agg.page(&wide).await.unwrap();
    assert_eq!(pagination.total, 2);
}

#[tokio::test]
async fn search_matching_only_an_email_returns_exactly_that_event() {
    let agg = aggregator(
        vec![attempt(1, "Alice", "alice@example.com", "Algebra I", "graded", 10)],
        vec![
            registration(1, "Zoe", "zoe.quincy@example.com", "student", 20),
            registration(2, "Yann", "yann@example.com", "teacher", 30),
        ],
        vec![creation(1, "Algebra I", Some("Dana"), "draft", 40)],
    );

    let params = ActivityParams {
        search: Some("zoe.quincy".to_string()),
        ..Default::default()
    };
    let (events, pagination) = agg.page(&params).await.unwrap();
    assert_eq!(pagination.total, 1);
    assert_eq!(events[0].id, "registration-1");

    // The same term under a category that cannot match yields nothing.
    let params = ActivityParams {
        search: Some("zoe.quincy".to_string()),
        category: CategoryFilter::Attempt,
        ..Default::default()
    };
    let (events, pagination) = agg.page(&params).await.unwrap();
    assert!(events.is_empty());
    assert_eq!(pagination.total, 0);
}

#[tokio::test]
async fn one_failing_source_fails_the_whole_aggregation() {
    let agg = ActivityAggregator::new(
        Box::new(FakeSource::failing(ActivityCategory::Attempt)),
        Box::new(FakeSource::new(
            ActivityCategory::Registration,
            vec![registration(1, "Zoe", "zoe@example.com", "student", 5)],
        )),
        Box::new(FakeSource::new(ActivityCategory::Creation, vec![])),
    );

    let err = agg.recent().await.unwrap_err();
    assert!(matches!(err, AppError::AggregationFailed(_)));

    let err = agg.page(&ActivityParams::default()).await.unwrap_err();
    assert!(matches!(err, AppError::AggregationFailed(_)));
}

#[tokio::test]
async fn a_failing_source_outside_the_category_filter_is_never_queried() {
    let agg = ActivityAggregator::new(
        Box::new(FakeSource::failing(ActivityCategory::Attempt)),
        Box::new(FakeSource::new(
            ActivityCategory::Registration,
            vec![registration(1, "Zoe", "zoe@example.com", "student", 5)],
        )),
        Box::new(FakeSource::new(ActivityCategory::Creation, vec![])),
    );

    let params = ActivityParams {
        category: CategoryFilter::Registration,
        ..Default::default()
    };
    let (events, pagination) = agg.page(&params).await.expect("filtered page failed");
    assert_eq!(pagination.total, 1);
    assert_eq!(events[0].id, "registration-1");
}
