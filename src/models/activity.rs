// src/models/activity.rs

use serde::{Deserialize, Serialize};

/// The closed set of event categories shown in the activity feed.
/// Adding a category means adding a variant here and a source for it,
/// which the exhaustive matches below make a compile-time-visible change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Attempt,
    Registration,
    Creation,
}

/// Category filter accepted by the paged activity query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    All,
    Attempt,
    Registration,
    Creation,
}

impl CategoryFilter {
    pub fn includes(&self, category: ActivityCategory) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Attempt => category == ActivityCategory::Attempt,
            CategoryFilter::Registration => category == ActivityCategory::Registration,
            CategoryFilter::Creation => category == ActivityCategory::Creation,
        }
    }
}

/// One normalized feed entry. Built on read from the source rows and
/// discarded after the response; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    /// Source-scoped id, e.g. "attempt-42". Also the sort tiebreak.
    pub id: String,
    pub category: ActivityCategory,
    pub title: String,
    pub description: String,
    pub actor_name: String,
    pub actor_email: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: String,
}

/// Query parameters for the paged activity feed.
#[derive(Debug, Default, Deserialize)]
pub struct ActivityParams {
    pub search: Option<String>,
    #[serde(default)]
    pub category: CategoryFilter,
    pub window_days: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Offset pagination metadata, computed from the full merged result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
    pub from: i64,
    pub to: i64,
}

impl PageInfo {
    /// Computes pagination metadata. Callers must have validated
    /// `page >= 1` and `per_page >= 1` beforehand; an empty result set
    /// yields the degenerate `from = to = last_page = 0`.
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        if total == 0 {
            return Self {
                current_page: page,
                per_page,
                total: 0,
                last_page: 0,
                from: 0,
                to: 0,
            };
        }

        let offset = (page - 1) * per_page;
        Self {
            current_page: page,
            per_page,
            total,
            last_page: (total + per_page - 1) / per_page,
            from: offset + 1,
            to: (offset + per_page).min(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_info_middle_page() {
        let info = PageInfo::new(42, 3, 15);
        assert_eq!(info.last_page, 3);
        assert_eq!(info.from, 31);
        assert_eq!(info.to, 42);
        assert_eq!(info.total, 42);
    }

    #[test]
    fn page_info_exact_multiple() {
        let info = PageInfo::new(30, 2, 15);
        assert_eq!(info.last_page, 2);
        assert_eq!(info.from, 16);
        assert_eq!(info.to, 30);
    }

    #[test]
    fn page_info_empty_result() {
        let info = PageInfo::new(0, 1, 15);
        assert_eq!(info.last_page, 0);
        assert_eq!(info.from, 0);
        assert_eq!(info.to, 0);
    }

    #[test]
    fn category_filter_all_includes_everything() {
        for c in [
            ActivityCategory::Attempt,
            ActivityCategory::Registration,
            ActivityCategory::Creation,
        ] {
            assert!(CategoryFilter::All.includes(c));
        }
    }

    #[test]
    fn category_filter_single_excludes_others() {
        assert!(CategoryFilter::Attempt.includes(ActivityCategory::Attempt));
        assert!(!CategoryFilter::Attempt.includes(ActivityCategory::Registration));
        assert!(!CategoryFilter::Attempt.includes(ActivityCategory::Creation));
    }
}
