//! Dashboard and admin statistics
//!
//! Pure aggregation over issue snapshots. Percentages are in the 0-100 range.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Category, Issue, IssueStatus, Priority};

/// Community dashboard counters. Closed issues only count toward `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStats {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub resolved: usize,
}

impl IssueStats {
    pub fn from_issues(issues: &[Issue]) -> Self {
        issues.iter().fold(Self::default(), |mut stats, issue| {
            stats.total += 1;
            match issue.status {
                IssueStatus::Open => stats.open += 1,
                IssueStatus::InProgress => stats.in_progress += 1,
                IssueStatus::Resolved => stats.resolved += 1,
                IssueStatus::Closed => {}
            }
            stats
        })
    }
}

/// Admin dashboard counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    #[serde(flatten)]
    pub issues: IssueStats,
    pub total_users: usize,
    /// Issues created on the same UTC day as `now`
    pub today_issues: usize,
}

impl AdminStats {
    pub fn compute(issues: &[Issue], total_users: usize, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            issues: IssueStats::from_issues(issues),
            total_users,
            today_issues: issues
                .iter()
                .filter(|i| i.created_at.date_naive() == today)
                .count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket<K> {
    pub key: K,
    pub count: usize,
    pub percentage: f64,
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Category / priority breakdowns for the analytics page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub total: usize,
    pub by_category: Vec<Bucket<Category>>,
    pub by_priority: Vec<Bucket<Priority>>,
    /// Share of issues currently `resolved`
    pub resolution_rate: f64,
}

impl Analytics {
    /// Buckets list every category and priority, including empty ones.
    pub fn compute(issues: &[Issue]) -> Self {
        let total = issues.len();

        let by_category = Category::ALL
            .into_iter()
            .map(|key| {
                let count = issues.iter().filter(|i| i.category == key).count();
                Bucket {
                    key,
                    count,
                    percentage: percentage(count, total),
                }
            })
            .collect();

        let by_priority = Priority::ALL
            .into_iter()
            .map(|key| {
                let count = issues.iter().filter(|i| i.priority == key).count();
                Bucket {
                    key,
                    count,
                    percentage: percentage(count, total),
                }
            })
            .collect();

        let resolved = issues
            .iter()
            .filter(|i| i.status == IssueStatus::Resolved)
            .count();

        Self {
            total,
            by_category,
            by_priority,
            resolution_rate: percentage(resolved, total),
        }
    }
}
