//! Issue listing filters and sort orders.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::models::{Category, Issue, IssueId, IssueStatus, Priority, UserId};
use crate::votes::Tally;

/// Filter for `list_issues`. Unset fields do not restrict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFilter {
    /// Case-insensitive substring over title, description and address
    pub search: Option<String>,
    pub status: Option<IssueStatus>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub reporter: Option<UserId>,
    /// Only issues with coordinates (map view)
    #[serde(default)]
    pub with_location: bool,
    /// When false, `resolved` issues are hidden
    #[serde(default = "default_true")]
    pub include_resolved: bool,
    /// Applied after sorting
    pub limit: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl Default for IssueFilter {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            priority: None,
            category: None,
            reporter: None,
            with_location: false,
            include_resolved: true,
            limit: None,
        }
    }
}

impl IssueFilter {
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn status(mut self, status: IssueStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn reporter(mut self, reporter: UserId) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Normalised search needle, `None` when blank.
    pub fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(needle) = self.needle() {
            if !issue.matches_search(&needle) {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != issue.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != issue.priority) {
            return false;
        }
        if self.category.is_some_and(|c| c != issue.category) {
            return false;
        }
        if self.reporter.is_some_and(|r| r != issue.reporter_id) {
            return false;
        }
        if self.with_location && issue.location.is_none() {
            return false;
        }
        if !self.include_resolved && issue.status == IssueStatus::Resolved {
            return false;
        }
        true
    }
}

/// Sort order for `list_issues`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSort {
    #[default]
    Newest,
    Oldest,
    MostVoted,
    Priority,
}

impl IssueSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSort::Newest => "newest",
            IssueSort::Oldest => "oldest",
            IssueSort::MostVoted => "most_voted",
            IssueSort::Priority => "priority",
        }
    }

    /// Sort in place. `tallies` is only consulted for `MostVoted`; issues
    /// without an entry count as net zero. Ties fall back to newest first.
    pub fn apply(&self, issues: &mut [Issue], tallies: &HashMap<IssueId, Tally>) {
        match self {
            IssueSort::Newest => issues.sort_by_key(|i| Reverse(i.created_at)),
            IssueSort::Oldest => issues.sort_by_key(|i| i.created_at),
            IssueSort::MostVoted => issues.sort_by_key(|i| {
                let net = tallies.get(&i.id).map(|t| t.net).unwrap_or(0);
                (Reverse(net), Reverse(i.created_at))
            }),
            IssueSort::Priority => {
                issues.sort_by_key(|i| (Reverse(i.priority), Reverse(i.created_at)))
            }
        }
    }
}

impl fmt::Display for IssueSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueSort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(IssueSort::Newest),
            "oldest" => Ok(IssueSort::Oldest),
            "most_voted" => Ok(IssueSort::MostVoted),
            "priority" => Ok(IssueSort::Priority),
            other => Err(ValidationError::InvalidSort(other.to_string())),
        }
    }
}
