//! Issue records
//!
//! An issue is created `open` by a citizen and afterwards only has its
//! status and priority mutated. `resolved_at` is set exactly when the status
//! is `resolved`; see [`crate::workflow`] for the transitions that keep it so.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

use super::{IssueId, UserId};

/// Issue category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Infrastructure,
    Sanitation,
    Utilities,
    Safety,
    Environment,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Infrastructure,
        Category::Sanitation,
        Category::Utilities,
        Category::Safety,
        Category::Environment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Infrastructure => "infrastructure",
            Category::Sanitation => "sanitation",
            Category::Utilities => "utilities",
            Category::Safety => "safety",
            Category::Environment => "environment",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidCategory(s.to_string()))
    }
}

/// Issue priority. Ordering is by urgency: `Low < Medium < High < Urgent`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidPriority(s.to_string()))
    }
}

/// Issue status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 4] = [
        IssueStatus::Open,
        IssueStatus::InProgress,
        IssueStatus::Resolved,
        IssueStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidStatus(s.to_string()))
    }
}

/// WGS84 coordinate attached to an issue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::InvalidCoordinate {
                reason: format!("latitude {} outside [-90, 90]", latitude),
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::InvalidCoordinate {
                reason: format!("longitude {} outside [-180, 180]", longitude),
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// A reported civic problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: IssueStatus,
    pub location_address: String,
    pub location: Option<GeoPoint>,
    pub image_url: Option<String>,
    pub reporter_id: UserId,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Materialise a freshly submitted issue.
    pub fn from_new(new: NewIssue, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            category: new.category,
            priority: new.priority,
            status: IssueStatus::Open,
            location_address: new.location_address,
            location: new.location,
            image_url: new.image_url,
            reporter_id: new.reporter_id,
            created_at,
            resolved_at: None,
        }
    }

    /// Case-insensitive match against title, description and address.
    /// `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.location_address.to_lowercase().contains(needle)
    }
}

/// Fields supplied when a citizen submits an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub priority: Priority,
    pub location_address: String,
    pub location: Option<GeoPoint>,
    pub image_url: Option<String>,
    pub reporter_id: UserId,
}

impl NewIssue {
    /// Reject submissions with blank required text.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "title" });
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "description",
            });
        }
        if self.location_address.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "location_address",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewIssue {
        NewIssue {
            title: "Pothole on Main St".to_string(),
            description: "Deep hole near the crossing".to_string(),
            category: Category::Infrastructure,
            priority: Priority::High,
            location_address: "12 Main St".to_string(),
            location: None,
            image_url: None,
            reporter_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_status_parses_snake_case() {
        assert_eq!(
            "in_progress".parse::<IssueStatus>().unwrap(),
            IssueStatus::InProgress
        );
        assert_eq!(
            "pending".parse::<IssueStatus>(),
            Err(ValidationError::InvalidStatus("pending".to_string()))
        );
    }

    #[test]
    fn test_priority_orders_by_urgency() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_status_serializes_as_stored_value() {
        let json = serde_json::to_string(&IssueStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_new_issue_is_open_without_resolution() {
        let issue = Issue::from_new(sample(), Utc::now());
        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.resolved_at.is_none());
    }

    #[test]
    fn test_blank_title_rejected() {
        let mut new = sample();
        new.title = "   ".to_string();
        assert_eq!(
            new.validate(),
            Err(ValidationError::EmptyField { field: "title" })
        );
    }

    #[test]
    fn test_geo_point_range_checked() {
        assert!(GeoPoint::new(51.5, -0.12).is_ok());
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -181.0).is_err());
    }

    #[test]
    fn test_search_covers_address() {
        let issue = Issue::from_new(sample(), Utc::now());
        assert!(issue.matches_search("main st"));
        assert!(issue.matches_search("crossing"));
        assert!(!issue.matches_search("river"));
    }
}
