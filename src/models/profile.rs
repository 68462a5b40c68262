//! Profiles resolved from authenticated principals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

use super::UserId;

/// Role gating administrative mutations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "VARCHAR", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Citizen,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Role::Citizen),
            "admin" => Ok(Role::Admin),
            other => Err(ValidationError::InvalidRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: UserId, full_name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            email: email.into(),
            phone: None,
            address: None,
            role,
            created_at: Utc::now(),
        }
    }

    /// Name shown next to reports and comments.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            "Anonymous"
        } else {
            &self.full_name
        }
    }
}

/// User management listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFilter {
    pub search: Option<String>,
    pub role: Option<Role>,
}

impl ProfileFilter {
    pub fn matches(&self, profile: &Profile) -> bool {
        if let Some(role) = self.role {
            if profile.role != role {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                profile.full_name.to_lowercase().contains(&term)
                    || profile.email.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}
