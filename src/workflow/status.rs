//! Issue Status State Machine
//!
//! ```text
//! open ──► in_progress ──► resolved ──► closed
//!              ▲               │
//!              └───── reopen ──┘
//!   (any) ──────────────────────────► closed
//! ```
//!
//! Only administrators transition status. Entering `resolved` stamps
//! `resolved_at`; leaving it clears the stamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthorizationError, CivicResult, ValidationError};
use crate::events::NotificationEvent;
use crate::models::{Issue, IssueStatus, Role};

/// How strictly requested statuses are checked against the lifecycle graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any of the four statuses may be requested from any status
    #[default]
    Permissive,
    /// Only edges of the lifecycle graph
    Lifecycle,
}

impl TransitionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::Permissive => "permissive",
            TransitionPolicy::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for TransitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "lifecycle" => Ok(TransitionPolicy::Lifecycle),
            other => Err(format!("unknown transition policy '{}'", other)),
        }
    }
}

/// Whether `from → to` is an edge of the lifecycle graph.
pub fn is_lifecycle_edge(from: IssueStatus, to: IssueStatus) -> bool {
    use IssueStatus::*;

    matches!(
        (from, to),
        (Open, InProgress)
            | (InProgress, Resolved)
            | (Resolved, InProgress)
            | (Open, Closed)
            | (InProgress, Closed)
            | (Resolved, Closed)
    )
}

/// Result of a status transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    /// Issue with the new status applied
    pub issue: Issue,
    pub previous: IssueStatus,
    /// False when the requested status equals the current one
    pub changed: bool,
    /// Notification the change implies, if any
    pub notification: Option<NotificationEvent>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusMachine {
    policy: TransitionPolicy,
}

impl StatusMachine {
    pub fn new(policy: TransitionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Statuses reachable from `from` along the lifecycle graph.
    pub fn allowed_from(&self, from: IssueStatus) -> Vec<IssueStatus> {
        IssueStatus::ALL
            .into_iter()
            .filter(|to| is_lifecycle_edge(from, *to))
            .collect()
    }

    /// Apply `requested` to `issue` on behalf of an actor with `actor_role`.
    ///
    /// The caller persists `outcome.issue` when `outcome.changed`. Rejections
    /// leave the issue untouched.
    pub fn transition(
        &self,
        issue: &Issue,
        requested: IssueStatus,
        actor_role: Role,
        now: DateTime<Utc>,
    ) -> CivicResult<TransitionOutcome> {
        if !actor_role.is_admin() {
            return Err(AuthorizationError::AdminRequired {
                action: "change issue status",
            }
            .into());
        }

        let previous = issue.status;
        if previous == requested {
            return Ok(TransitionOutcome {
                issue: issue.clone(),
                previous,
                changed: false,
                notification: None,
            });
        }

        if self.policy == TransitionPolicy::Lifecycle && !is_lifecycle_edge(previous, requested) {
            return Err(ValidationError::TransitionNotAllowed {
                from: previous.to_string(),
                to: requested.to_string(),
            }
            .into());
        }

        let mut updated = issue.clone();
        updated.status = requested;
        updated.resolved_at = match requested {
            IssueStatus::Resolved => Some(now),
            _ => None,
        };

        let notification = NotificationEvent::status_changed(&updated);
        Ok(TransitionOutcome {
            issue: updated,
            previous,
            changed: true,
            notification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CivicError;
    use crate::events::Audience;
    use crate::models::{Category, NewIssue, Priority};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn open_issue() -> Issue {
        Issue::from_new(
            NewIssue {
                title: "Fallen tree".to_string(),
                description: "Blocking the cycle lane".to_string(),
                category: Category::Environment,
                priority: Priority::High,
                location_address: "Riverside".to_string(),
                location: None,
                image_url: None,
                reporter_id: Uuid::new_v4(),
            },
            Utc::now(),
        )
    }

    fn status_strategy() -> impl Strategy<Value = IssueStatus> {
        prop::sample::select(IssueStatus::ALL.to_vec())
    }

    #[test]
    fn test_open_to_in_progress_notifies_reporter() {
        let machine = StatusMachine::default();
        let issue = open_issue();

        let outcome = machine
            .transition(&issue, IssueStatus::InProgress, Role::Admin, Utc::now())
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.previous, IssueStatus::Open);
        let event = outcome.notification.unwrap();
        assert_eq!(event.audience(), Audience::User(issue.reporter_id));
        assert_eq!(event.message(), "Issue is now being worked on");
    }

    #[test]
    fn test_resolve_then_reopen_clears_timestamp() {
        let machine = StatusMachine::new(TransitionPolicy::Lifecycle);
        let now = Utc::now();

        let started = machine
            .transition(&open_issue(), IssueStatus::InProgress, Role::Admin, now)
            .unwrap()
            .issue;
        let resolved = machine
            .transition(&started, IssueStatus::Resolved, Role::Admin, now)
            .unwrap()
            .issue;
        assert_eq!(resolved.resolved_at, Some(now));

        let reopened = machine
            .transition(&resolved, IssueStatus::InProgress, Role::Admin, now)
            .unwrap()
            .issue;
        assert!(reopened.resolved_at.is_none());
    }

    #[test]
    fn test_revert_to_open_emits_nothing() {
        let machine = StatusMachine::default();
        let mut issue = open_issue();
        issue.status = IssueStatus::InProgress;

        let outcome = machine
            .transition(&issue, IssueStatus::Open, Role::Admin, Utc::now())
            .unwrap();
        assert!(outcome.changed);
        assert!(outcome.notification.is_none());
    }

    #[test]
    fn test_same_status_is_noop() {
        let outcome = StatusMachine::default()
            .transition(&open_issue(), IssueStatus::Open, Role::Admin, Utc::now())
            .unwrap();
        assert!(!outcome.changed);
        assert!(outcome.notification.is_none());
    }

    #[test]
    fn test_lifecycle_rejects_skipping() {
        let machine = StatusMachine::new(TransitionPolicy::Lifecycle);
        let err = machine
            .transition(&open_issue(), IssueStatus::Resolved, Role::Admin, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            CivicError::Validation(ValidationError::TransitionNotAllowed { .. })
        ));

        // Permissive policy allows the same jump.
        assert!(StatusMachine::default()
            .transition(&open_issue(), IssueStatus::Resolved, Role::Admin, Utc::now())
            .is_ok());
    }

    #[test]
    fn test_allowed_from() {
        let machine = StatusMachine::default();
        assert_eq!(
            machine.allowed_from(IssueStatus::Open),
            vec![IssueStatus::InProgress, IssueStatus::Closed]
        );
        assert_eq!(
            machine.allowed_from(IssueStatus::Resolved),
            vec![IssueStatus::InProgress, IssueStatus::Closed]
        );
        assert!(machine.allowed_from(IssueStatus::Closed).is_empty());
    }

    proptest! {
        #[test]
        fn prop_citizen_never_transitions(from in status_strategy(), to in status_strategy()) {
            let mut issue = open_issue();
            issue.status = from;
            let result = StatusMachine::default().transition(&issue, to, Role::Citizen, Utc::now());
            prop_assert!(matches!(result, Err(CivicError::Authorization(_))));
        }

        #[test]
        fn prop_resolved_at_iff_resolved(from in status_strategy(), to in status_strategy()) {
            let mut issue = open_issue();
            issue.status = from;
            if from == IssueStatus::Resolved {
                issue.resolved_at = Some(Utc::now());
            }
            let outcome = StatusMachine::default()
                .transition(&issue, to, Role::Admin, Utc::now())
                .unwrap();
            prop_assert_eq!(
                outcome.issue.resolved_at.is_some(),
                outcome.issue.status == IssueStatus::Resolved
            );
        }
    }
}
