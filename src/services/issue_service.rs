//! Issue service
//!
//! Orchestrates the store, profile directory and blob store around the pure
//! engines (vote tally, status machine) and returns view models. Mutations
//! return the updated view directly; callers never need to refetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::analytics::{AdminStats, Analytics, IssueStats};
use crate::blob_store::BlobStore;
use crate::error::{CivicError, CivicResult, StoreError, ValidationError};
use crate::identity::{require_admin, resolve_principal, ProfileDirectory};
use crate::models::{
    Category, Comment, CommentOrder, GeoPoint, Issue, IssueId, IssueStatus, NewComment, NewIssue,
    Priority, Profile, ProfileFilter, Role, UserId, Vote, VoteKind,
};
use crate::store::{IssueFilter, IssueSort, IssueStore};
use crate::votes::{VoteSet, VoteSummary};
use crate::workflow::{StatusMachine, TransitionOutcome};

/// Raw image attached to a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// A citizen's issue submission
#[derive(Debug, Clone, PartialEq)]
pub struct ReportIssue {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub location_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image: Option<ImageUpload>,
}

impl ReportIssue {
    fn location(&self) -> Result<Option<GeoPoint>, ValidationError> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => GeoPoint::new(lat, lng).map(Some),
            (None, None) => Ok(None),
            _ => Err(ValidationError::InvalidCoordinate {
                reason: "latitude and longitude must be given together".to_string(),
            }),
        }
    }
}

/// Issue as shown in lists and on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueCard {
    #[serde(flatten)]
    pub issue: Issue,
    pub reporter_name: String,
    pub votes: VoteSummary,
    pub comment_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_name: String,
}

/// Issue detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetail {
    #[serde(flatten)]
    pub card: IssueCard,
    pub comments: Vec<CommentView>,
}

pub struct IssueService {
    store: Arc<dyn IssueStore>,
    profiles: Arc<dyn ProfileDirectory>,
    blobs: Arc<dyn BlobStore>,
    machine: StatusMachine,
}

impl IssueService {
    pub fn new(
        store: Arc<dyn IssueStore>,
        profiles: Arc<dyn ProfileDirectory>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            store,
            profiles,
            blobs,
            machine: StatusMachine::default(),
        }
    }

    pub fn with_status_machine(mut self, machine: StatusMachine) -> Self {
        self.machine = machine;
        self
    }

    pub fn store(&self) -> &Arc<dyn IssueStore> {
        &self.store
    }

    pub fn status_machine(&self) -> StatusMachine {
        self.machine
    }

    // ── Identity ──

    /// Resolve an authenticated principal to its profile.
    pub async fn principal(&self, user_id: UserId) -> CivicResult<Profile> {
        resolve_principal(self.profiles.as_ref(), user_id).await
    }

    pub async fn register_profile(&self, profile: Profile) -> CivicResult<Profile> {
        self.profiles.upsert_profile(profile).await
    }

    // ── Issues ──

    #[instrument(skip(self, report), fields(reporter = %reporter.id))]
    pub async fn report_issue(&self, reporter: &Profile, report: ReportIssue) -> CivicResult<Issue> {
        let location = report.location()?;
        let mut new = NewIssue {
            title: report.title.trim().to_string(),
            description: report.description.trim().to_string(),
            category: report.category,
            priority: report.priority,
            location_address: report.location_address.trim().to_string(),
            location,
            image_url: None,
            reporter_id: reporter.id,
        };
        new.validate()?;

        if let Some(image) = report.image {
            if image.bytes.is_empty() {
                return Err(ValidationError::InvalidImage("empty file".to_string()).into());
            }
            let url = self
                .blobs
                .upload(&image.bytes, &image.filename)
                .await
                .map_err(StoreError::from)?;
            new.image_url = Some(url);
        }

        let issue = self.store.create_issue(new).await?;
        info!(issue_id = %issue.id, "Issue reported");
        Ok(issue)
    }

    async fn require_issue(&self, id: IssueId) -> CivicResult<Issue> {
        self.store
            .get_issue(id)
            .await?
            .ok_or_else(|| CivicError::issue_not_found(id))
    }

    async fn display_names(&self, ids: impl IntoIterator<Item = UserId>) -> CivicResult<HashMap<UserId, String>> {
        let mut names = HashMap::new();
        for id in ids {
            if names.contains_key(&id) {
                continue;
            }
            let name = match self.profiles.get_profile(id).await? {
                Some(profile) => profile.display_name().to_string(),
                None => "Anonymous".to_string(),
            };
            names.insert(id, name);
        }
        Ok(names)
    }

    /// Issues matching `filter` with tallies, the viewer's vote and comment counts.
    pub async fn issue_feed(
        &self,
        viewer: Option<UserId>,
        filter: &IssueFilter,
        sort: IssueSort,
    ) -> CivicResult<Vec<IssueCard>> {
        let issues = self.store.list_issues(filter, sort).await?;
        let ids: Vec<IssueId> = issues.iter().map(|i| i.id).collect();

        let mut votes_by_issue: HashMap<IssueId, Vec<Vote>> = HashMap::new();
        for vote in self.store.votes_for_issues(&ids).await? {
            votes_by_issue.entry(vote.issue_id).or_default().push(vote);
        }
        let names = self.display_names(issues.iter().map(|i| i.reporter_id).collect::<Vec<_>>()).await?;

        let mut cards = Vec::with_capacity(issues.len());
        for issue in issues {
            let votes = VoteSet::from_votes(issue.id, votes_by_issue.remove(&issue.id).unwrap_or_default());
            let comment_count = self.store.count_comments(issue.id).await?;
            cards.push(IssueCard {
                reporter_name: names
                    .get(&issue.reporter_id)
                    .cloned()
                    .unwrap_or_else(|| "Anonymous".to_string()),
                votes: summary(&votes, viewer),
                comment_count,
                issue,
            });
        }
        Ok(cards)
    }

    pub async fn issue_detail(&self, viewer: Option<UserId>, id: IssueId) -> CivicResult<IssueDetail> {
        let issue = self.require_issue(id).await?;
        let votes = VoteSet::from_votes(id, self.store.list_votes(id).await?);
        let comments = self.comments(id).await?;
        let reporter_name = self
            .display_names([issue.reporter_id])
            .await?
            .remove(&issue.reporter_id)
            .unwrap_or_else(|| "Anonymous".to_string());

        Ok(IssueDetail {
            card: IssueCard {
                reporter_name,
                votes: summary(&votes, viewer),
                comment_count: comments.len(),
                issue,
            },
            comments,
        })
    }

    // ── Votes ──

    /// Toggle `voter`'s vote and return the resulting summary.
    ///
    /// The vote set is read once; the summary comes from the engine after
    /// the store confirms the write. A rejected write leaves nothing changed.
    #[instrument(skip(self), fields(voter = %voter.id))]
    pub async fn cast_vote(&self, voter: &Profile, issue_id: IssueId, kind: VoteKind) -> CivicResult<VoteSummary> {
        self.require_issue(issue_id).await?;
        let mut set = VoteSet::from_votes(issue_id, self.store.list_votes(issue_id).await?);

        let change = set.apply_vote(voter.id, kind);
        self.store.apply_vote_change(&change).await?;

        let summary = set.summary_for(voter.id);
        info!(issue_id = %issue_id, net = summary.tally.net, "Vote recorded");
        Ok(summary)
    }

    // ── Status & priority ──

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn transition_status(
        &self,
        actor: &Profile,
        issue_id: IssueId,
        status: IssueStatus,
    ) -> CivicResult<TransitionOutcome> {
        require_admin(actor, "change issue status")?;
        let issue = self.require_issue(issue_id).await?;

        let outcome = self.machine.transition(&issue, status, actor.role, Utc::now())?;
        if !outcome.changed {
            return Ok(outcome);
        }

        // Only status and resolved_at are written, and only if nobody moved
        // the issue since it was read; priority edits in between survive.
        let stored = self
            .store
            .update_status(
                issue_id,
                outcome.previous,
                outcome.issue.status,
                outcome.issue.resolved_at,
            )
            .await?;
        info!(issue_id = %issue_id, from = %outcome.previous, to = %stored.status, "Issue status changed");
        Ok(TransitionOutcome {
            issue: stored,
            ..outcome
        })
    }

    pub async fn set_priority(&self, actor: &Profile, issue_id: IssueId, priority: Priority) -> CivicResult<Issue> {
        require_admin(actor, "change issue priority")?;
        let issue = self.store.update_priority(issue_id, priority).await?;
        info!(issue_id = %issue_id, priority = %priority, "Issue priority changed");
        Ok(issue)
    }

    /// Statuses the actor may move the issue to next. Empty for non-admins.
    pub async fn allowed_transitions(&self, actor: &Profile, issue_id: IssueId) -> CivicResult<Vec<IssueStatus>> {
        let issue = self.require_issue(issue_id).await?;
        if !actor.role.is_admin() {
            return Ok(Vec::new());
        }
        Ok(self.machine.allowed_from(issue.status))
    }

    // ── Comments ──

    pub async fn add_comment(&self, author: &Profile, issue_id: IssueId, body: &str) -> CivicResult<CommentView> {
        let new = NewComment::new(issue_id, author.id, body)?;
        let comment = self.store.create_comment(new).await?;
        Ok(CommentView {
            comment,
            author_name: author.display_name().to_string(),
        })
    }

    /// Comment thread, oldest first.
    pub async fn comments(&self, issue_id: IssueId) -> CivicResult<Vec<CommentView>> {
        let comments = self
            .store
            .list_comments(issue_id, CommentOrder::Ascending)
            .await?;
        let names = self.display_names(comments.iter().map(|c| c.author_id).collect::<Vec<_>>()).await?;
        Ok(comments
            .into_iter()
            .map(|comment| CommentView {
                author_name: names
                    .get(&comment.author_id)
                    .cloned()
                    .unwrap_or_else(|| "Anonymous".to_string()),
                comment,
            })
            .collect())
    }

    // ── Statistics ──

    pub async fn community_stats(&self) -> CivicResult<IssueStats> {
        let issues = self
            .store
            .list_issues(&IssueFilter::default(), IssueSort::Newest)
            .await?;
        Ok(IssueStats::from_issues(&issues))
    }

    pub async fn admin_stats(&self, actor: &Profile, now: DateTime<Utc>) -> CivicResult<AdminStats> {
        require_admin(actor, "view admin statistics")?;
        let issues = self
            .store
            .list_issues(&IssueFilter::default(), IssueSort::Newest)
            .await?;
        let total_users = self.profiles.count_profiles().await?;
        Ok(AdminStats::compute(&issues, total_users, now))
    }

    pub async fn analytics(&self, actor: &Profile) -> CivicResult<Analytics> {
        require_admin(actor, "view analytics")?;
        let issues = self
            .store
            .list_issues(&IssueFilter::default(), IssueSort::Newest)
            .await?;
        Ok(Analytics::compute(&issues))
    }

    // ── User management ──

    pub async fn list_users(&self, actor: &Profile, filter: &ProfileFilter) -> CivicResult<Vec<Profile>> {
        require_admin(actor, "list users")?;
        self.profiles.list_profiles(filter).await
    }

    pub async fn change_role(&self, actor: &Profile, user_id: UserId, role: Role) -> CivicResult<Profile> {
        require_admin(actor, "change roles")?;
        let profile = self.profiles.update_role(user_id, role).await?;
        info!(actor = %actor.id, user_id = %user_id, role = %role, "Role changed");
        Ok(profile)
    }
}

fn summary(votes: &VoteSet, viewer: Option<UserId>) -> VoteSummary {
    VoteSummary {
        issue_id: votes.issue_id(),
        tally: votes.tally(),
        user_vote: viewer.and_then(|v| votes.current_vote(v)),
    }
}
