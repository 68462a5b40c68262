//! In-memory Issue Store
//!
//! Backs tests and single-node demos. Enforces the same rules as the
//! PostgreSQL schema: one vote per (issue, voter), comments only on existing
//! issues, role updates only on existing profiles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::feed::{ChangeEvent, ChangeFeed, DEFAULT_FEED_CAPACITY};
use super::query::{IssueFilter, IssueSort};
use super::{status_conflict, IssueStore};
use crate::error::{CivicError, CivicResult, StoreError};
use crate::identity::ProfileDirectory;
use crate::models::{
    Comment, CommentOrder, Issue, IssueId, IssueStatus, NewComment, NewIssue, Priority, Profile,
    ProfileFilter, Role, UserId, Vote,
};
use crate::votes::{Tally, VoteSet, VoteSetChange};

#[derive(Default)]
struct Inner {
    issues: HashMap<IssueId, Issue>,
    votes: HashMap<(IssueId, UserId), Vote>,
    comments: Vec<Comment>,
    profiles: HashMap<UserId, Profile>,
}

impl Inner {
    fn tallies(&self) -> HashMap<IssueId, Tally> {
        let mut by_issue: HashMap<IssueId, Vec<Vote>> = HashMap::new();
        for vote in self.votes.values() {
            by_issue.entry(vote.issue_id).or_default().push(vote.clone());
        }
        by_issue
            .into_iter()
            .map(|(id, votes)| (id, VoteSet::from_votes(id, votes).tally()))
            .collect()
    }
}

/// Issue store held entirely in process memory
pub struct MemoryStore {
    inner: RwLock<Inner>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            feed: ChangeFeed::new(capacity),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict(change: &VoteSetChange) -> CivicError {
    let vote = change.vote();
    StoreError::Conflict(format!(
        "vote by {} on issue {} changed concurrently",
        vote.voter_id, vote.issue_id
    ))
    .into()
}

#[async_trait]
impl IssueStore for MemoryStore {
    async fn create_issue(&self, new: NewIssue) -> CivicResult<Issue> {
        new.validate()?;
        let issue = Issue::from_new(new, Utc::now());
        {
            let mut inner = self.inner.write().await;
            inner.issues.insert(issue.id, issue.clone());
        }
        info!(issue_id = %issue.id, category = %issue.category, "Issue created");
        self.feed.publish(ChangeEvent::IssueInserted {
            issue: issue.clone(),
        });
        Ok(issue)
    }

    async fn get_issue(&self, id: IssueId) -> CivicResult<Option<Issue>> {
        let inner = self.inner.read().await;
        Ok(inner.issues.get(&id).cloned())
    }

    async fn list_issues(&self, filter: &IssueFilter, sort: IssueSort) -> CivicResult<Vec<Issue>> {
        let inner = self.inner.read().await;
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|issue| filter.matches(issue))
            .cloned()
            .collect();

        let tallies = match sort {
            IssueSort::MostVoted => inner.tallies(),
            _ => HashMap::new(),
        };
        sort.apply(&mut issues, &tallies);

        if let Some(limit) = filter.limit {
            issues.truncate(limit);
        }
        Ok(issues)
    }

    async fn update_status(
        &self,
        id: IssueId,
        expected: IssueStatus,
        status: IssueStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> CivicResult<Issue> {
        let (old, new) = {
            let mut inner = self.inner.write().await;
            let stored = inner
                .issues
                .get_mut(&id)
                .ok_or_else(|| CivicError::issue_not_found(id))?;
            if stored.status != expected {
                return Err(status_conflict(id, expected, stored.status));
            }
            let old = stored.clone();
            stored.status = status;
            stored.resolved_at = resolved_at;
            (old, stored.clone())
        };
        debug!(issue_id = %id, from = %old.status, to = %new.status, "Issue status updated");
        self.feed.publish(ChangeEvent::IssueUpdated {
            old,
            new: new.clone(),
        });
        Ok(new)
    }

    async fn update_priority(&self, id: IssueId, priority: Priority) -> CivicResult<Issue> {
        let (old, new) = {
            let mut inner = self.inner.write().await;
            let stored = inner
                .issues
                .get_mut(&id)
                .ok_or_else(|| CivicError::issue_not_found(id))?;
            let old = stored.clone();
            stored.priority = priority;
            (old, stored.clone())
        };
        debug!(issue_id = %id, priority = %priority, "Issue priority updated");
        self.feed.publish(ChangeEvent::IssueUpdated {
            old,
            new: new.clone(),
        });
        Ok(new)
    }

    async fn list_votes(&self, issue_id: IssueId) -> CivicResult<Vec<Vote>> {
        let inner = self.inner.read().await;
        Ok(inner
            .votes
            .values()
            .filter(|v| v.issue_id == issue_id)
            .cloned()
            .collect())
    }

    async fn votes_for_issues(&self, issue_ids: &[IssueId]) -> CivicResult<Vec<Vote>> {
        let inner = self.inner.read().await;
        Ok(inner
            .votes
            .values()
            .filter(|v| issue_ids.contains(&v.issue_id))
            .cloned()
            .collect())
    }

    async fn get_vote(&self, issue_id: IssueId, voter_id: UserId) -> CivicResult<Option<Vote>> {
        let inner = self.inner.read().await;
        Ok(inner.votes.get(&(issue_id, voter_id)).cloned())
    }

    async fn apply_vote_change(&self, change: &VoteSetChange) -> CivicResult<()> {
        let vote = change.vote();
        let key = (vote.issue_id, vote.voter_id);
        let mut inner = self.inner.write().await;

        if !inner.issues.contains_key(&vote.issue_id) {
            return Err(CivicError::issue_not_found(vote.issue_id));
        }

        match change {
            VoteSetChange::Inserted { vote } => {
                if inner.votes.contains_key(&key) {
                    return Err(conflict(change));
                }
                inner.votes.insert(key, vote.clone());
            }
            VoteSetChange::Switched { vote, previous } => match inner.votes.get_mut(&key) {
                Some(existing) if existing.id == vote.id && existing.kind == *previous => {
                    existing.kind = vote.kind;
                }
                _ => return Err(conflict(change)),
            },
            VoteSetChange::Removed { vote } => {
                let matches = inner
                    .votes
                    .get(&key)
                    .is_some_and(|existing| existing.id == vote.id && existing.kind == vote.kind);
                if !matches {
                    return Err(conflict(change));
                }
                inner.votes.remove(&key);
            }
        }
        debug!(issue_id = %vote.issue_id, voter_id = %vote.voter_id, result = ?change.resulting_vote(), "Vote applied");
        Ok(())
    }

    async fn create_comment(&self, new: NewComment) -> CivicResult<Comment> {
        let comment = {
            let mut inner = self.inner.write().await;
            if !inner.issues.contains_key(&new.issue_id) {
                return Err(CivicError::issue_not_found(new.issue_id));
            }
            let comment = new.into_comment(Utc::now());
            inner.comments.push(comment.clone());
            comment
        };
        debug!(issue_id = %comment.issue_id, comment_id = %comment.id, "Comment added");
        self.feed.publish(ChangeEvent::CommentInserted {
            comment: comment.clone(),
        });
        Ok(comment)
    }

    async fn list_comments(
        &self,
        issue_id: IssueId,
        order: CommentOrder,
    ) -> CivicResult<Vec<Comment>> {
        let inner = self.inner.read().await;
        let mut comments: Vec<Comment> = inner
            .comments
            .iter()
            .filter(|c| c.issue_id == issue_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.created_at);
        if order == CommentOrder::Descending {
            comments.reverse();
        }
        Ok(comments)
    }

    async fn count_comments(&self, issue_id: IssueId) -> CivicResult<usize> {
        let inner = self.inner.read().await;
        Ok(inner
            .comments
            .iter()
            .filter(|c| c.issue_id == issue_id)
            .count())
    }

    fn changes(&self) -> ChangeFeed {
        self.feed.clone()
    }
}

#[async_trait]
impl ProfileDirectory for MemoryStore {
    async fn get_profile(&self, user_id: UserId) -> CivicResult<Option<Profile>> {
        let inner = self.inner.read().await;
        Ok(inner.profiles.get(&user_id).cloned())
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> CivicResult<Vec<Profile>> {
        let inner = self.inner.read().await;
        let mut profiles: Vec<Profile> = inner
            .profiles
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }

    async fn upsert_profile(&self, profile: Profile) -> CivicResult<Profile> {
        let mut inner = self.inner.write().await;
        inner.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update_role(&self, user_id: UserId, role: Role) -> CivicResult<Profile> {
        let mut inner = self.inner.write().await;
        let profile = inner
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| CivicError::profile_not_found(user_id))?;
        profile.role = role;
        info!(user_id = %user_id, role = %role, "Role updated");
        Ok(profile.clone())
    }

    async fn count_profiles(&self) -> CivicResult<usize> {
        Ok(self.inner.read().await.profiles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, IssueStatus, Priority, VoteKind};
    use uuid::Uuid;

    fn new_issue(title: &str) -> NewIssue {
        NewIssue {
            title: title.to_string(),
            description: "Reported by a resident".to_string(),
            category: Category::Infrastructure,
            priority: Priority::Medium,
            location_address: "1 Civic Sq".to_string(),
            location: None,
            image_url: None,
            reporter_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_issue() {
        let store = MemoryStore::new();
        let issue = store.create_issue(new_issue("Pothole")).await.unwrap();

        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.resolved_at.is_none());
        assert_eq!(store.get_issue(issue.id).await.unwrap(), Some(issue));
        assert_eq!(store.get_issue(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let store = MemoryStore::new();
        let err = store.create_issue(new_issue("  ")).await.unwrap_err();
        assert!(matches!(err, CivicError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_vote_insert_conflicts() {
        let store = MemoryStore::new();
        let issue = store.create_issue(new_issue("Pothole")).await.unwrap();
        let voter = Uuid::new_v4();

        let first = VoteSetChange::resolve(None, issue.id, voter, VoteKind::Upvote);
        let second = VoteSetChange::resolve(None, issue.id, voter, VoteKind::Downvote);
        store.apply_vote_change(&first).await.unwrap();

        let err = store.apply_vote_change(&second).await.unwrap_err();
        assert!(matches!(err, CivicError::Store(StoreError::Conflict(_))));
        assert_eq!(store.list_votes(issue.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_switch_and_remove_vote() {
        let store = MemoryStore::new();
        let issue = store.create_issue(new_issue("Pothole")).await.unwrap();
        let voter = Uuid::new_v4();

        let insert = VoteSetChange::resolve(None, issue.id, voter, VoteKind::Upvote);
        store.apply_vote_change(&insert).await.unwrap();

        let existing = store.get_vote(issue.id, voter).await.unwrap();
        let switch =
            VoteSetChange::resolve(existing.as_ref(), issue.id, voter, VoteKind::Downvote);
        store.apply_vote_change(&switch).await.unwrap();
        let existing = store.get_vote(issue.id, voter).await.unwrap().unwrap();
        assert_eq!(existing.kind, VoteKind::Downvote);

        let remove = VoteSetChange::resolve(Some(&existing), issue.id, voter, VoteKind::Downvote);
        store.apply_vote_change(&remove).await.unwrap();
        assert!(store.get_vote(issue.id, voter).await.unwrap().is_none());

        // The same removal again no longer matches any row.
        assert!(store.apply_vote_change(&remove).await.is_err());
    }

    #[tokio::test]
    async fn test_most_voted_listing_with_limit() {
        let store = MemoryStore::new();
        let quiet = store.create_issue(new_issue("Quiet")).await.unwrap();
        let popular = store.create_issue(new_issue("Popular")).await.unwrap();
        let _third = store.create_issue(new_issue("Third")).await.unwrap();

        for _ in 0..2 {
            let change = VoteSetChange::resolve(None, popular.id, Uuid::new_v4(), VoteKind::Upvote);
            store.apply_vote_change(&change).await.unwrap();
        }
        let change = VoteSetChange::resolve(None, quiet.id, Uuid::new_v4(), VoteKind::Downvote);
        store.apply_vote_change(&change).await.unwrap();

        let listed = store
            .list_issues(&IssueFilter::default().limit(2), IssueSort::MostVoted)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, popular.id);
        assert!(listed.iter().all(|i| i.id != quiet.id));
    }

    #[tokio::test]
    async fn test_comment_on_missing_issue() {
        let store = MemoryStore::new();
        let comment = NewComment::new(Uuid::new_v4(), Uuid::new_v4(), "hello").unwrap();
        let err = store.create_comment(comment).await.unwrap_err();
        assert!(matches!(err, CivicError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_comments_ordered_and_counted() {
        let store = MemoryStore::new();
        let issue = store.create_issue(new_issue("Noise")).await.unwrap();
        for body in ["first", "second", "third"] {
            let c = NewComment::new(issue.id, Uuid::new_v4(), body).unwrap();
            store.create_comment(c).await.unwrap();
        }

        let asc = store
            .list_comments(issue.id, CommentOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(asc.first().unwrap().body, "first");
        let desc = store
            .list_comments(issue.id, CommentOrder::Descending)
            .await
            .unwrap();
        assert_eq!(desc.first().unwrap().body, "third");
        assert_eq!(store.count_comments(issue.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_publishes_old_and_new() {
        let store = MemoryStore::new();
        let mut receiver = store.changes().receiver();
        let issue = store.create_issue(new_issue("Leak")).await.unwrap();

        store
            .update_status(issue.id, IssueStatus::Open, IssueStatus::InProgress, None)
            .await
            .unwrap();

        assert!(matches!(
            receiver.recv().await.unwrap(),
            ChangeEvent::IssueInserted { .. }
        ));
        match receiver.recv().await.unwrap() {
            ChangeEvent::IssueUpdated { old, new } => {
                assert_eq!(old.status, IssueStatus::Open);
                assert_eq!(new.status, IssueStatus::InProgress);
            }
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_priority() {
        let store = MemoryStore::new();
        let issue = store.create_issue(new_issue("Leak")).await.unwrap();
        let updated = store.update_priority(issue.id, Priority::Urgent).await.unwrap();
        assert_eq!(updated.priority, Priority::Urgent);
        assert!(store
            .update_priority(Uuid::new_v4(), Priority::Low)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_status_and_priority_writes_do_not_clobber() {
        let store = MemoryStore::new();
        let issue = store.create_issue(new_issue("Leak")).await.unwrap();

        // Status computed from a read taken before the priority change.
        let stale = store.get_issue(issue.id).await.unwrap().unwrap();
        store.update_priority(issue.id, Priority::Urgent).await.unwrap();
        let moved = store
            .update_status(stale.id, stale.status, IssueStatus::InProgress, None)
            .await
            .unwrap();
        assert_eq!(moved.priority, Priority::Urgent);
        assert_eq!(moved.status, IssueStatus::InProgress);

        // Priority changes leave status and resolved_at alone.
        let now = Utc::now();
        store
            .update_status(issue.id, IssueStatus::InProgress, IssueStatus::Resolved, Some(now))
            .await
            .unwrap();
        let after = store.update_priority(issue.id, Priority::Low).await.unwrap();
        assert_eq!(after.status, IssueStatus::Resolved);
        assert_eq!(after.resolved_at, Some(now));
    }

    #[tokio::test]
    async fn test_stale_status_write_conflicts() {
        let store = MemoryStore::new();
        let issue = store.create_issue(new_issue("Leak")).await.unwrap();
        store
            .update_status(issue.id, IssueStatus::Open, IssueStatus::Closed, None)
            .await
            .unwrap();

        let err = store
            .update_status(issue.id, IssueStatus::Open, IssueStatus::InProgress, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        let stored = store.get_issue(issue.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IssueStatus::Closed);
    }

    #[tokio::test]
    async fn test_profiles() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .upsert_profile(Profile::new(id, "Dana Reyes", "dana@example.org", Role::Citizen))
            .await
            .unwrap();
        store
            .upsert_profile(Profile::new(Uuid::new_v4(), "Sam", "sam@example.org", Role::Admin))
            .await
            .unwrap();

        let found = store
            .list_profiles(&ProfileFilter {
                search: Some("dana".to_string()),
                role: None,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let promoted = store.update_role(id, Role::Admin).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert_eq!(store.count_profiles().await.unwrap(), 2);
        assert!(store.update_role(Uuid::new_v4(), Role::Admin).await.is_err());
    }
}
