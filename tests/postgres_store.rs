//! PostgreSQL store integration tests.
//!
//! Run with: DATABASE_URL=postgresql://localhost/civic_test cargo test --features database
//! Skipped when DATABASE_URL is not set.

#![cfg(feature = "database")]

use civic_issues::identity::ProfileDirectory;
use civic_issues::models::{CommentOrder, NewComment, NewIssue};
use civic_issues::store::{ChangeEvent, IssueFilter, IssueSort, IssueStore, PgIssueStore};
use civic_issues::votes::VoteSetChange;
use civic_issues::{Category, IssueStatus, Priority, Profile, Role, VoteKind};
use uuid::Uuid;

async fn store() -> Option<PgIssueStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let store = PgIssueStore::connect(&url).await.expect("connect");
    store.migrate().await.expect("migrate");
    Some(store)
}

fn new_issue(title: &str) -> NewIssue {
    NewIssue {
        title: title.to_string(),
        description: "Integration test issue".to_string(),
        category: Category::Safety,
        priority: Priority::High,
        location_address: "Test Lane".to_string(),
        location: None,
        image_url: None,
        reporter_id: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn test_issue_roundtrip_and_update() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let mut changes = store.changes().receiver();

    let marker = format!("pg-roundtrip-{}", Uuid::new_v4());
    let issue = store.create_issue(new_issue(&marker)).await.unwrap();
    let fetched = store.get_issue(issue.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, marker);
    assert_eq!(fetched.status, IssueStatus::Open);

    let updated = store
        .update_status(issue.id, IssueStatus::Open, IssueStatus::Resolved, Some(chrono::Utc::now()))
        .await
        .unwrap();
    assert_eq!(updated.status, IssueStatus::Resolved);

    // Priority write after a status write keeps the status columns.
    let reprioritised = store.update_priority(issue.id, Priority::Urgent).await.unwrap();
    assert_eq!(reprioritised.status, IssueStatus::Resolved);
    assert_eq!(reprioritised.resolved_at, updated.resolved_at);

    // A status write from a stale read is refused.
    let err = store
        .update_status(issue.id, IssueStatus::Open, IssueStatus::InProgress, None)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    assert!(matches!(changes.recv().await.unwrap(), ChangeEvent::IssueInserted { .. }));
    assert!(matches!(changes.recv().await.unwrap(), ChangeEvent::IssueUpdated { .. }));
    assert!(matches!(changes.recv().await.unwrap(), ChangeEvent::IssueUpdated { .. }));

    let listed = store
        .list_issues(&IssueFilter::default().search(&marker), IssueSort::Newest)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_vote_uniqueness() {
    let Some(store) = store().await else {
        return;
    };
    let issue = store.create_issue(new_issue("pg-votes")).await.unwrap();
    let voter = Uuid::new_v4();

    let first = VoteSetChange::resolve(None, issue.id, voter, VoteKind::Upvote);
    store.apply_vote_change(&first).await.unwrap();
    let duplicate = VoteSetChange::resolve(None, issue.id, voter, VoteKind::Upvote);
    let err = store.apply_vote_change(&duplicate).await.unwrap_err();
    assert!(err.is_conflict());

    let existing = store.get_vote(issue.id, voter).await.unwrap();
    let removal = VoteSetChange::resolve(existing.as_ref(), issue.id, voter, VoteKind::Upvote);
    store.apply_vote_change(&removal).await.unwrap();
    assert!(store.list_votes(issue.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_comments_and_profiles() {
    let Some(store) = store().await else {
        return;
    };
    let issue = store.create_issue(new_issue("pg-comments")).await.unwrap();
    for body in ["one", "two"] {
        store
            .create_comment(NewComment::new(issue.id, Uuid::new_v4(), body).unwrap())
            .await
            .unwrap();
    }
    let thread = store
        .list_comments(issue.id, CommentOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(thread[0].body, "one");
    assert_eq!(store.count_comments(issue.id).await.unwrap(), 2);

    let id = Uuid::new_v4();
    store
        .upsert_profile(Profile::new(id, "Pat", format!("{}@example.org", id), Role::Citizen))
        .await
        .unwrap();
    let promoted = store.update_role(id, Role::Admin).await.unwrap();
    assert_eq!(promoted.role, Role::Admin);
}
