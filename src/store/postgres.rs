//! PostgreSQL Issue Store
//!
//! All SQL is runtime-checked (`sqlx::query`, not `sqlx::query!`) so the
//! crate builds without a live database. Enum columns are stored as VARCHAR
//! and parsed back through the model `FromStr` impls.
//!
//! Committed writes are published on the in-process [`ChangeFeed`]. A
//! multi-node deployment would replace this with LISTEN/NOTIFY.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::feed::{ChangeEvent, ChangeFeed};
use super::query::{IssueFilter, IssueSort};
use super::{status_conflict, IssueStore};
use crate::error::{CivicError, CivicResult, StoreError};
use crate::identity::ProfileDirectory;
use crate::models::{
    Comment, CommentOrder, GeoPoint, Issue, IssueId, IssueStatus, NewComment, NewIssue, Priority,
    Profile, ProfileFilter, Role, UserId, Vote,
};
use crate::votes::VoteSetChange;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id UUID PRIMARY KEY,
    full_name VARCHAR NOT NULL DEFAULT '',
    email VARCHAR NOT NULL,
    phone VARCHAR,
    address VARCHAR,
    role VARCHAR NOT NULL DEFAULT 'citizen',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS issues (
    id UUID PRIMARY KEY,
    title VARCHAR NOT NULL,
    description TEXT NOT NULL,
    category VARCHAR NOT NULL,
    priority VARCHAR NOT NULL DEFAULT 'medium',
    status VARCHAR NOT NULL DEFAULT 'open',
    location_address VARCHAR NOT NULL,
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION,
    image_url VARCHAR,
    reporter_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    resolved_at TIMESTAMPTZ,
    CHECK ((status = 'resolved') = (resolved_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_issues_created ON issues(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_issues_reporter ON issues(reporter_id);

CREATE TABLE IF NOT EXISTS votes (
    id UUID PRIMARY KEY,
    issue_id UUID NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
    user_id UUID NOT NULL,
    vote_type VARCHAR NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(issue_id, user_id)
);

CREATE TABLE IF NOT EXISTS comments (
    id UUID PRIMARY KEY,
    issue_id UUID NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
    user_id UUID NOT NULL,
    content TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_comments_issue ON comments(issue_id, created_at);
"#;

const ISSUE_COLUMNS: &str = "i.id, i.title, i.description, i.category, i.priority, i.status, \
     i.location_address, i.latitude, i.longitude, i.image_url, i.reporter_id, \
     i.created_at, i.resolved_at";

#[derive(Debug, FromRow)]
struct IssueRow {
    id: Uuid,
    title: String,
    description: String,
    category: String,
    priority: String,
    status: String,
    location_address: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    image_url: Option<String>,
    reporter_id: Uuid,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

impl TryFrom<IssueRow> for Issue {
    type Error = StoreError;

    fn try_from(row: IssueRow) -> Result<Self, Self::Error> {
        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng).map_err(corrupt)?),
            _ => None,
        };
        Ok(Issue {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category.parse().map_err(corrupt)?,
            priority: row.priority.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            location_address: row.location_address,
            location,
            image_url: row.image_url,
            reporter_id: row.reporter_id,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct VoteRow {
    id: Uuid,
    issue_id: Uuid,
    user_id: Uuid,
    vote_type: String,
}

impl TryFrom<VoteRow> for Vote {
    type Error = StoreError;

    fn try_from(row: VoteRow) -> Result<Self, Self::Error> {
        Ok(Vote {
            id: row.id,
            issue_id: row.issue_id,
            voter_id: row.user_id,
            kind: row.vote_type.parse().map_err(corrupt)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct CommentRow {
    id: Uuid,
    issue_id: Uuid,
    user_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            issue_id: row.issue_id,
            author_id: row.user_id,
            body: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: Uuid,
    full_name: String,
    email: String,
    phone: Option<String>,
    address: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Profile {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            role: row.role.parse().map_err(corrupt)?,
            created_at: row.created_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> CivicResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter()
        .map(|r| T::try_from(r).map_err(CivicError::from))
        .collect()
}

/// PostgreSQL-backed issue store and profile directory
pub struct PgIssueStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgIssueStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            feed: ChangeFeed::default(),
        }
    }

    pub fn with_feed(pool: PgPool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    pub async fn connect(database_url: &str) -> CivicResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they don't exist.
    pub async fn migrate(&self) -> CivicResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("Issue store schema ready");
        Ok(())
    }

    async fn fetch_issue(&self, id: IssueId) -> CivicResult<Option<Issue>> {
        let sql = format!("SELECT {} FROM issues i WHERE i.id = $1", ISSUE_COLUMNS);
        let row = sqlx::query_as::<_, IssueRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Issue::try_from).transpose()?)
    }
}

/// Current row, locked until `tx` ends.
async fn lock_issue(tx: &mut Transaction<'_, Postgres>, id: IssueId) -> CivicResult<Issue> {
    let sql = format!("SELECT {} FROM issues i WHERE i.id = $1 FOR UPDATE", ISSUE_COLUMNS);
    let row = sqlx::query_as::<_, IssueRow>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CivicError::issue_not_found(id))?;
    Ok(row.try_into()?)
}

/// Substring pattern for `ILIKE`, with the term's wildcards matched literally.
fn like_pattern(term: &str) -> String {
    format!(
        "%{}%",
        term.replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    )
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &IssueFilter) {
    if let Some(needle) = filter.needle() {
        let pattern = like_pattern(&needle);
        builder.push(" AND (i.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR i.description ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR i.location_address ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    if let Some(status) = filter.status {
        builder.push(" AND i.status = ");
        builder.push_bind(status);
    }
    if let Some(priority) = filter.priority {
        builder.push(" AND i.priority = ");
        builder.push_bind(priority);
    }
    if let Some(category) = filter.category {
        builder.push(" AND i.category = ");
        builder.push_bind(category);
    }
    if let Some(reporter) = filter.reporter {
        builder.push(" AND i.reporter_id = ");
        builder.push_bind(reporter);
    }
    if filter.with_location {
        builder.push(" AND i.latitude IS NOT NULL AND i.longitude IS NOT NULL");
    }
    if !filter.include_resolved {
        builder.push(" AND i.status <> 'resolved'");
    }
}

fn order_clause(sort: IssueSort) -> &'static str {
    match sort {
        IssueSort::Newest => " ORDER BY i.created_at DESC",
        IssueSort::Oldest => " ORDER BY i.created_at ASC",
        IssueSort::MostVoted => " ORDER BY COALESCE(v.net, 0) DESC, i.created_at DESC",
        IssueSort::Priority => {
            " ORDER BY CASE i.priority WHEN 'urgent' THEN 4 WHEN 'high' THEN 3 \
             WHEN 'medium' THEN 2 ELSE 1 END DESC, i.created_at DESC"
        }
    }
}

#[async_trait]
impl IssueStore for PgIssueStore {
    async fn create_issue(&self, new: NewIssue) -> CivicResult<Issue> {
        new.validate()?;
        let issue = Issue::from_new(new, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO issues (id, title, description, category, priority, status,
                                location_address, latitude, longitude, image_url,
                                reporter_id, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(issue.id)
        .bind(&issue.title)
        .bind(&issue.description)
        .bind(issue.category)
        .bind(issue.priority)
        .bind(issue.status)
        .bind(&issue.location_address)
        .bind(issue.location.map(|p| p.latitude))
        .bind(issue.location.map(|p| p.longitude))
        .bind(&issue.image_url)
        .bind(issue.reporter_id)
        .bind(issue.created_at)
        .bind(issue.resolved_at)
        .execute(&self.pool)
        .await?;

        info!(issue_id = %issue.id, category = %issue.category, "Issue created");
        self.feed.publish(ChangeEvent::IssueInserted {
            issue: issue.clone(),
        });
        Ok(issue)
    }

    async fn get_issue(&self, id: IssueId) -> CivicResult<Option<Issue>> {
        self.fetch_issue(id).await
    }

    async fn list_issues(&self, filter: &IssueFilter, sort: IssueSort) -> CivicResult<Vec<Issue>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM issues i", ISSUE_COLUMNS));
        if sort == IssueSort::MostVoted {
            builder.push(
                " LEFT JOIN (SELECT issue_id, \
                 SUM(CASE WHEN vote_type = 'upvote' THEN 1 ELSE -1 END) AS net \
                 FROM votes GROUP BY issue_id) v ON v.issue_id = i.id",
            );
        }
        builder.push(" WHERE 1=1");
        push_filters(&mut builder, filter);
        builder.push(order_clause(sort));
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder
            .build_query_as::<IssueRow>()
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn update_status(
        &self,
        id: IssueId,
        expected: IssueStatus,
        status: IssueStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> CivicResult<Issue> {
        let mut tx = self.pool.begin().await?;
        let old = lock_issue(&mut tx, id).await?;
        if old.status != expected {
            return Err(status_conflict(id, expected, old.status));
        }

        let sql = format!(
            "UPDATE issues i SET status = $2, resolved_at = $3 WHERE i.id = $1 RETURNING {}",
            ISSUE_COLUMNS
        );
        let new: Issue = sqlx::query_as::<_, IssueRow>(&sql)
            .bind(id)
            .bind(status)
            .bind(resolved_at)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;
        tx.commit().await?;

        debug!(issue_id = %id, from = %old.status, to = %new.status, "Issue status updated");
        self.feed.publish(ChangeEvent::IssueUpdated {
            old,
            new: new.clone(),
        });
        Ok(new)
    }

    async fn update_priority(&self, id: IssueId, priority: Priority) -> CivicResult<Issue> {
        let mut tx = self.pool.begin().await?;
        let old = lock_issue(&mut tx, id).await?;

        let sql = format!(
            "UPDATE issues i SET priority = $2 WHERE i.id = $1 RETURNING {}",
            ISSUE_COLUMNS
        );
        let new: Issue = sqlx::query_as::<_, IssueRow>(&sql)
            .bind(id)
            .bind(priority)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;
        tx.commit().await?;

        debug!(issue_id = %id, priority = %priority, "Issue priority updated");
        self.feed.publish(ChangeEvent::IssueUpdated {
            old,
            new: new.clone(),
        });
        Ok(new)
    }

    async fn list_votes(&self, issue_id: IssueId) -> CivicResult<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(
            "SELECT id, issue_id, user_id, vote_type FROM votes WHERE issue_id = $1",
        )
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn votes_for_issues(&self, issue_ids: &[IssueId]) -> CivicResult<Vec<Vote>> {
        if issue_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, VoteRow>(
            "SELECT id, issue_id, user_id, vote_type FROM votes WHERE issue_id = ANY($1)",
        )
        .bind(issue_ids)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn get_vote(&self, issue_id: IssueId, voter_id: UserId) -> CivicResult<Option<Vote>> {
        let row = sqlx::query_as::<_, VoteRow>(
            "SELECT id, issue_id, user_id, vote_type FROM votes WHERE issue_id = $1 AND user_id = $2",
        )
        .bind(issue_id)
        .bind(voter_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Vote::try_from).transpose()?)
    }

    async fn apply_vote_change(&self, change: &VoteSetChange) -> CivicResult<()> {
        // Each statement touches one row and is atomic on its own; zero rows
        // affected means the row moved underneath us.
        let result = match change {
            VoteSetChange::Inserted { vote } => {
                sqlx::query(
                    r#"
                    INSERT INTO votes (id, issue_id, user_id, vote_type)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (issue_id, user_id) DO NOTHING
                    "#,
                )
                .bind(vote.id)
                .bind(vote.issue_id)
                .bind(vote.voter_id)
                .bind(vote.kind)
                .execute(&self.pool)
                .await?
            }
            VoteSetChange::Switched { vote, previous } => {
                sqlx::query("UPDATE votes SET vote_type = $2 WHERE id = $1 AND vote_type = $3")
                    .bind(vote.id)
                    .bind(vote.kind)
                    .bind(*previous)
                    .execute(&self.pool)
                    .await?
            }
            VoteSetChange::Removed { vote } => {
                sqlx::query("DELETE FROM votes WHERE id = $1 AND vote_type = $2")
                    .bind(vote.id)
                    .bind(vote.kind)
                    .execute(&self.pool)
                    .await?
            }
        };

        let vote = change.vote();
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "vote by {} on issue {} changed concurrently",
                vote.voter_id, vote.issue_id
            ))
            .into());
        }
        debug!(issue_id = %vote.issue_id, voter_id = %vote.voter_id, result = ?change.resulting_vote(), "Vote applied");
        Ok(())
    }

    async fn create_comment(&self, new: NewComment) -> CivicResult<Comment> {
        if self.fetch_issue(new.issue_id).await?.is_none() {
            return Err(CivicError::issue_not_found(new.issue_id));
        }
        let comment = new.into_comment(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO comments (id, issue_id, user_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(comment.id)
        .bind(comment.issue_id)
        .bind(comment.author_id)
        .bind(&comment.body)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

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
        let sql = match order {
            CommentOrder::Ascending => {
                "SELECT id, issue_id, user_id, content, created_at FROM comments \
                 WHERE issue_id = $1 ORDER BY created_at ASC"
            }
            CommentOrder::Descending => {
                "SELECT id, issue_id, user_id, content, created_at FROM comments \
                 WHERE issue_id = $1 ORDER BY created_at DESC"
            }
        };
        let rows = sqlx::query_as::<_, CommentRow>(sql)
            .bind(issue_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn count_comments(&self, issue_id: IssueId) -> CivicResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE issue_id = $1")
            .bind(issue_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    fn changes(&self) -> ChangeFeed {
        self.feed.clone()
    }
}

const PROFILE_COLUMNS: &str = "id, full_name, email, phone, address, role, created_at";

#[async_trait]
impl ProfileDirectory for PgIssueStore {
    async fn get_profile(&self, user_id: UserId) -> CivicResult<Option<Profile>> {
        let sql = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Profile::try_from).transpose()?)
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> CivicResult<Vec<Profile>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM profiles WHERE 1=1", PROFILE_COLUMNS));
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = like_pattern(term);
            builder.push(" AND (full_name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR email ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if let Some(role) = filter.role {
            builder.push(" AND role = ");
            builder.push_bind(role);
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<ProfileRow>()
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn upsert_profile(&self, profile: Profile) -> CivicResult<Profile> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, full_name, email, phone, address, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                address = EXCLUDED.address,
                role = EXCLUDED.role
            "#,
        )
        .bind(profile.id)
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(&profile.phone)
        .bind(&profile.address)
        .bind(profile.role)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn update_role(&self, user_id: UserId, role: Role) -> CivicResult<Profile> {
        let sql = format!(
            "UPDATE profiles SET role = $2 WHERE id = $1 RETURNING {}",
            PROFILE_COLUMNS
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CivicError::profile_not_found(user_id))?;
        info!(user_id = %user_id, role = %role, "Role updated");
        Ok(row.try_into()?)
    }

    async fn count_profiles(&self) -> CivicResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
