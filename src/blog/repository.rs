// Repository pattern - all blog SQL lives here
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, OptionalExtension, TransactionBehavior};

use crate::blog::domain::{PostFilter, PostStatus};
use crate::db::models::{Comment, Post};
use crate::db::{is_unique_violation, RepoResult, RepositoryError};
use crate::state::DbPool;

/// Fields written when a post is created.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub body: String,
    pub author_id: i64,
    pub status: PostStatus,
    pub publish: NaiveDateTime,
    pub image_url: Option<String>,
}

/// Fields an edit may change. Author and publish date are not among them.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub title: String,
    pub slug: String,
    pub body: String,
    pub status: PostStatus,
    pub image_url: Option<String>,
}

/// Minimal view of a comment, used by the like and moderation toggles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRef {
    pub id: i64,
    pub post_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeToggle {
    Liked,
    Unliked,
}

#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Number of published posts matching the filter
    async fn count_published(&self, filter: &PostFilter) -> RepoResult<u64>;

    /// One page of published posts, newest first
    async fn list_published(
        &self,
        filter: &PostFilter,
        limit: u64,
        offset: u64,
    ) -> RepoResult<Vec<Post>>;

    /// Published post by publish date and slug
    async fn find_published(&self, date: NaiveDate, slug: &str) -> RepoResult<Option<Post>>;

    /// Any post by id, whatever its status
    async fn find_post(&self, id: i64) -> RepoResult<Option<Post>>;

    async fn create_post(&self, post: &NewPost, now: NaiveDateTime) -> RepoResult<Post>;

    async fn update_post(
        &self,
        id: i64,
        changes: &PostChanges,
        now: NaiveDateTime,
    ) -> RepoResult<Post>;

    /// Returns false when there was nothing to delete
    async fn delete_post(&self, id: i64) -> RepoResult<bool>;

    async fn add_comment(
        &self,
        post_id: i64,
        author_id: i64,
        body: &str,
        now: NaiveDateTime,
    ) -> RepoResult<i64>;

    /// Comments on a post, oldest first, with like counts for `viewer`
    async fn comments_for_post(
        &self,
        post_id: i64,
        viewer: Option<i64>,
        include_inactive: bool,
    ) -> RepoResult<Vec<Comment>>;

    async fn find_comment(&self, id: i64) -> RepoResult<Option<CommentRef>>;

    /// Remove the (comment, user) like if present, create it otherwise
    async fn toggle_like(&self, comment_id: i64, user_id: i64) -> RepoResult<LikeToggle>;

    async fn like_count(&self, comment_id: i64) -> RepoResult<i64>;

    /// Flip the moderation flag, returning the new value
    async fn toggle_comment_active(&self, comment_id: i64, now: NaiveDateTime)
        -> RepoResult<bool>;
}

pub struct SqliteBlogRepository {
    pool: DbPool,
}

impl SqliteBlogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// WHERE clause for the published listing. Always restricted to published rows.
fn published_where(filter: &PostFilter) -> (String, Vec<Box<dyn ToSql + Send>>) {
    let mut clauses = vec!["p.status = ?".to_string()];
    let mut values: Vec<Box<dyn ToSql + Send>> = vec![Box::new(PostStatus::Published)];

    if let Some(after) = filter.published_after {
        clauses.push("p.publish >= ?".to_string());
        values.push(Box::new(after));
    }
    if let Some(before) = filter.published_before {
        clauses.push("p.publish <= ?".to_string());
        values.push(Box::new(before));
    }
    if let Some(author_id) = filter.author_id {
        clauses.push("p.author_id = ?".to_string());
        values.push(Box::new(author_id));
    }

    (clauses.join(" AND "), values)
}

fn load_post(conn: &rusqlite::Connection, id: i64) -> RepoResult<Option<Post>> {
    let sql = format!(
        "SELECT {} FROM posts p JOIN users u ON u.id = p.author_id WHERE p.id = ?1",
        Post::COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![id], Post::from_row)
        .optional()?)
}

/// Insert a like. The unique (comment, user) pair is the real guard: a
/// duplicate row means another request already liked it, which counts as liked.
fn insert_like(
    conn: &rusqlite::Connection,
    comment_id: i64,
    user_id: i64,
) -> RepoResult<LikeToggle> {
    match conn.execute(
        "INSERT INTO comment_likes (comment_id, user_id) VALUES (?1, ?2)",
        params![comment_id, user_id],
    ) {
        Ok(_) => Ok(LikeToggle::Liked),
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(comment_id, user_id, "Like already present");
            Ok(LikeToggle::Liked)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BlogRepository for SqliteBlogRepository {
    async fn count_published(&self, filter: &PostFilter) -> RepoResult<u64> {
        let conn = self.pool.get()?;
        let (clause, values) = published_where(filter);
        let sql = format!("SELECT COUNT(*) FROM posts p WHERE {clause}");
        let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn list_published(
        &self,
        filter: &PostFilter,
        limit: u64,
        offset: u64,
    ) -> RepoResult<Vec<Post>> {
        let conn = self.pool.get()?;
        let (clause, mut values) = published_where(filter);
        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));

        let sql = format!(
            "SELECT {} FROM posts p JOIN users u ON u.id = p.author_id
             WHERE {clause}
             ORDER BY p.publish DESC, p.id DESC
             LIMIT ? OFFSET ?",
            Post::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params_from_iter(values.iter()), Post::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn find_published(&self, date: NaiveDate, slug: &str) -> RepoResult<Option<Post>> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM posts p JOIN users u ON u.id = p.author_id
             WHERE p.status = ?1 AND date(p.publish) = ?2 AND p.slug = ?3
             ORDER BY p.id
             LIMIT 1",
            Post::COLUMNS
        );
        let date = date.format("%Y-%m-%d").to_string();
        Ok(conn
            .query_row(
                &sql,
                params![PostStatus::Published, date, slug],
                Post::from_row,
            )
            .optional()?)
    }

    async fn find_post(&self, id: i64) -> RepoResult<Option<Post>> {
        let conn = self.pool.get()?;
        load_post(&conn, id)
    }

    async fn create_post(&self, post: &NewPost, now: NaiveDateTime) -> RepoResult<Post> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (title, slug, body, author_id, status, publish, created, updated, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)",
            params![
                post.title,
                post.slug,
                post.body,
                post.author_id,
                post.status,
                post.publish,
                now,
                post.image_url
            ],
        )?;
        let id = conn.last_insert_rowid();
        load_post(&conn, id)?.ok_or_else(|| RepositoryError::NotFound(format!("post {id}")))
    }

    async fn update_post(
        &self,
        id: i64,
        changes: &PostChanges,
        now: NaiveDateTime,
    ) -> RepoResult<Post> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE posts
             SET title = ?2, slug = ?3, body = ?4, status = ?5, image_url = ?6, updated = ?7
             WHERE id = ?1",
            params![
                id,
                changes.title,
                changes.slug,
                changes.body,
                changes.status,
                changes.image_url,
                now
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("post {id}")));
        }
        load_post(&conn, id)?.ok_or_else(|| RepositoryError::NotFound(format!("post {id}")))
    }

    async fn delete_post(&self, id: i64) -> RepoResult<bool> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn add_comment(
        &self,
        post_id: i64,
        author_id: i64,
        body: &str,
        now: NaiveDateTime,
    ) -> RepoResult<i64> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO comments (post_id, author_id, body, active, created, updated)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![post_id, author_id, body, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn comments_for_post(
        &self,
        post_id: i64,
        viewer: Option<i64>,
        include_inactive: bool,
    ) -> RepoResult<Vec<Comment>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.post_id, c.author_id, u.username, c.body, c.active, c.created,
                    (SELECT COUNT(*) FROM comment_likes l WHERE l.comment_id = c.id),
                    EXISTS (SELECT 1 FROM comment_likes l
                            WHERE l.comment_id = c.id AND l.user_id = ?2)
             FROM comments c JOIN users u ON u.id = c.author_id
             WHERE c.post_id = ?1 AND (c.active = 1 OR ?3)
             ORDER BY c.created, c.id",
        )?;
        let comments = stmt
            .query_map(params![post_id, viewer, include_inactive], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    author_id: row.get(2)?,
                    author_username: row.get(3)?,
                    body: row.get(4)?,
                    active: row.get(5)?,
                    created: row.get(6)?,
                    like_count: row.get(7)?,
                    liked_by_viewer: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn find_comment(&self, id: i64) -> RepoResult<Option<CommentRef>> {
        let conn = self.pool.get()?;
        Ok(conn
            .query_row(
                "SELECT id, post_id FROM comments WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CommentRef {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    async fn toggle_like(&self, comment_id: i64, user_id: i64) -> RepoResult<LikeToggle> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute(
            "DELETE FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
            params![comment_id, user_id],
        )?;

        let outcome = if removed > 0 {
            LikeToggle::Unliked
        } else {
            insert_like(&tx, comment_id, user_id)?
        };

        tx.commit()?;
        Ok(outcome)
    }

    async fn like_count(&self, comment_id: i64) -> RepoResult<i64> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
            params![comment_id],
            |row| row.get(0),
        )?)
    }

    async fn toggle_comment_active(
        &self,
        comment_id: i64,
        now: NaiveDateTime,
    ) -> RepoResult<bool> {
        let conn = self.pool.get()?;
        conn.query_row(
            "UPDATE comments SET active = NOT active, updated = ?2
             WHERE id = ?1
             RETURNING active",
            params![comment_id, now],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("comment {comment_id}")))
    }
}
