use chrono::{Datelike, NaiveDateTime};
use rusqlite::Row;

use crate::blog::domain::PostStatus;

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: NaiveDateTime,
}

impl User {
    pub const COLUMNS: &'static str =
        "id, username, email, password_hash, is_active, is_superuser, date_joined";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            is_active: row.get(4)?,
            is_superuser: row.get(5)?,
            date_joined: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub cleared_at: Option<NaiveDateTime>,
}

impl RegistrationToken {
    pub const COLUMNS: &'static str = "id, user_id, token, created_at, cleared_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            token: row.get(2)?,
            created_at: row.get(3)?,
            cleared_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub author_id: i64,
    pub author_username: String,
    pub status: PostStatus,
    pub publish: NaiveDateTime,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
    pub image_url: Option<String>,
}

impl Post {
    /// Select list for queries over `posts p JOIN users u ON u.id = p.author_id`.
    pub const COLUMNS: &'static str = "p.id, p.title, p.slug, p.body, p.author_id, u.username, \
         p.status, p.publish, p.created, p.updated, p.image_url";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            slug: row.get(2)?,
            body: row.get(3)?,
            author_id: row.get(4)?,
            author_username: row.get(5)?,
            status: row.get(6)?,
            publish: row.get(7)?,
            created: row.get(8)?,
            updated: row.get(9)?,
            image_url: row.get(10)?,
        })
    }

    pub fn absolute_url(&self) -> String {
        format!(
            "/{}/{}/{}/{}",
            self.publish.year(),
            self.publish.month(),
            self.publish.day(),
            self.slug
        )
    }

    pub fn publish_display(&self) -> String {
        self.publish.format("%B %-d, %Y").to_string()
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }

    pub fn image(&self) -> &str {
        self.image_url.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub body: String,
    pub active: bool,
    pub created: NaiveDateTime,
    pub like_count: i64,
    pub liked_by_viewer: bool,
}

impl Comment {
    pub fn created_display(&self) -> String {
        self.created.format("%b %-d, %Y %H:%M").to_string()
    }
}
