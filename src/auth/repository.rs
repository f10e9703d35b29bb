// Repository pattern - users and registration tokens
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::db::models::{RegistrationToken, User};
use crate::db::{is_constraint_violation, RepoResult, RepositoryError};
use crate::state::DbPool;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a user. Username or email clashes surface as `Conflict`.
    async fn create_user(&self, user: &NewUser, now: NaiveDateTime) -> RepoResult<User>;

    /// Insert an inactive user and its first activation token together
    async fn register_user(
        &self,
        user: &NewUser,
        token: &str,
        now: NaiveDateTime,
    ) -> RepoResult<(User, RegistrationToken)>;

    async fn find_user(&self, id: i64) -> RepoResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;

    /// Case-insensitive email lookup
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Insert a token for a user who has none. A second token is a `Conflict`.
    async fn insert_token(
        &self,
        user_id: i64,
        token: &str,
        now: NaiveDateTime,
    ) -> RepoResult<RegistrationToken>;

    /// Delete any existing token for the user and insert a fresh one atomically
    async fn replace_token(
        &self,
        user_id: i64,
        token: &str,
        now: NaiveDateTime,
    ) -> RepoResult<RegistrationToken>;

    async fn find_token(&self, token: &str, user_id: i64)
        -> RepoResult<Option<RegistrationToken>>;

    async fn token_for_user(&self, user_id: i64) -> RepoResult<Option<RegistrationToken>>;

    /// Mark a token unusable. Returns false if it was already cleared.
    async fn clear_token(&self, token_id: i64, now: NaiveDateTime) -> RepoResult<bool>;

    /// Flip the user active and clear the token in one transaction.
    /// Returns false, changing nothing, if either step finds nothing to do.
    async fn activate(&self, user_id: i64, token_id: i64, now: NaiveDateTime)
        -> RepoResult<bool>;
}

pub struct SqliteAccountRepository {
    pool: DbPool,
}

impl SqliteAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn user_conflict(e: rusqlite::Error) -> RepositoryError {
    if is_constraint_violation(&e) {
        RepositoryError::Conflict("username or email already taken".into())
    } else {
        e.into()
    }
}

fn insert_user(conn: &rusqlite::Connection, user: &NewUser, now: NaiveDateTime) -> RepoResult<i64> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, is_active, is_superuser, date_joined)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.username,
            user.email,
            user.password_hash,
            user.is_active,
            user.is_superuser,
            now
        ],
    )
    .map_err(user_conflict)?;
    Ok(conn.last_insert_rowid())
}

fn insert_token_row(
    conn: &rusqlite::Connection,
    user_id: i64,
    token: &str,
    now: NaiveDateTime,
) -> RepoResult<RegistrationToken> {
    conn.execute(
        "INSERT INTO registration_tokens (user_id, token, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, token, now],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            RepositoryError::Conflict(format!("user {user_id} already has a token"))
        } else {
            e.into()
        }
    })?;

    Ok(RegistrationToken {
        id: conn.last_insert_rowid(),
        user_id,
        token: token.to_string(),
        created_at: now,
        cleared_at: None,
    })
}

fn query_user<P: rusqlite::Params>(
    conn: &rusqlite::Connection,
    clause: &str,
    params: P,
) -> RepoResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {clause}", User::COLUMNS);
    Ok(conn.query_row(&sql, params, User::from_row).optional()?)
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn create_user(&self, user: &NewUser, now: NaiveDateTime) -> RepoResult<User> {
        let conn = self.pool.get()?;
        let id = insert_user(&conn, user, now)?;
        query_user(&conn, "id = ?1", params![id])?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))
    }

    async fn register_user(
        &self,
        user: &NewUser,
        token: &str,
        now: NaiveDateTime,
    ) -> RepoResult<(User, RegistrationToken)> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let id = insert_user(&tx, user, now)?;
        let token = insert_token_row(&tx, id, token, now)?;
        let created = query_user(&tx, "id = ?1", params![id])?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;

        tx.commit()?;
        Ok((created, token))
    }

    async fn find_user(&self, id: i64) -> RepoResult<Option<User>> {
        let conn = self.pool.get()?;
        query_user(&conn, "id = ?1", params![id])
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let conn = self.pool.get()?;
        query_user(&conn, "username = ?1", params![username])
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let conn = self.pool.get()?;
        query_user(&conn, "email = ?1", params![email])
    }

    async fn insert_token(
        &self,
        user_id: i64,
        token: &str,
        now: NaiveDateTime,
    ) -> RepoResult<RegistrationToken> {
        let conn = self.pool.get()?;
        insert_token_row(&conn, user_id, token, now)
    }

    async fn replace_token(
        &self,
        user_id: i64,
        token: &str,
        now: NaiveDateTime,
    ) -> RepoResult<RegistrationToken> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM registration_tokens WHERE user_id = ?1",
            params![user_id],
        )?;
        let fresh = insert_token_row(&tx, user_id, token, now)?;

        tx.commit()?;
        Ok(fresh)
    }

    async fn find_token(
        &self,
        token: &str,
        user_id: i64,
    ) -> RepoResult<Option<RegistrationToken>> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM registration_tokens WHERE token = ?1 AND user_id = ?2",
            RegistrationToken::COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![token, user_id], RegistrationToken::from_row)
            .optional()?)
    }

    async fn token_for_user(&self, user_id: i64) -> RepoResult<Option<RegistrationToken>> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM registration_tokens WHERE user_id = ?1",
            RegistrationToken::COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![user_id], RegistrationToken::from_row)
            .optional()?)
    }

    async fn clear_token(&self, token_id: i64, now: NaiveDateTime) -> RepoResult<bool> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE registration_tokens SET cleared_at = ?2 WHERE id = ?1 AND cleared_at IS NULL",
            params![token_id, now],
        )?;
        Ok(rows > 0)
    }

    async fn activate(
        &self,
        user_id: i64,
        token_id: i64,
        now: NaiveDateTime,
    ) -> RepoResult<bool> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let activated = tx.execute(
            "UPDATE users SET is_active = 1 WHERE id = ?1 AND is_active = 0",
            params![user_id],
        )?;
        if activated == 0 {
            return Ok(false);
        }

        let cleared = tx.execute(
            "UPDATE registration_tokens SET cleared_at = ?3
             WHERE id = ?1 AND user_id = ?2 AND cleared_at IS NULL",
            params![token_id, user_id, now],
        )?;
        if cleared == 0 {
            // Dropping the transaction rolls back the activation above.
            return Ok(false);
        }

        tx.commit()?;
        Ok(true)
    }
}
