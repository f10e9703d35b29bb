use rand::Rng;
use rusqlite::params;

use crate::db::RepoResult;
use crate::state::DbPool;

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: i64, hours: u64) -> RepoResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> RepoResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Drop every expired session. Called on login so the table stays small.
pub fn purge_expired(pool: &DbPool) -> RepoResult<usize> {
    let conn = pool.get()?;
    Ok(conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )?)
}

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

pub fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn session_cookie_carries_max_age() {
        let cookie = session_cookie("quill_session", "abc", 2);
        assert_eq!(
            cookie,
            "quill_session=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=7200"
        );
        assert!(clear_session_cookie("quill_session").ends_with("Max-Age=0"));
    }
}
