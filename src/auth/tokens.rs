//! Activation tokens.
//!
//! Each user has at most one token row. A token verifies while it is not
//! cleared and younger than the configured TTL; once cleared it never
//! verifies again.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};

use crate::auth::repository::AccountRepository;
use crate::auth::session::generate_token;
use crate::db::models::{RegistrationToken, User};
use crate::db::RepoResult;

impl RegistrationToken {
    pub fn is_cleared(&self) -> bool {
        self.cleared_at.is_some()
    }

    pub fn expires_at(&self, ttl: Duration) -> NaiveDateTime {
        self.created_at + ttl
    }

    /// True when the token is still usable for `user_id` at `now`.
    pub fn verify(&self, user_id: i64, now: NaiveDateTime, ttl: Duration) -> bool {
        self.user_id == user_id && !self.is_cleared() && now < self.expires_at(ttl)
    }
}

/// Result of an activation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Activated,
    AlreadyActive,
    /// Expired, cleared, or lost a race with another activation.
    Rejected,
}

#[derive(Clone)]
pub struct TokenService {
    accounts: Arc<dyn AccountRepository>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(accounts: Arc<dyn AccountRepository>, ttl: Duration) -> Self {
        Self { accounts, ttl }
    }

    /// Create the first token for a user who has none.
    pub async fn issue(&self, user: &User, now: NaiveDateTime) -> RepoResult<RegistrationToken> {
        let token = self
            .accounts
            .insert_token(user.id, &generate_token(), now)
            .await?;
        tracing::debug!(user_id = user.id, "Issued activation token");
        Ok(token)
    }

    /// Invalidate whatever token the user holds and issue a new one.
    pub async fn reissue(&self, user: &User, now: NaiveDateTime) -> RepoResult<RegistrationToken> {
        let token = self
            .accounts
            .replace_token(user.id, &generate_token(), now)
            .await?;
        tracing::info!(user_id = user.id, "Reissued activation token");
        Ok(token)
    }

    pub fn verify(&self, token: &RegistrationToken, user: &User, now: NaiveDateTime) -> bool {
        token.verify(user.id, now, self.ttl)
    }

    pub async fn clear(&self, token: &RegistrationToken, now: NaiveDateTime) -> RepoResult<bool> {
        self.accounts.clear_token(token.id, now).await
    }

    /// Activate `user` with `token`: the user must be inactive and the token
    /// must verify. The flag flip and the token clear commit together.
    pub async fn activate(
        &self,
        user: &User,
        token: &RegistrationToken,
        now: NaiveDateTime,
    ) -> RepoResult<Activation> {
        if user.is_active {
            return Ok(Activation::AlreadyActive);
        }
        if !self.verify(token, user, now) {
            return Ok(Activation::Rejected);
        }

        if self.accounts.activate(user.id, token.id, now).await? {
            tracing::info!(user_id = user.id, username = %user.username, "Account activated");
            Ok(Activation::Activated)
        } else {
            Ok(Activation::Rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn token(created_at: NaiveDateTime) -> RegistrationToken {
        RegistrationToken {
            id: 1,
            user_id: 7,
            token: "abc".into(),
            created_at,
            cleared_at: None,
        }
    }

    #[test]
    fn fresh_token_verifies_for_its_user() {
        let t = token(at(0));
        assert!(t.verify(7, at(1), Duration::hours(24)));
    }

    #[test]
    fn token_does_not_verify_for_another_user() {
        let t = token(at(0));
        assert!(!t.verify(8, at(1), Duration::hours(24)));
    }

    #[test]
    fn token_expires_at_ttl() {
        let t = token(at(0));
        assert!(t.verify(7, at(1), Duration::hours(2)));
        assert!(!t.verify(7, at(2), Duration::hours(2)));
        assert!(!t.verify(7, at(3), Duration::hours(2)));
        assert_eq!(t.expires_at(Duration::hours(2)), at(2));
    }

    #[test]
    fn cleared_token_never_verifies() {
        let mut t = token(at(0));
        t.cleared_at = Some(at(0));
        assert!(t.is_cleared());
        assert!(!t.verify(7, at(0), Duration::hours(24)));
    }
}
