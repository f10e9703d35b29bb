pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::db::models::{RegistrationToken, User};

pub use smtp::SmtpMailer;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// Writes outgoing mail to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured, email not delivered:\n{}",
            email.body
        );
        Ok(())
    }
}

/// SMTP when a host is configured, otherwise the logging mailer.
pub fn build_mailer(config: &EmailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.smtp_host {
        Some(ref host) => {
            tracing::info!("Sending mail through {}:{}", host, config.smtp_port);
            Ok(Arc::new(SmtpMailer::new(config, host)?))
        }
        None => {
            tracing::warn!("No SMTP host configured; emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

pub fn activation_link(base_url: &str, user: &User, token: &RegistrationToken) -> String {
    format!(
        "{}/accounts/activate/{}/{}",
        base_url.trim_end_matches('/'),
        token.token,
        user.id
    )
}

pub fn activation_email(
    base_url: &str,
    user: &User,
    token: &RegistrationToken,
    ttl: Duration,
) -> OutgoingEmail {
    let link = activation_link(base_url, user, token);
    OutgoingEmail {
        to: user.email.clone(),
        subject: "Activate your account".to_string(),
        body: format!(
            "Hi {},\n\n\
             Thanks for signing up. Follow this link to activate your account:\n\n\
             {}\n\n\
             The link stays valid for {} hours. If it has expired you can ask for a new one \
             from the login page.\n",
            user.username,
            link,
            ttl.num_hours()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn user() -> User {
        let joined = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        User {
            id: 42,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            is_active: false,
            is_superuser: false,
            date_joined: joined,
        }
    }

    fn token() -> RegistrationToken {
        RegistrationToken {
            id: 1,
            user_id: 42,
            token: "deadbeef".into(),
            created_at: user().date_joined,
            cleared_at: None,
        }
    }

    #[test]
    fn link_points_at_activation_route() {
        assert_eq!(
            activation_link("https://blog.example.com/", &user(), &token()),
            "https://blog.example.com/accounts/activate/deadbeef/42"
        );
    }

    #[test]
    fn email_is_addressed_to_the_user() {
        let email = activation_email("http://localhost:8000", &user(), &token(), Duration::hours(24));
        assert_eq!(email.to, "alice@example.com");
        assert_eq!(email.subject, "Activate your account");
        assert!(email
            .body
            .contains("http://localhost:8000/accounts/activate/deadbeef/42"));
        assert!(email.body.contains("24 hours"));
    }

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        let email = activation_email("http://localhost", &user(), &token(), Duration::hours(1));
        assert!(LogMailer.send(email).await.is_ok());
    }
}
