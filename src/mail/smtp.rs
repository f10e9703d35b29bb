use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{MailError, Mailer, OutgoingEmail};
use crate::config::EmailConfig;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig, host: &str) -> Result<Self, MailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.parse()?,
        })
    }
}

fn build_message(from: &Mailbox, email: OutgoingEmail) -> Result<Message, MailError> {
    Ok(Message::builder()
        .from(from.clone())
        .to(email.to.parse()?)
        .subject(email.subject)
        .header(ContentType::TEXT_PLAIN)
        .body(email.body)?)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let to = email.to.clone();
        let message = build_message(&self.from, email)?;
        self.transport.send(message).await?;
        tracing::info!(to = %to, "Email sent");
        Ok(())
    }
}
