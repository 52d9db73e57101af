//! Trait abstraction for outbound mail to enable testing

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::AlertConfig;
use crate::error::{Result, TelemetryError};

use super::message::OutgoingMail;

/// Trait for authenticated mail delivery
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Authenticate with the mail server
    ///
    /// Called once at startup; a failure disables alerting for the process.
    async fn login(&self) -> Result<()>;

    /// Deliver one composed mail
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// SMTP delivery over STARTTLS
pub struct SmtpMailer {
    sender: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("sender", &self.sender.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Build a mailer from the `[alerts]` section and the sender password
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Mail`] if the sender address is malformed or
    /// the relay cannot be configured.
    pub fn new(config: &AlertConfig, password: String) -> Result<Self> {
        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| TelemetryError::Mail(format!("Invalid sender {}: {}", config.sender, e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| TelemetryError::Mail(format!("Invalid SMTP relay {}: {}", config.smtp_host, e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(sender.email.to_string(), password))
            .build();

        Ok(Self { sender, transport })
    }

    fn build_message(&self, mail: OutgoingMail) -> Result<Message> {
        let address: Address = mail
            .to_email
            .parse()
            .map_err(|e| TelemetryError::Mail(format!("Invalid recipient {}: {}", mail.to_email, e)))?;
        let to = Mailbox::new(Some(mail.to_name), address);

        let mut body = MultiPart::mixed().singlepart(SinglePart::plain(mail.body));
        for attachment in mail.attachments {
            body = body.singlepart(
                Attachment::new(attachment.filename).body(attachment.content, ContentType::TEXT_PLAIN),
            );
        }

        Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(mail.subject)
            .multipart(body)
            .map_err(|e| TelemetryError::Mail(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn login(&self) -> Result<()> {
        match self.transport.test_connection().await {
            Ok(true) => {
                info!("Logged in to mail server as {}", self.sender);
                Ok(())
            }
            Ok(false) => Err(TelemetryError::MailAuth(
                "mail server closed the connection".to_string(),
            )),
            Err(e) => Err(TelemetryError::MailAuth(e.to_string())),
        }
    }

    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let recipient = mail.to_email.clone();
        let message = self.build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| TelemetryError::Mail(format!("Failed to send to {}: {}", recipient, e)))?;
        debug!("Alert mail delivered to {}", recipient);
        Ok(())
    }
}
