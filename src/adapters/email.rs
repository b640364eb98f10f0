//! SMTP email notifications

use super::{Notification, Notifier};
use crate::config::EmailConfig;
use crate::error::{Result, VigilError};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

const SMTP_TIMEOUT_SECS: u64 = 10;

/// Email notification client
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(VigilError::Validation("email smtp_host is required".to_string()));
        }
        if config.to.is_empty() {
            return Err(VigilError::Validation(
                "email needs at least one recipient".to_string(),
            ));
        }

        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>>>()?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            let tls = TlsParameters::new(config.smtp_host.clone())?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.smtp_host.as_str())
                .tls(Tls::Opportunistic(tls))
        };
        let mut builder = builder
            .port(config.port())
            .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            if !username.is_empty() {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    pub fn format_subject(notification: &Notification) -> String {
        format!(
            "[vigil] {} - {}",
            notification.kind.as_str().to_uppercase(),
            notification.target
        )
    }

    /// Plain-text body
    pub fn format_body(notification: &Notification) -> String {
        format!(
            "vigil alert\n\nType: {}\nTarget: {}\nSeverity: {}\nTime: {}\n\nMessage:\n{}\n\n---\nThis is an automated alert from vigil\n",
            notification.kind,
            notification.target,
            notification.severity,
            notification.timestamp.to_rfc3339(),
            notification.message
        )
    }

    fn build_message(&self, notification: &Notification) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::format_subject(notification))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(Self::format_body(notification))
            .map_err(|e| VigilError::Notification(format!("failed to build email: {}", e)))
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox> {
    addr.parse::<Mailbox>()
        .map_err(|e| VigilError::Validation(format!("invalid email address '{}': {}", addr, e)))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn kind(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        let message = self.build_message(notification)?;
        let response = self.transport.send(message).await?;
        if !response.is_positive() {
            return Err(VigilError::Notification(format!(
                "smtp server replied {}",
                response.code()
            )));
        }

        debug!(target = %notification.target, recipients = self.to.len(), "email notification sent");
        Ok(())
    }
}
