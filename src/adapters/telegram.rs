//! Telegram bot notifications

use super::{Notification, Notifier};
use crate::config::TelegramConfig;
use crate::error::{Result, VigilError};
use crate::supervisor::EventKind;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram notification client
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(VigilError::Validation("telegram bot_token is required".to_string()));
        }
        if config.chat_id.is_empty() {
            return Err(VigilError::Validation("telegram chat_id is required".to_string()));
        }

        let base = config
            .api_base
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/');

        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            endpoint: format!("{}/bot{}/sendMessage", base, config.bot_token),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Legacy Markdown message body. Kind and target sit in code spans; the
    /// free-text message is escaped.
    pub fn format_message(notification: &Notification) -> String {
        let icon = match notification.kind {
            EventKind::RecoverySuccess | EventKind::CheckPassed => "✅",
            EventKind::CheckFailed => "⚠️",
            EventKind::RecoveryFailed => "🔴",
        };
        format!(
            "{} *vigil alert*\n\n*Type:* `{}`\n*Target:* `{}`\n*Severity:* {}\n*Time:* {}\n\n*Message:*\n{}",
            icon,
            notification.kind,
            notification.target.replace('`', "'"),
            notification.severity,
            notification.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            escape_markdown(&notification.message)
        )
    }
}

/// Escape the characters legacy Markdown treats as entity delimiters.
/// Code spans cannot contain escapes, so this applies to plain text only.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn kind(&self) -> &'static str {
        "telegram"
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: Self::format_message(notification),
            parse_mode: "Markdown",
        };

        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(VigilError::Notification(format!(
                "telegram returned status {}: {}",
                status.as_u16(),
                text
            )));
        }

        debug!(target = %notification.target, "telegram notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{AlertLevel, SupervisorEvent};
    use axum::{extract::Path, routing::post, Json, Router};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_send_message_request() {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, serde_json::Value)>();
        let app = Router::new().route(
            "/:bot/sendMessage",
            post(move |Path(bot): Path<String>, Json(body): Json<serde_json::Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((bot, body));
                    Json(serde_json::json!({"ok": true}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let notifier = TelegramNotifier::new(&TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "-42".to_string(),
            api_base: Some(format!("http://{}/", addr)),
        })
        .unwrap();

        let event = SupervisorEvent::new(EventKind::CheckFailed, "db", "connection refused");
        notifier
            .notify(&Notification::from_event(&event, AlertLevel::Warning))
            .await
            .unwrap();

        let (bot, body) = rx.recv().await.unwrap();
        assert_eq!(bot, "bot123:abc");
        assert_eq!(body["chat_id"], "-42");
        assert_eq!(body["parse_mode"], "Markdown");
        let text = body["text"].as_str().unwrap();
        assert!(text.contains("*Target:* `db`"));
        assert!(text.contains("*Severity:* warning"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_format_message_escapes_markdown() {
        let event = SupervisorEvent::new(
            EventKind::RecoveryFailed,
            "my_app`1",
            "tcp_port: *:8080 refused [retry] `exit 1`",
        );
        let text =
            TelegramNotifier::format_message(&Notification::from_event(&event, AlertLevel::Critical));

        assert!(text.contains("*Type:* `recovery_failed`"), "{}", text);
        assert!(text.contains("*Target:* `my_app'1`"), "{}", text);
        assert!(
            text.contains("tcp\\_port: \\*:8080 refused \\[retry] \\`exit 1\\`"),
            "{}",
            text
        );
        assert!(!text.contains("tcp_port"), "{}", text);
    }

    #[test]
    fn test_requires_token_and_chat() {
        let config = TelegramConfig {
            bot_token: String::new(),
            chat_id: "1".to_string(),
            api_base: None,
        };
        assert!(TelegramNotifier::new(&config).is_err());
    }
}
