//! Generic JSON webhook notifications
//!
//! Posts every notification as a JSON document to a configured URL.

use super::{Notification, Notifier};
use crate::config::WebhookConfig;
use crate::error::{Result, VigilError};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Webhook notification client
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    method: Method,
    headers: BTreeMap<String, String>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(VigilError::Validation("webhook url is required".to_string()));
        }

        let method_name = config
            .method
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("POST");
        let method = Method::from_bytes(method_name.to_uppercase().as_bytes())
            .map_err(|e| VigilError::Validation(format!("invalid webhook method: {}", e)))?;

        let timeout = config
            .timeout_seconds
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            method,
            headers: config.headers.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .json(notification);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VigilError::Notification(format!(
                "webhook returned status {}",
                status.as_u16()
            )));
        }

        debug!(target = %notification.target, status = status.as_u16(), "webhook notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{AlertLevel, EventKind, SupervisorEvent};
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use tokio::sync::mpsc;

    type Captured = (HeaderMap, serde_json::Value);

    async fn capture_server(status: StatusCode) -> (String, mpsc::UnboundedReceiver<Captured>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(tx): State<mpsc::UnboundedSender<Captured>>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| async move {
                        let _ = tx.send((headers, body));
                        status
                    },
                ),
            )
            .with_state(tx);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}/hook", addr), rx)
    }

    fn notification() -> Notification {
        let event = SupervisorEvent::new(EventKind::RecoveryFailed, "web", "systemctl failed");
        Notification::from_event(&event, AlertLevel::Critical)
    }

    #[tokio::test]
    async fn test_posts_json_payload_with_headers() {
        let (url, mut rx) = capture_server(StatusCode::OK).await;
        let notifier = WebhookNotifier::new(&WebhookConfig {
            url,
            method: None,
            headers: BTreeMap::from([("x-token".to_string(), "secret".to_string())]),
            timeout_seconds: None,
        })
        .unwrap();

        notifier.notify(&notification()).await.unwrap();

        let (headers, body) = rx.recv().await.unwrap();
        assert_eq!(headers["x-token"], "secret");
        assert_eq!(body["type"], "recovery_failed");
        assert_eq!(body["target"], "web");
        assert_eq!(body["severity"], "critical");
        assert_eq!(body["message"], "systemctl failed");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (url, _rx) = capture_server(StatusCode::BAD_GATEWAY).await;
        let notifier = WebhookNotifier::new(&WebhookConfig {
            url,
            method: Some("post".to_string()),
            headers: BTreeMap::new(),
            timeout_seconds: Some(2),
        })
        .unwrap();

        let err = notifier.notify(&notification()).await.unwrap_err();
        assert!(err.to_string().contains("webhook returned status 502"));
    }

    #[test]
    fn test_requires_url() {
        let config = WebhookConfig {
            url: String::new(),
            method: None,
            headers: BTreeMap::new(),
            timeout_seconds: None,
        };
        assert!(WebhookNotifier::new(&config).is_err());
    }
}
