use super::CheckResult;
use crate::command::ExecContext;
use crate::config::HttpCheckSpec;
use crate::error::{Result, VigilError};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

const TCP: &str = "tcp_port";
const HTTP: &str = "http";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;

/// Passes when a TCP connection can be established
#[derive(Debug, Clone)]
pub struct TcpChecker {
    address: String,
}

impl TcpChecker {
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(VigilError::InvalidCheck(
                "tcp_port check requires tcp_port".to_string(),
            ));
        }
        Ok(Self {
            address: normalize_address(raw),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn check(&self, ctx: &ExecContext) -> CheckResult {
        let started = Instant::now();

        match tokio::time::timeout_at(ctx.deadline(), TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                CheckResult::pass(TCP, started, format!("connection to {} successful", self.address))
            }
            Ok(Err(e)) => CheckResult::fail(
                TCP,
                started,
                format!("connection to {} failed: {}", self.address, e),
            ),
            Err(_) => CheckResult::fail(
                TCP,
                started,
                format!("connection to {} failed: timed out", self.address),
            ),
        }
    }
}

/// `8080` and `:8080` both mean the local loopback port
fn normalize_address(raw: &str) -> String {
    if let Some(port) = raw.strip_prefix(':') {
        format!("127.0.0.1:{}", port)
    } else if !raw.contains(':') {
        format!("127.0.0.1:{}", raw)
    } else {
        raw.to_string()
    }
}

/// Passes when an HTTP request returns the expected status
#[derive(Debug, Clone)]
pub struct HttpChecker {
    client: Client,
    url: String,
    method: String,
    headers: BTreeMap<String, String>,
    body: Option<String>,
    expected_status: u16,
}

impl HttpChecker {
    pub fn new(spec: &HttpCheckSpec) -> Result<Self> {
        if spec.url.is_empty() {
            return Err(VigilError::InvalidCheck("http check requires url".to_string()));
        }

        let timeout = spec
            .timeout_seconds
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self {
            client,
            url: spec.url.clone(),
            method: spec
                .method
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "GET".to_string()),
            headers: spec.headers.clone(),
            body: spec.body.clone(),
            expected_status: spec.expected_status.filter(|s| *s > 0).unwrap_or(200),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn check(&self, ctx: &ExecContext) -> CheckResult {
        let started = Instant::now();

        let method = match Method::from_bytes(self.method.as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                return CheckResult::fail(HTTP, started, format!("failed to create request: {}", e))
            }
        };

        let mut builder = self.client.request(method, &self.url);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        let request = match builder.build() {
            Ok(request) => request,
            Err(e) => {
                return CheckResult::fail(HTTP, started, format!("failed to create request: {}", e))
            }
        };

        let response =
            match tokio::time::timeout_at(ctx.deadline(), self.client.execute(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    return CheckResult::fail(HTTP, started, format!("http request failed: {}", e))
                }
                Err(_) => {
                    return CheckResult::fail(
                        HTTP,
                        started,
                        "http request failed: deadline exceeded",
                    )
                }
            };

        let status = response.status().as_u16();
        if status != self.expected_status {
            return CheckResult::fail(
                HTTP,
                started,
                format!(
                    "unexpected status code: got {}, expected {}",
                    status, self.expected_status
                ),
            );
        }

        CheckResult::pass(HTTP, started, format!("http check passed (status: {})", status))
    }
}
