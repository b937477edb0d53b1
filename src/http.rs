//! Outbound JSON-over-HTTP client shared by the payment and shipping adapters.
//!
//! Every request carries a per-call timeout. Only idempotent `GET` requests
//! are retried; a retried `POST` could create a duplicate shipment or pickup.

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error)]
pub enum HttpCallError {
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid JSON response: {message}")]
    Decode { message: String },
}

impl HttpCallError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, HttpCallError::Status { status: 401, .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            HttpCallError::Timeout { .. } | HttpCallError::Transport { .. } => true,
            HttpCallError::Status { status, .. } => *status == 429 || *status >= 500,
            HttpCallError::Decode { .. } => false,
        }
    }
}

/// Credentials attached to a single request
#[derive(Debug, Clone, Copy)]
pub enum RequestAuth<'a> {
    None,
    Bearer(&'a str),
    Basic { username: &'a str, password: &'a str },
}

#[derive(Clone)]
pub struct ProviderHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl ProviderHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, HttpCallError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpCallError::Transport {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        auth: RequestAuth<'_>,
        body: Option<&JsonValue>,
    ) -> Result<T, HttpCallError> {
        let retries = if method == Method::GET {
            self.max_retries
        } else {
            0
        };

        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), url, auth, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < retries => {
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        error = %e,
                        "provider request failed, retrying"
                    );
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        auth: RequestAuth<'_>,
        body: Option<&JsonValue>,
    ) -> Result<T, HttpCallError> {
        let mut request = self.client.request(method, url).timeout(self.timeout);

        request = match auth {
            RequestAuth::None => request,
            RequestAuth::Bearer(token) => request.bearer_auth(token),
            RequestAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            return Err(HttpCallError::Status {
                status: status.as_u16(),
                message: extract_provider_message(&text),
            });
        }

        serde_json::from_str::<T>(&text).map_err(|e| HttpCallError::Decode {
            message: e.to_string(),
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> HttpCallError {
        if err.is_timeout() {
            HttpCallError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            HttpCallError::Transport {
                message: err.to_string(),
            }
        }
    }
}

/// Delay before retry `attempt` (zero-based): 200ms doubling, capped at 6.4s
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(200u64 << attempt.min(5))
}

/// Pull a human-readable message out of a provider error body.
///
/// Shiprocket answers `{"message": ...}`, Razorpay answers
/// `{"error": {"description": ...}}`; anything else is returned trimmed.
pub fn extract_provider_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<JsonValue>(body) {
        let message = parsed
            .get("message")
            .and_then(|v| v.as_str())
            .or_else(|| {
                parsed
                    .get("error")
                    .and_then(|e| e.get("description"))
                    .and_then(|v| v.as_str())
            });
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.len() > 512 {
        let mut end = 512;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_shiprocket_message() {
        let body = r#"{"message":"Wrong Pickup location entered","status_code":422}"#;
        assert_eq!(extract_provider_message(body), "Wrong Pickup location entered");
    }

    #[test]
    fn extracts_razorpay_description() {
        let body = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"amount exceeds maximum"}}"#;
        assert_eq!(extract_provider_message(body), "amount exceeds maximum");
    }

    #[test]
    fn falls_back_to_raw_body() {
        assert_eq!(extract_provider_message("  gateway down \n"), "gateway down");
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(0), Duration::from_millis(200));
        assert_eq!(retry_backoff(2), Duration::from_millis(800));
        assert_eq!(retry_backoff(5), Duration::from_millis(6400));
        assert_eq!(retry_backoff(40), Duration::from_millis(6400));
        assert_eq!(retry_backoff(u32::MAX), Duration::from_millis(6400));
    }

    #[test]
    fn retryable_classification() {
        assert!(HttpCallError::Timeout { timeout_secs: 5 }.is_retryable());
        assert!(HttpCallError::Status {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!HttpCallError::Status {
            status: 422,
            message: String::new()
        }
        .is_retryable());
        assert!(HttpCallError::Status {
            status: 401,
            message: String::new()
        }
        .is_unauthorized());
    }
}
