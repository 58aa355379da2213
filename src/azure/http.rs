//! HTTP utilities for Azure Resource Manager calls

use crate::error::ApiError;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and drops control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull `error.message` out of an ARM error body, falling back to the status text
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

/// HTTP client wrapper for ARM calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("azlist/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Make a GET request
    pub async fn get(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);
        let request = self.client.get(url);
        self.send("GET", url, token, request).await
    }

    /// Make a POST request with a JSON body
    pub async fn post(&self, url: &str, token: &str, body: &Value) -> Result<Value, ApiError> {
        tracing::debug!("POST {}", url);
        let request = self.client.post(url).json(body);
        self.send("POST", url, token, request).await
    }

    async fn send(
        &self,
        method: &'static str,
        url: &str,
        token: &str,
        request: RequestBuilder,
    ) -> Result<Value, ApiError> {
        let response = request
            .bearer_auth(token)
            .header("Accept", "application/json")
            .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // 404 is routine when listing child collections
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!("API not found: {} {}", method, url);
            } else {
                // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            }
            return Err(ApiError::Status {
                method,
                status: status.as_u16(),
                url: url.to_string(),
                message: error_message(&body, status),
            });
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("{} {}: {}", method, url, e)))
    }
}
