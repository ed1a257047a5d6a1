//! HTTP utilities for AWS REST-JSON API calls

use super::auth::Credentials;
use super::error::ApiError;
use super::sigv4::{self, SignableRequest};
use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Base delay for the first retry; doubles per attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for a single retry delay
const RETRY_MAX_DELAY: Duration = Duration::from_secs(20);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A single REST call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path with each dynamic segment already percent-encoded
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Signing HTTP client bound to one service endpoint
#[derive(Clone)]
pub struct AwsHttpClient {
    client: Client,
    endpoint: Url,
    credentials: Credentials,
    region: String,
    signing_name: String,
    max_attempts: u32,
}

impl AwsHttpClient {
    pub fn new(
        endpoint: &str,
        credentials: Credentials,
        region: &str,
        signing_name: &str,
        max_attempts: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("awsprov/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid endpoint URL: {endpoint}"))?;

        Ok(Self {
            client,
            endpoint,
            credentials,
            region: region.to_string(),
            signing_name: signing_name.to_string(),
            max_attempts: max_attempts.max(1),
        })
    }

    /// Send a request, retrying throttling and server errors with backoff
    pub async fn send(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let mut attempt = 1;
        loop {
            match self.send_once(request).await {
                Err(err) if err.is_throttling() && attempt < self.max_attempts => {
                    let delay = retry_delay(attempt);
                    tracing::warn!(
                        "{} {} throttled ({}), retrying in {:?} (attempt {}/{})",
                        request.method,
                        request.path,
                        err.code,
                        delay,
                        attempt,
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let mut url = self.endpoint.clone();
        let base_path = self.endpoint.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", base_path, request.path));
        if !request.query.is_empty() {
            // Encode the same way the canonical query string does
            let query = request
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }

        tracing::debug!("{} {}", request.method, url);

        let body = match &request.body {
            Some(v) => serde_json::to_vec(v).map_err(|e| ApiError::transport(e.to_string()))?,
            None => Vec::new(),
        };

        let host = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };

        let signature = sigv4::sign(
            &SignableRequest {
                method: request.method.as_str(),
                host: &host,
                path: url.path(),
                query: &request.query,
                body: &body,
            },
            &self.credentials,
            &self.region,
            &self.signing_name,
            chrono::Utc::now(),
        );

        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .header("x-amz-date", &signature.amz_date)
            .header("authorization", &signature.authorization);
        if let Some(token) = &signature.security_token {
            builder = builder.header("x-amz-security-token", token);
        }
        if request.body.is_some() {
            builder = builder
                .header("content-type", "application/json")
                .body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("Failed to send request: {e}")))?;

        let status = response.status();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::transport(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(ApiError::from_response(
                status.as_u16(),
                error_type.as_deref(),
                &text,
            ));
        }

        // Handle empty response
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| ApiError::transport(format!("Failed to parse response JSON: {e}")))
    }
}

/// Exponential backoff for the given attempt (1-based)
pub fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
    RETRY_BASE_DELAY.saturating_mul(factor).min(RETRY_MAX_DELAY)
}

/// Percent-encode a single path segment (IDs, ARNs)
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_grows_and_caps() {
        assert_eq!(retry_delay(1), Duration::from_millis(100));
        assert_eq!(retry_delay(2), Duration::from_millis(200));
        assert_eq!(retry_delay(4), Duration::from_millis(800));
        assert_eq!(retry_delay(30), RETRY_MAX_DELAY);
    }

    #[test]
    fn test_sanitize_truncates() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.contains("500 bytes total"));
    }

    #[test]
    fn test_segment_encodes_arn() {
        assert_eq!(
            segment("arn:aws:m2:us-east-1:123:app/abc"),
            "arn%3Aaws%3Am2%3Aus-east-1%3A123%3Aapp%2Fabc"
        );
    }
}
