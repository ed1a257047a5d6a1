//! API error type
//!
//! Every REST call returns a typed [`ApiError`] on failure so callers can branch on
//! the error code (not-found, throttling) instead of matching strings.

use serde_json::Value;
use thiserror::Error;

/// Error codes the services use to report a missing resource
const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFoundException",
    "NotFoundException",
    "NotFound",
];

/// Error codes that are retried with backoff
const THROTTLING_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ServiceUnavailableException",
];

/// Error returned by a cloud API call
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{code}: {message} (HTTP {status})")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a not-found error the way the services report one
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "ResourceNotFoundException", message)
    }

    /// Error raised locally when the request never produced a response
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, "RequestError", message)
    }

    /// Parse an error response body.
    ///
    /// REST-JSON services put the code in the `x-amzn-errortype` header or in a
    /// `__type`/`code`/`Code` field; the message lives in `message` or `Message`.
    pub fn from_response(status: u16, error_type: Option<&str>, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let field = |names: &[&str]| -> Option<String> {
            let obj = parsed.as_ref()?.as_object()?;
            names
                .iter()
                .find_map(|n| obj.get(*n).and_then(|v| v.as_str()))
                .map(|s| s.to_string())
        };

        let code = error_type
            .map(|s| s.to_string())
            .or_else(|| field(&["__type", "code", "Code"]))
            .map(|c| normalize_code(&c))
            .unwrap_or_else(|| default_code(status).to_string());

        let message = field(&["message", "Message", "errorMessage"]).unwrap_or_default();

        Self::new(status, code, message)
    }

    pub fn is_not_found(&self) -> bool {
        NOT_FOUND_CODES.contains(&self.code.as_str())
    }

    pub fn is_throttling(&self) -> bool {
        self.status == 429
            || (500..600).contains(&self.status)
            || THROTTLING_CODES.contains(&self.code.as_str())
    }

    pub fn code_equals(&self, code: &str) -> bool {
        self.code == code
    }

    pub fn message_contains(&self, code: &str, needle: &str) -> bool {
        self.code == code && self.message.contains(needle)
    }
}

/// Strip the namespace and suffix some services add to the error type,
/// e.g. `com.amazonaws.m2#ResourceNotFoundException` or `Foo:http://...`
fn normalize_code(raw: &str) -> String {
    let code = raw.split(':').next().unwrap_or(raw);
    code.rsplit('#').next().unwrap_or(code).to_string()
}

fn default_code(status: u16) -> &'static str {
    match status {
        400 => "BadRequestException",
        403 => "AccessDeniedException",
        404 => "ResourceNotFoundException",
        409 => "ConflictException",
        429 => "TooManyRequestsException",
        500..=599 => "InternalServerException",
        _ => "UnknownError",
    }
}

/// Whether an error chain bottoms out in a not-found API error
pub fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ApiError>()
        .map(ApiError::is_not_found)
        .unwrap_or(false)
}

/// Format an error for one-line display
pub fn format_api_error(error: &anyhow::Error) -> String {
    if let Some(api) = error.chain().find_map(|e| e.downcast_ref::<ApiError>()) {
        let context = error.to_string();
        if context == api.to_string() {
            return format!("{}: {}", api.code, api.message);
        }
        return format!("{context}: {}: {}", api.code, api.message);
    }

    // Truncate long messages
    let sanitized = error
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(200)
        .collect::<String>();
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_type_header() {
        let err = ApiError::from_response(
            404,
            Some("ResourceNotFoundException:http://internal.amazon.com/coral/com.amazonaws.appconfig/"),
            r#"{"Message":"Extension not found"}"#,
        );
        assert_eq!(err.code, "ResourceNotFoundException");
        assert_eq!(err.message, "Extension not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn parses_body_type_field() {
        let err = ApiError::from_response(
            400,
            None,
            r#"{"__type":"com.amazonaws.m2#ValidationException","message":"bad name"}"#,
        );
        assert_eq!(err.code, "ValidationException");
        assert_eq!(err.message, "bad name");
        assert!(!err.is_not_found());
        assert!(!err.is_throttling());
    }

    #[test]
    fn falls_back_to_status_code() {
        let err = ApiError::from_response(429, None, "");
        assert_eq!(err.code, "TooManyRequestsException");
        assert!(err.is_throttling());

        let err = ApiError::from_response(503, None, "<html>");
        assert!(err.is_throttling());
    }

    #[test]
    fn downcasts_through_context() {
        let err = anyhow::Error::new(ApiError::not_found("gone")).context("reading extension");
        assert!(err.downcast_ref::<ApiError>().is_some());
        assert!(is_not_found(&err));
        assert_eq!(
            format_api_error(&err),
            "reading extension: ResourceNotFoundException: gone"
        );
    }
}
