//! Error types
//!
//! Typed errors for configuration resolution and Alibaba Cloud API calls.
//! Everything else is propagated as `anyhow::Error` with context.

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while resolving credentials, regions and profiles
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("missing credentials: '{field}' must be set in the connection config or environment")]
    MissingCredentials { field: &'static str },

    #[error("{service} requires a region but none was given")]
    MissingRegion { service: &'static str },

    #[error("invalid region '{region}' in connection config")]
    InvalidRegion { region: String },

    #[error("profile '{profile}': {reason}")]
    Profile { profile: String, reason: String },

    #[error("failed to parse connection config: {0}")]
    Parse(String),
}

/// Error envelope returned by POP RPC endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorEnvelope {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: String,
}

/// An error response from an Alibaba Cloud API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service} {action} failed: {code} ({status}): {message} [RequestId: {request_id}]")]
pub struct ApiError {
    pub service: &'static str,
    pub action: String,
    pub status: u16,
    pub code: String,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    /// Build an error from a non-success response body.
    /// Bodies that are not a JSON error envelope keep an empty code.
    pub fn from_response(service: &'static str, action: &str, status: u16, body: &str) -> Self {
        let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
        Self {
            service,
            action: action.to_string(),
            status,
            code: envelope.code,
            message: envelope.message,
            request_id: envelope.request_id,
        }
    }

    /// Throttling codes come in several flavors (`Throttling`, `Throttling.User`, ...)
    pub fn is_throttling(&self) -> bool {
        self.code == "Throttling" || self.code.starts_with("Throttling.")
    }

    pub fn is_code_in<S: AsRef<str>>(&self, codes: &[S]) -> bool {
        codes.iter().any(|c| c.as_ref() == self.code)
    }
}

/// Find an [`ApiError`] anywhere in an error chain
pub fn api_error(error: &anyhow::Error) -> Option<&ApiError> {
    error.chain().find_map(|e| e.downcast_ref::<ApiError>())
}

/// Format an API error for display
/// Security: keeps the error code but never echoes raw response bodies
pub fn format_api_error(error: &anyhow::Error) -> String {
    if let Some(config) = error.chain().find_map(|e| e.downcast_ref::<ConfigurationError>()) {
        return config.to_string();
    }

    let Some(api) = api_error(error) else {
        let error_str = error.to_string();
        let sanitized = error_str
            .chars()
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .take(80)
            .collect::<String>();

        return if sanitized.len() < error_str.len() {
            format!("{}...", sanitized)
        } else {
            sanitized
        };
    };

    if api.is_throttling() {
        return format!("{}: rate limit exceeded. Please try again later.", api.code);
    }

    match api.status {
        401 | 403 => format!(
            "{}: permission denied. Check the RAM policies attached to your access key.",
            api.code
        ),
        404 => format!("{}: resource not found.", api.code),
        400 => format!("{}: invalid request. Check your parameters.", api.code),
        500..=599 => format!(
            "{}: {} temporarily unavailable. Please try again.",
            api.code, api.service
        ),
        _ => format!("{}: request failed.", api.code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_decodes_envelope() {
        let body = r#"{"RequestId":"7A1B","HostId":"ecs.aliyuncs.com","Code":"Throttling.User","Message":"Request was denied due to user flow control."}"#;
        let err = ApiError::from_response("EcsService", "DescribeInstances", 400, body);

        assert_eq!(err.code, "Throttling.User");
        assert_eq!(err.request_id, "7A1B");
        assert!(err.is_throttling());
        assert!(err.to_string().contains("DescribeInstances"));
    }

    #[test]
    fn test_from_response_tolerates_non_json() {
        let err = ApiError::from_response("VpcService", "DescribeVpcs", 502, "<html>bad gateway</html>");
        assert!(err.code.is_empty());
        assert_eq!(err.status, 502);
        assert!(!err.is_throttling());
    }

    #[test]
    fn test_is_code_in() {
        let err = ApiError::from_response(
            "RamService",
            "GetUser",
            404,
            r#"{"Code":"EntityNotExist.User","Message":"not found"}"#,
        );
        assert!(err.is_code_in(&["EntityNotExist.User"]));
        assert!(!err.is_code_in(&["Forbidden.RAM"]));
    }

    #[test]
    fn test_format_api_error_hides_message() {
        let err = ApiError::from_response(
            "EcsService",
            "DescribeInstances",
            403,
            r#"{"Code":"Forbidden.RAM","Message":"User not authorized to operate on the specified resource, arn acs:ram::123:user/alice"}"#,
        );
        let formatted = format_api_error(&anyhow::Error::new(err));
        assert!(formatted.starts_with("Forbidden.RAM"));
        assert!(!formatted.contains("alice"));
    }

    #[test]
    fn test_format_configuration_error() {
        let err = anyhow::Error::new(ConfigurationError::MissingRegion {
            service: "AutoscalingService",
        });
        assert!(format_api_error(&err).contains("AutoscalingService"));
    }
}
