use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unauthorized (HTTP 401)")]
    Unauthorized,

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status_code}: {message}")]
    Status { status_code: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Map a non-success response status with its (possibly empty) body text
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return ClientError::Unauthorized;
        }

        let message = super::models::error_detail(body).unwrap_or_else(|| {
            status.canonical_reason().unwrap_or("Unknown").to_string()
        });

        ClientError::Status {
            status_code: status.as_u16(),
            message,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else if e.is_builder() {
            ClientError::InvalidUrl(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_unauthorized() {
        assert!(matches!(
            ClientError::from_status(StatusCode::UNAUTHORIZED, ""),
            ClientError::Unauthorized
        ));
    }

    #[test]
    fn test_from_status_uses_detail() {
        let err = ClientError::from_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail": "datatype_id is required"}"#,
        );
        match err {
            ClientError::Status { status_code, message } => {
                assert_eq!(status_code, 422);
                assert_eq!(message, "datatype_id is required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_status_falls_back_to_reason() {
        let err = ClientError::from_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
    }
}
