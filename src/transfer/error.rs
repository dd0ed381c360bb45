use crate::client::ClientError;
use crate::humanize::ByteSize;
use crate::session::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Authentication token has expired. Please login again.")]
    AuthExpired,

    #[error("File too large: {:.1} MB. Maximum allowed size is {limit}.", .size.as_mib())]
    TooLarge { size: ByteSize, limit: ByteSize },

    #[error("Transfer timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status_code}: {message}")]
    Server { status_code: u16, message: String },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Local file error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

impl From<ClientError> for TransferError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Unauthorized => TransferError::AuthExpired,
            ClientError::Timeout => TransferError::Timeout,
            ClientError::Status { status_code, message } => TransferError::Server { status_code, message },
            ClientError::Network(msg) | ClientError::Decode(msg) | ClientError::InvalidUrl(msg) => {
                TransferError::Network(msg)
            }
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::from(e).into()
    }
}

impl From<AuthError> for TransferError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Client(inner) => inner.into(),
            AuthError::TokenExpired | AuthError::MissingCredentials | AuthError::LoginRejected(_) => {
                TransferError::AuthExpired
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_message() {
        let err = TransferError::TooLarge {
            size: ByteSize(1025 * 1024 * 1024),
            limit: ByteSize(1024 * 1024 * 1024),
        };
        assert_eq!(
            err.to_string(),
            "File too large: 1025.0 MB. Maximum allowed size is 1.0 GB."
        );
    }

    #[test]
    fn test_client_error_mapping() {
        assert!(matches!(
            TransferError::from(ClientError::Unauthorized),
            TransferError::AuthExpired
        ));
        assert!(matches!(
            TransferError::from(ClientError::Timeout),
            TransferError::Timeout
        ));
        assert!(matches!(
            TransferError::from(ClientError::Status { status_code: 500, message: "boom".into() }),
            TransferError::Server { status_code: 500, .. }
        ));
        assert!(matches!(
            TransferError::from(AuthError::TokenExpired),
            TransferError::AuthExpired
        ));
    }
}
