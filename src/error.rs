//! Error types for the New Relic provider.

use thiserror::Error;

/// Errors that can occur while serving provider requests.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The HTTP request to NerdGraph could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// NerdGraph rejected the request or returned an error payload.
    #[error("New Relic API error: {0}")]
    Api(String),

    /// NerdGraph returned data this provider cannot map into state.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Quota or rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Service temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Get the error message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::Api(msg)
            | Self::UnexpectedResponse(msg)
            | Self::PermissionDenied(msg)
            | Self::ResourceExhausted(msg)
            | Self::Unavailable(msg) => msg,
            Self::Serialization(_) => "serialization error (see Debug output)",
            Self::Transport(_) => "transport error (see Debug output)",
            Self::Http(_) => "http error (see Debug output)",
        }
    }

    /// Whether this error means the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            }
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            }
            ProviderError::Http(err) => tonic::Status::unavailable(format!("HTTP error: {}", err)),
            ProviderError::Api(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnexpectedResponse(msg) => tonic::Status::internal(msg),
            ProviderError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            ProviderError::ResourceExhausted(msg) => tonic::Status::resource_exhausted(msg),
            ProviderError::Unavailable(msg) => tonic::Status::unavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("entity-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: entity-123");

        let err = ProviderError::Api("Invalid ARN".to_string());
        assert_eq!(format!("{}", err), "New Relic API error: Invalid ARN");

        let err = ProviderError::UnknownResource("newrelic_dashboard".to_string());
        assert_eq!(
            format!("{}", err),
            "Unknown resource type: newrelic_dashboard"
        );
    }

    #[test]
    fn test_error_to_status() {
        let status: tonic::Status = ProviderError::NotFound("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = ProviderError::Validation("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = ProviderError::Configuration("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status: tonic::Status = ProviderError::Api("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status: tonic::Status = ProviderError::UnexpectedResponse("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Internal);

        let status: tonic::Status = ProviderError::PermissionDenied("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);

        let status: tonic::Status = ProviderError::ResourceExhausted("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::ResourceExhausted);

        let status: tonic::Status = ProviderError::Unavailable("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Api("first payload error".to_string());
        assert_eq!(err.message(), "first payload error");

        let err = ProviderError::Configuration("missing api_key".to_string());
        assert_eq!(err.message(), "missing api_key");

        let err: ProviderError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.message(), "serialization error (see Debug output)");
    }

    #[test]
    fn test_is_not_found() {
        assert!(ProviderError::NotFound("x".to_string()).is_not_found());
        assert!(!ProviderError::Api("x".to_string()).is_not_found());
    }
}
