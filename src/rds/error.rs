//! Error types for the RDS control plane.

use aws_sdk_rds::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

use crate::control::ControlPlaneError;
use crate::retry::Transience;

/// Errors raised by the RDS control plane.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RdsControlPlaneError {
    /// Raised when a request is missing or exceeds a required field.
    #[error("invalid restore request: {0}")]
    Validation(String),
    /// Raised when a restore lands on an identifier that already exists.
    /// Under randomized identifiers this means an earlier attempt of the
    /// same run already succeeded; silently treating it as success would
    /// hide a double provision, so it fails loudly and is never retried.
    #[error("instance \"{identifier}\" already exists")]
    AlreadyExists {
        /// Identifier the restore request asked for.
        identifier: String,
    },
    /// Raised when the request never reached the control plane
    /// (connection or authentication handshake failures, timeouts).
    #[error("{operation} could not reach the control plane: {message}")]
    Connection {
        /// API operation being attempted.
        operation: &'static str,
        /// Transport error message.
        message: String,
    },
    /// Raised when the control plane answered with something that could
    /// not be understood as a response.
    #[error("{operation} returned a malformed response: {message}")]
    Response {
        /// API operation being attempted.
        operation: &'static str,
        /// Decoder error message.
        message: String,
    },
    /// Raised when the control plane rejected the request.
    #[error("{operation} was rejected ({code}): {message}")]
    Api {
        /// API operation being attempted.
        operation: &'static str,
        /// Error code reported by the service.
        code: String,
        /// Message reported by the service.
        message: String,
    },
    /// Raised when the request could not even be constructed locally.
    #[error("{operation} request could not be constructed: {message}")]
    Construction {
        /// API operation being attempted.
        operation: &'static str,
        /// Builder error message.
        message: String,
    },
}

impl RdsControlPlaneError {
    /// Maps an SDK failure into the taxonomy above. Already-exists and
    /// not-found codes carry semantics for specific call sites, so those
    /// are peeled off before this generic mapping.
    pub(crate) fn from_sdk<E, R>(operation: &'static str, err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug,
    {
        match err {
            SdkError::DispatchFailure(failure) => Self::Connection {
                operation,
                message: failure
                    .as_connector_error()
                    .map_or_else(|| String::from("dispatch failure"), ToString::to_string),
            },
            SdkError::TimeoutError(_) => Self::Connection {
                operation,
                message: String::from("request timed out"),
            },
            SdkError::ResponseError(_) => Self::Response {
                operation,
                message: String::from("response could not be decoded"),
            },
            SdkError::ServiceError(context) => {
                let service_err = context.err();
                Self::Api {
                    operation,
                    code: service_err.code().unwrap_or("unknown").to_owned(),
                    message: service_err.message().unwrap_or("no message").to_owned(),
                }
            }
            other => Self::Construction {
                operation,
                message: other.to_string(),
            },
        }
    }

    /// Returns the service error code carried by an SDK failure, if any.
    pub(crate) fn service_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        err.as_service_error().and_then(ProvideErrorMetadata::code)
    }
}

impl Transience for RdsControlPlaneError {
    /// Connection hiccups, undecodable responses, and service-side
    /// rejections all match the transient classes the retry wrapper
    /// handles; validation failures and identifier collisions do not.
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Response { .. } | Self::Api { .. }
        )
    }
}

impl From<ControlPlaneError> for RdsControlPlaneError {
    fn from(value: ControlPlaneError) -> Self {
        match value {
            ControlPlaneError::Validation(field) => Self::Validation(field),
        }
    }
}
