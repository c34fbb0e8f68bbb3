//! # Error Types
//!
//! Error taxonomy for secret resolution using `thiserror`.
//!
//! Failures classified by the remote store are passed through unchanged; the
//! layer only adds context (key, requested type, offending address) to the
//! failures it produces itself.

use crate::value::ValueType;

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Main error type for secret resolution
#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    /// No session token has been set
    #[error("Authentication required: no session token is set")]
    AuthenticationRequired,

    /// The remote store rejected the session credential
    #[error("Remote store denied access: {message}")]
    RemoteUnauthorized { message: String },

    /// The requested path does not exist in the remote store
    #[error("Secret not found at '{path}'")]
    RemoteNotFound { path: String },

    /// The remote store rejected the request itself
    #[error("Remote store rejected the request: {}", errors.join("; "))]
    RemoteBadRequest { errors: Vec<String> },

    /// The remote store failed while handling the request
    #[error("Remote store error (status: {status}): {message}")]
    RemoteServerError { status: u16, message: String },

    /// The remote store could not be reached
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A successful response did not have the shape the secret engine promises
    #[error("Invalid response from '{path}': {reason}")]
    InvalidResponse { path: String, reason: String },

    /// A payload could not be converted into the requested type
    #[error("Cannot decode '{key}' as {expected}: {reason}")]
    Decode { key: String, expected: ValueType, reason: String },

    /// An address matched a strategy's prefix but is malformed
    #[error("Invalid secret address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// No registered strategy recognises the address
    #[error("No address strategy matches '{address}'")]
    UnsupportedAddress { address: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },
}

impl ResolverError {
    /// Create a remote unauthorized error
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::RemoteUnauthorized { message: message.into() }
    }

    /// Create a remote not found error
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::RemoteNotFound { path: path.into() }
    }

    /// Create a remote bad request error
    pub fn bad_request(errors: Vec<String>) -> Self {
        Self::RemoteBadRequest { errors }
    }

    /// Create a remote server error
    pub fn server_error<S: Into<String>>(status: u16, message: S) -> Self {
        Self::RemoteServerError { status, message: message.into() }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Create an invalid response error
    pub fn invalid_response<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::InvalidResponse { path: path.into(), reason: reason.into() }
    }

    /// Create a decode error
    pub fn decode<K: Into<String>, R: Into<String>>(key: K, expected: ValueType, reason: R) -> Self {
        Self::Decode { key: key.into(), expected, reason: reason.into() }
    }

    /// Create an invalid address error
    pub fn invalid_address<A: Into<String>, R: Into<String>>(address: A, reason: R) -> Self {
        Self::InvalidAddress { address: address.into(), reason: reason.into() }
    }

    /// Create an unsupported address error
    pub fn unsupported_address<A: Into<String>>(address: A) -> Self {
        Self::UnsupportedAddress { address: address.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Whether the failure was classified by the remote store
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ResolverError::RemoteUnauthorized { .. }
                | ResolverError::RemoteNotFound { .. }
                | ResolverError::RemoteBadRequest { .. }
                | ResolverError::RemoteServerError { .. }
        )
    }

    /// Check if a caller could reasonably retry the operation.
    ///
    /// The resolver itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolverError::Transport { .. } | ResolverError::RemoteServerError { .. })
    }
}

/// Failures of a shared in-flight fetch are handed to every waiter.
///
/// Boxed and `serde_json` sources cannot be cloned and are carried over as
/// their message.
impl Clone for ResolverError {
    fn clone(&self) -> Self {
        match self {
            Self::AuthenticationRequired => Self::AuthenticationRequired,
            Self::RemoteUnauthorized { message } => Self::RemoteUnauthorized { message: message.clone() },
            Self::RemoteNotFound { path } => Self::RemoteNotFound { path: path.clone() },
            Self::RemoteBadRequest { errors } => Self::RemoteBadRequest { errors: errors.clone() },
            Self::RemoteServerError { status, message } => {
                Self::RemoteServerError { status: *status, message: message.clone() }
            }
            Self::Transport { message } => Self::Transport { message: message.clone() },
            Self::InvalidResponse { path, reason } => {
                Self::InvalidResponse { path: path.clone(), reason: reason.clone() }
            }
            Self::Decode { key, expected, reason } => {
                Self::Decode { key: key.clone(), expected: *expected, reason: reason.clone() }
            }
            Self::InvalidAddress { address, reason } => {
                Self::InvalidAddress { address: address.clone(), reason: reason.clone() }
            }
            Self::UnsupportedAddress { address } => Self::UnsupportedAddress { address: address.clone() },
            Self::Config { message, source } => Self::Config {
                message: message.clone(),
                source: source.as_ref().map(|e| Box::<dyn std::error::Error + Send + Sync>::from(e.to_string())),
            },
            Self::Validation { message, field } => Self::Validation { message: message.clone(), field: field.clone() },
            Self::Serialization { source, context } => Self::Serialization {
                source: <serde_json::Error as serde::de::Error>::custom(source),
                context: context.clone(),
            },
        }
    }
}

impl From<serde_json::Error> for ResolverError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for ResolverError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for ResolverError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
