//! Remote secret store trait and login methods
//!
//! Defines the boundary the resolver talks to. Implementations classify every
//! failure into a [`ResolverError`](crate::errors::ResolverError) remote kind;
//! the resolver passes those through unchanged.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::address::SecretLocation;
use crate::errors::Result;
use crate::types::SecretString;

const DEFAULT_APPROLE_MOUNT: &str = "approle";
const DEFAULT_USERPASS_MOUNT: &str = "userpass";

/// How to obtain a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Use an existing token as-is
    Token(SecretString),
    /// AppRole login
    AppRole { mount: String, role_id: String, secret_id: SecretString },
    /// Username/password login
    Userpass { mount: String, username: String, password: SecretString },
}

impl AuthMethod {
    /// AppRole login against the default `approle` mount
    pub fn approle(role_id: impl Into<String>, secret_id: impl Into<SecretString>) -> Self {
        Self::AppRole {
            mount: DEFAULT_APPROLE_MOUNT.to_string(),
            role_id: role_id.into(),
            secret_id: secret_id.into(),
        }
    }

    /// Userpass login against the default `userpass` mount
    pub fn userpass(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self::Userpass {
            mount: DEFAULT_USERPASS_MOUNT.to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::AppRole { .. } => "approle",
            Self::Userpass { .. } => "userpass",
        }
    }
}

/// A remote secret store.
///
/// Implementations must be Send + Sync for use in async contexts.
#[async_trait]
pub trait SecretBackend: Send + Sync + std::fmt::Debug {
    /// Exchange `method` for a session token
    async fn authenticate(&self, endpoint: &Url, method: &AuthMethod) -> Result<SecretString>;

    /// Fetch the raw response body for `location`, authenticated with `token`
    async fn fetch(&self, endpoint: &Url, token: &SecretString, location: &SecretLocation) -> Result<Bytes>;

    /// Backend identifier for logs
    fn backend_type(&self) -> &'static str;
}
