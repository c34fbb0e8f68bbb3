//! Session state owned by a resolver instance.
//!
//! Holds the remote store endpoint and the current bearer token. Every fetch
//! reads the token at call time, so a token set or cleared here is observed by
//! every later fetch, including fetches of operations registered earlier.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use tracing::info;
use url::Url;

use crate::errors::{ResolverError, Result};
use crate::types::SecretString;

pub struct SessionState {
    endpoint: Url,
    token: RwLock<Option<SecretString>>,
}

impl SessionState {
    /// Create an unauthenticated session against `endpoint`
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint, token: RwLock::new(None) }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Replace the session token
    pub fn set_token(&self, token: SecretString) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(token);
        info!(endpoint = %self.endpoint, "Session token updated");
    }

    /// The current token, or `AuthenticationRequired` if none is set
    pub fn current_token(&self) -> Result<SecretString> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ResolverError::AuthenticationRequired)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Clear the token. Later fetches fail until a new token is set.
    pub fn reset(&self) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
        info!(endpoint = %self.endpoint, "Session token cleared");
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionState {
        SessionState::new(Url::parse("http://127.0.0.1:8200").unwrap())
    }

    #[test]
    fn test_new_session_requires_authentication() {
        let session = session();
        assert!(!session.is_authenticated());
        assert!(matches!(session.current_token(), Err(ResolverError::AuthenticationRequired)));
    }

    #[test]
    fn test_set_token_then_reset() {
        let session = session();
        session.set_token(SecretString::new("hvs.first"));
        assert_eq!(session.current_token().unwrap().expose_secret(), "hvs.first");

        session.set_token(SecretString::new("hvs.second"));
        assert_eq!(session.current_token().unwrap().expose_secret(), "hvs.second");

        session.reset();
        assert!(matches!(session.current_token(), Err(ResolverError::AuthenticationRequired)));
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let session = session();
        session.set_token(SecretString::new("hvs.do-not-print"));
        let debug = format!("{:?}", session);
        assert!(debug.contains("authenticated: true"));
        assert!(!debug.contains("do-not-print"));
    }
}
