//! In-memory secret store for tests and local development.
//!
//! Serves canned response bodies shaped like the Vault engines' responses and
//! counts every call so callers can assert how often the store was reached.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use url::Url;

use super::backend::{AuthMethod, SecretBackend};
use crate::address::SecretLocation;
use crate::errors::{ResolverError, Result};
use crate::types::SecretString;

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    secrets: DashMap<SecretLocation, Bytes>,
    login_token: RwLock<Option<SecretString>>,
    required_token: RwLock<Option<SecretString>>,
    delay: RwLock<Duration>,
    fetch_calls: AtomicUsize,
    login_calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw response body for `location`
    pub fn insert(&self, location: SecretLocation, body: impl Into<Bytes>) {
        self.secrets.insert(location, body.into());
    }

    /// Store a KV v2 secret with `data` as its data map
    pub fn insert_kv(&self, mount: &str, key: &str, version: Option<u64>, data: serde_json::Value) {
        let body = json!({
            "data": {
                "data": data,
                "metadata": { "version": version.unwrap_or(1), "destroyed": false }
            }
        });
        self.insert(SecretLocation::kv(mount, key, version), body.to_string());
    }

    /// Store static role credentials as the database engine returns them
    pub fn insert_static_role(&self, mount: &str, role: &str, username: &str, password: &str) {
        let body = json!({
            "data": { "username": username, "password": password, "ttl": 3600, "rotation_period": 86400 }
        });
        self.insert(SecretLocation::static_role(mount, role), body.to_string());
    }

    /// Store dynamic role credentials as the database engine returns them
    pub fn insert_dynamic_role(&self, mount: &str, role: &str, username: &str, password: &str) {
        let body = json!({
            "lease_id": format!("{}/creds/{}/lease", mount, role),
            "lease_duration": 3600,
            "renewable": true,
            "data": { "username": username, "password": password }
        });
        self.insert(SecretLocation::dynamic_role(mount, role), body.to_string());
    }

    pub fn remove(&self, location: &SecretLocation) {
        self.secrets.remove(location);
    }

    /// Token handed out by AppRole and userpass logins
    pub fn set_login_token(&self, token: impl Into<SecretString>) {
        *self.login_token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Reject fetches carrying any other token
    pub fn require_token(&self, token: impl Into<SecretString>) {
        *self.required_token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Delay every fetch, to widen race windows in tests
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn login_count(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretBackend for InMemoryBackend {
    async fn authenticate(&self, _endpoint: &Url, method: &AuthMethod) -> Result<SecretString> {
        if let AuthMethod::Token(token) = method {
            return Ok(token.clone());
        }
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ResolverError::unauthorized(format!("{} login rejected", method.name())))
    }

    async fn fetch(&self, _endpoint: &Url, token: &SecretString, location: &SecretLocation) -> Result<Bytes> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let required = self.required_token.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(required) = required {
            if &required != token {
                return Err(ResolverError::unauthorized("permission denied"));
            }
        }

        self.secrets
            .get(location)
            .map(|body| body.value().clone())
            .ok_or_else(|| ResolverError::not_found(location.request_path()))
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("http://127.0.0.1:8200").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_counts_calls() {
        let backend = InMemoryBackend::new();
        backend.insert_kv("secret", "app", None, json!({ "api_key": "abc" }));
        let token = SecretString::new("t");

        let body = backend.fetch(&endpoint(), &token, &SecretLocation::kv("secret", "app", None)).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["data"]["data"]["api_key"], "abc");

        let missing = backend.fetch(&endpoint(), &token, &SecretLocation::kv("secret", "nope", None)).await;
        assert!(matches!(missing, Err(ResolverError::RemoteNotFound { .. })));
        assert_eq!(backend.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_required_token() {
        let backend = InMemoryBackend::new();
        backend.insert_static_role("database", "alice", "alice", "pw");
        backend.require_token("good");
        let location = SecretLocation::static_role("database", "alice");

        let denied = backend.fetch(&endpoint(), &SecretString::new("bad"), &location).await;
        assert!(matches!(denied, Err(ResolverError::RemoteUnauthorized { .. })));
        assert!(backend.fetch(&endpoint(), &SecretString::new("good"), &location).await.is_ok());
    }

    #[tokio::test]
    async fn test_login() {
        let backend = InMemoryBackend::new();
        let method = AuthMethod::approle("web", "secret-id");

        assert!(backend.authenticate(&endpoint(), &method).await.is_err());
        backend.set_login_token("issued");
        assert_eq!(backend.authenticate(&endpoint(), &method).await.unwrap().expose_secret(), "issued");
        assert_eq!(backend.login_count(), 2);

        let token = backend.authenticate(&endpoint(), &AuthMethod::Token("direct".into())).await.unwrap();
        assert_eq!(token.expose_secret(), "direct");
        assert_eq!(backend.login_count(), 2);
    }
}
