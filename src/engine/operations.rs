//! Engine-specific fetch operations.
//!
//! Builds [`FetchOperation`]s for key/value secrets and database role
//! credentials, and normalizes the engines' response bodies. This is the only
//! place that knows engine response shapes.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

use crate::address::{SecretLocation, SecretShape};
use crate::backends::SecretBackend;
use crate::errors::{ResolverError, Result};
use crate::registry::FetchOperation;
use crate::session::SessionState;
use crate::types::SecretString;

/// A key/value secret, optionally narrowed to one field of its data map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvSecret {
    pub mount: String,
    pub key: String,
    pub version: Option<u64>,
    pub field: Option<String>,
}

impl KvSecret {
    /// The latest version of the whole secret
    pub fn new(mount: impl Into<String>, key: impl Into<String>) -> Self {
        Self { mount: mount.into(), key: key.into(), version: None, field: None }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn location(&self) -> SecretLocation {
        SecretLocation::kv(&self.mount, &self.key, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Static,
    Dynamic,
}

/// Credentials of a database role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCredential {
    pub mount: String,
    pub role: String,
    pub kind: RoleKind,
}

impl RoleCredential {
    pub fn static_role(mount: impl Into<String>, role: impl Into<String>) -> Self {
        Self { mount: mount.into(), role: role.into(), kind: RoleKind::Static }
    }

    pub fn dynamic_role(mount: impl Into<String>, role: impl Into<String>) -> Self {
        Self { mount: mount.into(), role: role.into(), kind: RoleKind::Dynamic }
    }

    pub fn location(&self) -> SecretLocation {
        match self.kind {
            RoleKind::Static => SecretLocation::static_role(&self.mount, &self.role),
            RoleKind::Dynamic => SecretLocation::dynamic_role(&self.mount, &self.role),
        }
    }
}

/// Username and password normalized from either role shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: SecretString,
}

impl DatabaseCredentials {
    /// Parse the normalized `{"username": .., "password": ..}` payload
    pub fn from_payload(payload: &[u8]) -> std::result::Result<Self, String> {
        serde_json::from_slice(payload).map_err(|e| format!("not a credentials payload: {}", e))
    }
}

/// Performs authenticated fetches against the backend.
///
/// The session token is read when a fetch starts, never when an operation is built.
#[derive(Debug, Clone)]
pub(crate) struct SecretFetcher {
    backend: Arc<dyn SecretBackend>,
    session: Arc<SessionState>,
}

impl SecretFetcher {
    pub(crate) fn new(backend: Arc<dyn SecretBackend>, session: Arc<SessionState>) -> Self {
        Self { backend, session }
    }

    /// Raw response body for `location`
    pub(crate) async fn fetch_raw(&self, location: &SecretLocation) -> Result<Bytes> {
        let token = self.session.current_token()?;
        let span = crate::fetch_span!(location.mount(), location.shape(), backend = self.backend.backend_type());
        self.backend.fetch(self.session.endpoint(), &token, location).instrument(span).await
    }

    /// Response body for `location`, normalized for its shape
    pub(crate) async fn fetch_normalized(&self, location: &SecretLocation, field: Option<&str>) -> Result<Bytes> {
        let body = self.fetch_raw(location).await?;
        let path = location.request_path();
        match location.shape() {
            SecretShape::Kv => normalize_kv(&path, &body, field),
            SecretShape::StaticRole | SecretShape::DynamicRole => normalize_credentials(&path, &body),
        }
    }
}

/// Fetch operation bound to one location
pub(crate) struct LocationOperation {
    fetcher: SecretFetcher,
    location: SecretLocation,
    field: Option<String>,
}

impl LocationOperation {
    pub(crate) fn new(fetcher: SecretFetcher, location: SecretLocation, field: Option<String>) -> Self {
        Self { fetcher, location, field }
    }
}

#[async_trait]
impl FetchOperation for LocationOperation {
    async fn execute(&self) -> Result<Bytes> {
        self.fetcher.fetch_normalized(&self.location, self.field.as_deref()).await
    }

    fn describe(&self) -> String {
        match &self.field {
            Some(field) => format!("{} {}#{}", self.location.shape(), self.location, field),
            None => format!("{} {}", self.location.shape(), self.location),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// KV v2 body: `{"data": {"data": {...}, "metadata": {...}}}`
fn normalize_kv(path: &str, body: &[u8], field: Option<&str>) -> Result<Bytes> {
    let envelope: Envelope<Envelope<serde_json::Map<String, serde_json::Value>>> =
        serde_json::from_slice(body)
            .map_err(|e| ResolverError::invalid_response(path, format!("expected a KV v2 body: {}", e)))?;
    let data = envelope.data.data;

    let Some(field) = field else {
        return Ok(Bytes::from(serde_json::to_vec(&data)?));
    };

    match data.get(field) {
        Some(serde_json::Value::String(value)) => Ok(Bytes::from(value.clone().into_bytes())),
        Some(other) => Ok(Bytes::from(serde_json::to_vec(other)?)),
        None => Err(ResolverError::invalid_response(path, format!("secret has no field '{}'", field))),
    }
}

#[derive(Deserialize)]
struct RoleData {
    username: String,
    password: String,
}

/// Static and dynamic role bodies both carry `data.username` and `data.password`
fn normalize_credentials(path: &str, body: &[u8]) -> Result<Bytes> {
    let envelope: Envelope<RoleData> = serde_json::from_slice(body)
        .map_err(|e| ResolverError::invalid_response(path, format!("expected role credentials: {}", e)))?;
    let RoleData { username, password } = envelope.data;
    let normalized = serde_json::json!({ "username": username, "password": password });
    Ok(Bytes::from(serde_json::to_vec(&normalized)?))
}
