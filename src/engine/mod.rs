//! # Resolution Engine
//!
//! [`SecretResolver`] ties the pieces together: it owns the session, the fetch
//! registry and the typed cache, and resolves a key by reading the cache and
//! falling back to the key's registered fetch operation.
//!
//! ```rust,ignore
//! let resolver = SecretResolver::connect(&ResolverConfig::load(None)?).await?;
//! let key = ConfigKey::new(["database", "password"]);
//! resolver.register_kv(key.clone(), KvSecret::new("secret", "app/db").field("password"));
//! let password: Option<String> = resolver.resolve_as(&key).await?;
//! ```

mod operations;

pub use operations::{DatabaseCredentials, KvSecret, RoleCredential, RoleKind};

use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{info, Instrument};
use url::Url;

use crate::address::AddressStrategy;
use crate::backends::{AuthMethod, SecretBackend, VaultBackend};
use crate::cache::{CacheOptions, CacheSnapshot, SecretCache};
use crate::config::ResolverConfig;
use crate::errors::{ResolverError, Result};
use crate::key::ConfigKey;
use crate::observability::log_config_info;
use crate::reader::ResourceReader;
use crate::registry::{FetchOperation, FetchRegistry};
use crate::session::SessionState;
use crate::types::SecretString;
use crate::value::{ConfigValue, TypedValue, ValueType};
pub(crate) use operations::SecretFetcher;
use operations::LocationOperation;

/// Resolves configuration keys to secrets.
///
/// Cloning is cheap; clones share session, registry and cache.
#[derive(Debug, Clone)]
pub struct SecretResolver {
    session: Arc<SessionState>,
    backend: Arc<dyn SecretBackend>,
    cache: Arc<SecretCache>,
}

impl SecretResolver {
    /// Create an unauthenticated resolver with default cache options
    pub fn new(backend: Arc<dyn SecretBackend>, endpoint: Url) -> Self {
        Self::with_options(backend, endpoint, CacheOptions::default())
    }

    pub fn with_options(backend: Arc<dyn SecretBackend>, endpoint: Url, options: CacheOptions) -> Self {
        let registry = Arc::new(FetchRegistry::new());
        Self {
            session: Arc::new(SessionState::new(endpoint)),
            backend,
            cache: Arc::new(SecretCache::new(registry, options)),
        }
    }

    /// Vault-backed resolver for `config`, without logging in
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let endpoint = config.vault.endpoint()?;
        let backend = VaultBackend::from_config(&config.vault)?;
        Ok(Self::with_options(Arc::new(backend), endpoint, config.cache.to_options()))
    }

    /// Vault-backed resolver for `config`, logged in with the configured method if any
    pub async fn connect(config: &ResolverConfig) -> Result<Self> {
        config.validate()?;
        log_config_info(config);
        let resolver = Self::from_config(config)?;
        if let Some(auth) = &config.auth {
            resolver.login(&auth.to_method()).await?;
        }
        Ok(resolver)
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn registry(&self) -> &FetchRegistry {
        self.cache.registry()
    }

    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    /// Authenticate with `method` and store the resulting token.
    ///
    /// On failure the previous token, if any, stays in place.
    pub async fn login(&self, method: &AuthMethod) -> Result<()> {
        info!(method = method.name(), backend = self.backend.backend_type(), "Authenticating");
        let token = self.backend.authenticate(self.session.endpoint(), method).await?;
        self.session.set_token(token);
        Ok(())
    }

    pub fn set_token(&self, token: impl Into<SecretString>) {
        self.session.set_token(token.into());
    }

    /// Clear the session token. Cached values are kept.
    pub fn reset(&self) {
        self.session.reset();
    }

    fn fetcher(&self) -> SecretFetcher {
        SecretFetcher::new(Arc::clone(&self.backend), Arc::clone(&self.session))
    }

    /// Fetch operation for a key/value secret
    pub fn kv_operation(&self, secret: KvSecret) -> Arc<dyn FetchOperation> {
        let location = secret.location();
        Arc::new(LocationOperation::new(self.fetcher(), location, secret.field))
    }

    /// Fetch operation for role credentials, normalized to `{"username", "password"}`
    pub fn role_operation(&self, credential: RoleCredential) -> Arc<dyn FetchOperation> {
        Arc::new(LocationOperation::new(self.fetcher(), credential.location(), None))
    }

    /// Register `operation` as the source of `key`, replacing any previous one
    pub fn register(&self, key: ConfigKey, operation: Arc<dyn FetchOperation>) {
        self.cache.registry().set(key, operation);
    }

    /// Register a key/value secret for `key`.
    ///
    /// A secret without an explicit version takes the key's `version` context, if any.
    pub fn register_kv(&self, key: ConfigKey, mut secret: KvSecret) {
        if secret.version.is_none() {
            secret.version = key.version();
        }
        let operation = self.kv_operation(secret);
        self.register(key, operation);
    }

    pub fn register_role(&self, key: ConfigKey, credential: RoleCredential) {
        let operation = self.role_operation(credential);
        self.register(key, operation);
    }

    /// Remove the source of `key`. Returns whether one was registered.
    pub fn unregister(&self, key: &ConfigKey) -> bool {
        self.cache.registry().remove(key).is_some()
    }

    /// Cached value only; never performs I/O
    pub fn read(&self, key: &ConfigKey, value_type: ValueType) -> Option<ConfigValue> {
        self.cache.read(key, value_type)
    }

    /// Fetch from the remote store and refresh the cache, even if the key is cached
    pub async fn fetch(&self, key: &ConfigKey, value_type: ValueType) -> Result<Option<ConfigValue>> {
        let span = crate::resolve_span!(key, value_type = %value_type, refresh = true);
        self.cache.fetch(key, value_type).instrument(span).await
    }

    /// Cached value, or fetch on miss. `Ok(None)` when the key has no source.
    pub async fn resolve(&self, key: &ConfigKey, value_type: ValueType) -> Result<Option<ConfigValue>> {
        let span = crate::resolve_span!(key, value_type = %value_type);
        self.cache.get_or_fetch(key, value_type).instrument(span).await
    }

    /// [`SecretResolver::resolve`] into a Rust type
    pub async fn resolve_as<T: TypedValue>(&self, key: &ConfigKey) -> Result<Option<T>> {
        Ok(self.resolve(key, T::VALUE_TYPE).await?.and_then(T::from_value))
    }

    /// Resolve role credentials registered with [`SecretResolver::register_role`]
    pub async fn resolve_credentials(&self, key: &ConfigKey) -> Result<Option<DatabaseCredentials>> {
        let Some(payload) = self.resolve_as::<Vec<u8>>(key).await? else {
            return Ok(None);
        };
        DatabaseCredentials::from_payload(&payload)
            .map(Some)
            .map_err(|reason| ResolverError::decode(key.to_string(), ValueType::Bytes, reason))
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.cache.snapshot()
    }

    /// Stream of the cached value of `key`, starting with the current one
    pub fn watch(&self, key: &ConfigKey, value_type: ValueType) -> BoxStream<'static, Option<ConfigValue>> {
        self.cache.watch(key, value_type)
    }

    pub fn invalidate(&self, key: &ConfigKey) -> bool {
        self.cache.invalidate(key)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Reader for textual addresses, trying `strategies` in order
    pub fn reader(&self, strategies: Vec<Arc<dyn AddressStrategy>>) -> ResourceReader {
        ResourceReader::new(self.fetcher(), strategies)
    }
}
