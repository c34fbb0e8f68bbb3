//! Textual secret references.
//!
//! Resolves addresses like `vault://secret/app/db?version=2#password` directly
//! to bytes, for template and config-file evaluators. This path bypasses the
//! registry and the cache: every read is a fresh remote call.

use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use crate::address::{parse_address, AddressStrategy, SecretLocation};
use crate::engine::SecretFetcher;
use crate::errors::{ResolverError, Result};

/// Reads secrets by textual address
#[derive(Debug, Clone)]
pub struct ResourceReader {
    fetcher: SecretFetcher,
    strategies: Vec<Arc<dyn AddressStrategy>>,
    scheme: Option<String>,
}

impl ResourceReader {
    pub(crate) fn new(fetcher: SecretFetcher, strategies: Vec<Arc<dyn AddressStrategy>>) -> Self {
        Self { fetcher, strategies, scheme: None }
    }

    /// Accept addresses prefixed with `<scheme>://`; unprefixed addresses still work
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn strategies(&self) -> &[Arc<dyn AddressStrategy>] {
        &self.strategies
    }

    /// Parse `address` into a location and optional KV field, without fetching
    pub fn locate(&self, address: &str) -> Result<(SecretLocation, Option<String>)> {
        let stripped = self.strip_scheme(address);
        let (path, field) = match stripped.split_once('#') {
            Some((path, field)) => (path, Some(field)),
            None => (stripped, None),
        };

        let location =
            parse_address(&self.strategies, path)?.ok_or_else(|| ResolverError::unsupported_address(address))?;

        match field {
            Some("") => Err(ResolverError::invalid_address(address, "empty field after '#'")),
            Some(_) if location.shape().is_role() => {
                Err(ResolverError::invalid_address(address, "field selection applies to key/value secrets only"))
            }
            other => Ok((location, other.map(str::to_string))),
        }
    }

    /// Fetch the secret at `address`
    pub async fn read(&self, address: &str) -> Result<Bytes> {
        let (location, field) = self.locate(address)?;
        debug!(location = %location, field = ?field, "Reading secret by address");
        self.fetcher.fetch_normalized(&location, field.as_deref()).await
    }

    fn strip_scheme<'a>(&self, address: &'a str) -> &'a str {
        let Some(scheme) = &self.scheme else {
            return address;
        };
        address
            .strip_prefix(scheme.as_str())
            .and_then(|rest| rest.strip_prefix("://"))
            .unwrap_or(address)
    }
}
