//! Fetch registry
//!
//! Maps configuration keys to the remote fetch operation that produces their
//! value. A key without an operation has no remote source; lookups of it resolve
//! to absent rather than failing.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::key::ConfigKey;

/// A no-argument remote fetch bound to its own parameters.
///
/// Operations must be idempotent and must not touch the cache; the cache decides
/// what to do with the bytes they return.
#[async_trait]
pub trait FetchOperation: Send + Sync {
    /// Perform the fetch and return the raw payload
    async fn execute(&self) -> Result<Bytes>;

    /// Short description for logs, e.g. the remote path. Never includes secret material.
    fn describe(&self) -> String {
        "custom fetch operation".to_string()
    }
}

/// Adapter turning an async closure into a [`FetchOperation`]
pub struct FnOperation<F> {
    f: F,
    label: String,
}

#[async_trait]
impl<F, Fut> FetchOperation for FnOperation<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes>> + Send,
{
    async fn execute(&self) -> Result<Bytes> {
        (self.f)().await
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Wrap an async closure as a shareable fetch operation
pub fn fetch_fn<F, Fut>(label: impl Into<String>, f: F) -> Arc<dyn FetchOperation>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    Arc::new(FnOperation { f, label: label.into() })
}

/// Concurrent map from configuration key to fetch operation
#[derive(Default)]
pub struct FetchRegistry {
    operations: DashMap<ConfigKey, Arc<dyn FetchOperation>>,
}

impl FetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The operation registered for `key`, if any
    pub fn get(&self, key: &ConfigKey) -> Option<Arc<dyn FetchOperation>> {
        self.operations.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Register `operation` for `key`, returning the operation it replaced.
    ///
    /// Visible to every `get` that starts after this returns.
    pub fn set(&self, key: ConfigKey, operation: Arc<dyn FetchOperation>) -> Option<Arc<dyn FetchOperation>> {
        debug!(key = %key, operation = %operation.describe(), "Registering fetch operation");
        self.operations.insert(key, operation)
    }

    /// Remove the operation for `key`. Cached values are left in place.
    pub fn remove(&self, key: &ConfigKey) -> Option<Arc<dyn FetchOperation>> {
        let removed = self.operations.remove(key).map(|(_, operation)| operation);
        if removed.is_some() {
            debug!(key = %key, "Removed fetch operation");
        }
        removed
    }

    pub fn contains(&self, key: &ConfigKey) -> bool {
        self.operations.contains_key(key)
    }

    /// Registered keys, in no particular order
    pub fn keys(&self) -> Vec<ConfigKey> {
        self.operations.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl fmt::Debug for FetchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRegistry").field("operations", &self.operations.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResolverError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn constant(payload: &'static str) -> Arc<dyn FetchOperation> {
        fetch_fn(format!("constant {}", payload), move || async move {
            Ok::<_, ResolverError>(Bytes::from_static(payload.as_bytes()))
        })
    }

    #[tokio::test]
    async fn test_set_get_and_replace() {
        let registry = FetchRegistry::new();
        let key = ConfigKey::new(["app", "token"]);

        assert!(registry.get(&key).is_none());
        assert!(registry.set(key.clone(), constant("one")).is_none());
        assert_eq!(registry.get(&key).unwrap().execute().await.unwrap(), Bytes::from_static(b"one"));

        let previous = registry.set(key.clone(), constant("two"));
        assert_eq!(previous.unwrap().describe(), "constant one");
        assert_eq!(registry.get(&key).unwrap().execute().await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_context_separates_registrations() {
        let registry = FetchRegistry::new();
        let v1 = ConfigKey::new(["app"]).with_version(1);
        let v2 = ConfigKey::new(["app"]).with_version(2);

        registry.set(v1.clone(), constant("first"));
        assert!(registry.get(&v2).is_none());
        assert!(registry.contains(&v1));
    }

    #[test]
    fn test_remove() {
        let registry = FetchRegistry::new();
        let key = ConfigKey::new(["app"]);
        registry.set(key.clone(), constant("x"));

        assert!(registry.remove(&key).is_some());
        assert!(registry.remove(&key).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_fn_runs_closure_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let operation = fetch_fn("counting", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ResolverError>(Bytes::from_static(b"v"))
            }
        });

        operation.execute().await.unwrap();
        operation.execute().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_is_visible_across_tasks() {
        let registry = Arc::new(FetchRegistry::new());
        let key = ConfigKey::new(["shared"]);

        let writer = Arc::clone(&registry);
        let writer_key = key.clone();
        tokio::spawn(async move {
            writer.set(writer_key, constant("ready"));
        })
        .await
        .unwrap();

        assert!(registry.get(&key).is_some());
    }
}
