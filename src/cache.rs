//! Typed secret cache
//!
//! In-memory store of resolved secrets keyed by a key's encoded form plus its
//! context. Values enter the cache only through a registered fetch operation;
//! a failed fetch or undecodable payload leaves the slot as it was.
//!
//! With coalescing enabled, concurrent [`SecretCache::get_or_fetch`] calls for
//! the same slot and type share one in-flight fetch and all receive its
//! outcome, failures included. The fetch is dropped, storing nothing, once
//! every caller waiting on it has been dropped.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::errors::{ResolverError, Result};
use crate::key::{render_context, ConfigKey, Context};
use crate::registry::{FetchOperation, FetchRegistry};
use crate::value::{ConfigValue, ValueType};

/// Identity of a cache slot: encoded key components plus context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheSlot {
    encoded: String,
    context: Context,
}

impl CacheSlot {
    pub fn for_key(key: &ConfigKey) -> Self {
        Self { encoded: key.encode(), context: key.context().clone() }
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl fmt::Display for CacheSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)?;
        if !self.context.is_empty() {
            write!(f, "[{}]", render_context(&self.context))?;
        }
        Ok(())
    }
}

/// An immutable cached value with its provenance
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: ConfigValue,
    is_secret: bool,
    provenance: CacheSlot,
    stored_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(value: ConfigValue, provenance: CacheSlot) -> Self {
        Self { value, is_secret: true, provenance, stored_at: Utc::now() }
    }

    pub fn value(&self) -> &ConfigValue {
        &self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    /// Always true for values produced by the resolver
    pub fn is_secret(&self) -> bool {
        self.is_secret
    }

    /// The slot the entry was stored under
    pub fn provenance(&self) -> &CacheSlot {
        &self.provenance
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// The value if it has type `value_type`
    pub fn value_as(&self, value_type: ValueType) -> Option<ConfigValue> {
        (self.value.value_type() == value_type).then(|| self.value.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Let concurrent `get_or_fetch` calls for one slot share a single fetch
    pub coalesce_inflight: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { coalesce_inflight: true }
    }
}

/// Point-in-time view of every cached value.
///
/// Later cache writes do not affect a snapshot already taken.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    entries: Arc<BTreeMap<String, Vec<Arc<CacheEntry>>>>,
    len: usize,
    taken_at: DateTime<Utc>,
}

impl CacheSnapshot {
    /// The entry stored for `key`, of any type
    pub fn get(&self, key: &ConfigKey) -> Option<&CacheEntry> {
        self.entries
            .get(&key.encode())?
            .iter()
            .find(|entry| entry.provenance().context() == key.context())
            .map(|entry| entry.as_ref())
    }

    /// The value stored for `key` if it has type `value_type`
    pub fn get_as(&self, key: &ConfigKey, value_type: ValueType) -> Option<ConfigValue> {
        self.get(key)?.value_as(value_type)
    }

    /// Entries ordered by encoded key
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values().flatten().map(|entry| entry.as_ref())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

type EntryCell = Option<Arc<CacheEntry>>;

type InflightKey = (CacheSlot, ValueType);

struct InflightFetch {
    id: u64,
    future: Shared<BoxFuture<'static, Result<ConfigValue>>>,
}

/// Stored values and their watchers, shared with in-flight fetches
#[derive(Default)]
struct Slots {
    entries: DashMap<CacheSlot, Arc<CacheEntry>>,
    watchers: DashMap<CacheSlot, watch::Sender<EntryCell>>,
}

impl Slots {
    fn entry(&self, slot: &CacheSlot) -> EntryCell {
        self.entries.get(slot).map(|entry| Arc::clone(entry.value()))
    }

    /// Run `operation`, decode its payload and store the value
    async fn load(
        &self,
        slot: &CacheSlot,
        operation: &dyn FetchOperation,
        value_type: ValueType,
    ) -> Result<ConfigValue> {
        debug!(key = %slot, operation = %operation.describe(), "Fetching secret");
        let payload = operation.execute().await?;

        let value = ConfigValue::decode(&payload, value_type).map_err(|reason| {
            warn!(key = %slot, expected = %value_type, "Fetched payload does not decode; cache left unchanged");
            ResolverError::decode(slot.to_string(), value_type, reason)
        })?;

        self.store(slot, value.clone());
        Ok(value)
    }

    fn store(&self, slot: &CacheSlot, value: ConfigValue) {
        let entry = Arc::new(CacheEntry::new(value, slot.clone()));
        self.entries.insert(slot.clone(), Arc::clone(&entry));
        debug!(key = %slot, value_type = %entry.value_type(), "Cached secret");
        self.notify(slot, Some(entry));
    }

    /// Publish to the slot's watchers, dropping the sender once none are left
    fn notify(&self, slot: &CacheSlot, entry: EntryCell) {
        if let Entry::Occupied(watcher) = self.watchers.entry(slot.clone()) {
            if watcher.get().receiver_count() == 0 {
                watcher.remove();
            } else {
                watcher.get().send_replace(entry);
            }
        }
    }
}

/// Concurrent typed cache in front of a [`FetchRegistry`]
pub struct SecretCache {
    registry: Arc<FetchRegistry>,
    slots: Arc<Slots>,
    inflight: DashMap<InflightKey, Arc<InflightFetch>>,
    next_fetch_id: AtomicU64,
    options: CacheOptions,
}

impl SecretCache {
    pub fn new(registry: Arc<FetchRegistry>, options: CacheOptions) -> Self {
        Self {
            registry,
            slots: Arc::new(Slots::default()),
            inflight: DashMap::new(),
            next_fetch_id: AtomicU64::new(0),
            options,
        }
    }

    pub fn registry(&self) -> &Arc<FetchRegistry> {
        &self.registry
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// The cached value for `key` if present with type `value_type`. Never performs I/O.
    pub fn read(&self, key: &ConfigKey, value_type: ValueType) -> Option<ConfigValue> {
        let slot = CacheSlot::for_key(key);
        let Some(entry) = self.slots.entry(&slot) else {
            debug!(key = %slot, "Cache miss");
            return None;
        };

        let value = entry.value_as(value_type);
        if value.is_none() {
            debug!(key = %slot, stored = %entry.value_type(), requested = %value_type, "Cached value has another type");
        } else {
            debug!(key = %slot, "Cache hit");
        }
        value
    }

    /// The cached entry for `key`, of any type
    pub fn entry(&self, key: &ConfigKey) -> Option<Arc<CacheEntry>> {
        self.slots.entry(&CacheSlot::for_key(key))
    }

    /// Invoke the registered operation for `key`, decode and store the result.
    ///
    /// Returns `Ok(None)` when no operation is registered. Always calls the
    /// remote store, even when the slot is populated or a fetch is in flight.
    pub async fn fetch(&self, key: &ConfigKey, value_type: ValueType) -> Result<Option<ConfigValue>> {
        let slot = CacheSlot::for_key(key);
        let Some(operation) = self.registry.get(key) else {
            debug!(key = %slot, "No fetch operation registered");
            return Ok(None);
        };

        self.slots.load(&slot, operation.as_ref(), value_type).await.map(Some)
    }

    /// Cached value if present, otherwise [`SecretCache::fetch`].
    ///
    /// With coalescing enabled, callers arriving while a fetch of the same
    /// slot and type is in flight wait for it and get its result or error.
    pub async fn get_or_fetch(&self, key: &ConfigKey, value_type: ValueType) -> Result<Option<ConfigValue>> {
        if let Some(value) = self.read(key, value_type) {
            return Ok(Some(value));
        }

        let slot = CacheSlot::for_key(key);
        let Some(operation) = self.registry.get(key) else {
            debug!(key = %slot, "No fetch operation registered");
            return Ok(None);
        };

        if !self.options.coalesce_inflight {
            return self.slots.load(&slot, operation.as_ref(), value_type).await.map(Some);
        }

        let inflight_key = (slot, value_type);
        let fetch = match self.inflight.entry(inflight_key.clone()) {
            Entry::Occupied(occupied) => {
                debug!(key = %inflight_key.0, "Joining in-flight fetch");
                Arc::clone(occupied.get())
            }
            Entry::Vacant(vacant) => {
                // A fetch that finished after our cache read stored before leaving the map
                if let Some(value) = self.slots.entry(&inflight_key.0).and_then(|entry| entry.value_as(value_type)) {
                    return Ok(Some(value));
                }
                let fetch = self.start_fetch(&inflight_key.0, operation, value_type);
                vacant.insert(Arc::clone(&fetch));
                fetch
            }
        };

        let future = fetch.future.clone();
        let guard = InflightGuard { inflight: &self.inflight, key: inflight_key, fetch: Some(fetch) };
        let result = future.await;
        guard.complete();
        result.map(Some)
    }

    fn start_fetch(
        &self,
        slot: &CacheSlot,
        operation: Arc<dyn FetchOperation>,
        value_type: ValueType,
    ) -> Arc<InflightFetch> {
        let slots = Arc::clone(&self.slots);
        let slot = slot.clone();
        let future = async move { slots.load(&slot, operation.as_ref(), value_type).await }.boxed().shared();
        Arc::new(InflightFetch { id: self.next_fetch_id.fetch_add(1, Ordering::Relaxed), future })
    }

    /// Stream of the value for `key` as `value_type`.
    ///
    /// The first item is the current value (`None` when absent or of another
    /// type); each later store or invalidation of the slot yields a new item.
    /// The stream ends only when the cache is dropped.
    pub fn watch(&self, key: &ConfigKey, value_type: ValueType) -> BoxStream<'static, Option<ConfigValue>> {
        let slot = CacheSlot::for_key(key);
        self.slots.watchers.retain(|_, sender| sender.receiver_count() > 0);

        // The current entry is read under the watcher map lock so a concurrent
        // store either lands before it or sees the new sender.
        let receiver = match self.slots.watchers.entry(slot.clone()) {
            Entry::Occupied(occupied) => occupied.get().subscribe(),
            Entry::Vacant(vacant) => {
                let (sender, receiver) = watch::channel(self.slots.entry(&slot));
                vacant.insert(sender);
                receiver
            }
        };
        debug!(key = %slot, "Watching cache slot");

        WatchStream::new(receiver).map(move |entry| entry.and_then(|e| e.value_as(value_type))).boxed()
    }

    /// All cached entries at this instant
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut entries: BTreeMap<String, Vec<Arc<CacheEntry>>> = BTreeMap::new();
        let mut len = 0;
        for entry in self.slots.entries.iter() {
            entries.entry(entry.key().encoded().to_string()).or_default().push(Arc::clone(entry.value()));
            len += 1;
        }
        CacheSnapshot { entries: Arc::new(entries), len, taken_at: Utc::now() }
    }

    /// Drop the cached value for `key`; the registration stays
    pub fn invalidate(&self, key: &ConfigKey) -> bool {
        let slot = CacheSlot::for_key(key);
        let removed = self.slots.entries.remove(&slot).is_some();
        if removed {
            debug!(key = %slot, "Invalidated cached secret");
            self.slots.notify(&slot, None);
        }
        removed
    }

    pub fn clear(&self) {
        self.slots.entries.clear();
        self.slots.watchers.retain(|_, sender| {
            if sender.receiver_count() == 0 {
                return false;
            }
            sender.send_replace(None);
            true
        });
        debug!("Cleared secret cache");
    }

    pub fn len(&self) -> usize {
        self.slots.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.entries.is_empty()
    }
}

impl fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCache")
            .field("entries", &self.slots.entries.len())
            .field("watchers", &self.slots.watchers.len())
            .field("inflight", &self.inflight.len())
            .field("options", &self.options)
            .finish()
    }
}

/// A caller's share of an in-flight fetch.
///
/// Completion removes the fetch from the map; a caller dropped before then
/// removes it only if no other caller still holds it.
struct InflightGuard<'a> {
    inflight: &'a DashMap<InflightKey, Arc<InflightFetch>>,
    key: InflightKey,
    fetch: Option<Arc<InflightFetch>>,
}

impl InflightGuard<'_> {
    fn complete(mut self) {
        if let Some(fetch) = self.fetch.take() {
            self.inflight.remove_if(&self.key, |_, current| current.id == fetch.id);
        }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let Some(fetch) = self.fetch.take() else {
            return;
        };
        let id = fetch.id;
        // Release our own handle first so only the map's is counted
        drop(fetch);
        self.inflight.remove_if(&self.key, |_, current| current.id == id && Arc::strong_count(current) == 1);
    }
}
