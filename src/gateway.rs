// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use log::error;
use log::warn;

use crate::errors::CacheError;
use crate::errors::SourceError;
use crate::keys::KeySpace;
use crate::keys::POPULATED;
use crate::kind_config::KindConfig;
use crate::kind_config::SourceOfTruth;
use crate::lock::LockService;
use crate::populate::Populator;
use crate::search::SearchHit;
use crate::search::SearchIndex;
use crate::search::SearchQuery;
use crate::store::s_scan_all;
use crate::store::Store;
use crate::verify::Verifier;
use crate::verify::VerifyReport;

/// Tunables for one gateway instance.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Deployment namespace prepended to every cache key. Empty by default.
    pub namespace: String,

    /// Page size used when paginating through the source of truth.
    pub page_size: usize,

    /// How long population waits for the per-Kind lock. Callers with an
    /// ambient execution-time limit must extend it to at least this long
    /// before calling [`Gateway::ensure_populated`].
    pub lock_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        GatewayOptions {
            namespace: String::new(),
            page_size: 1000,
            lock_timeout: Duration::from_secs(300),
        }
    }
}

/// Options for [`Gateway::fetch_all`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Read straight from the source of truth, ignoring the cache.
    pub bypass_cache: bool,

    /// Fetch only these ids instead of the whole Kind.
    pub ids: Option<Vec<String>>,

    /// Resolve records through the search index instead of the Model Set.
    pub search: Option<SearchQuery>,

    /// Include records that a soft-deleting Kind has flagged deleted.
    pub include_deleted: bool,
}

impl FetchOptions {
    pub fn bypass_cache() -> Self {
        FetchOptions {
            bypass_cache: true,
            ..Default::default()
        }
    }

    pub fn for_ids(ids: impl IntoIterator<Item = impl ToString>) -> Self {
        FetchOptions {
            ids: Some(ids.into_iter().map(|id| id.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn for_search(query: SearchQuery) -> Self {
        FetchOptions {
            search: Some(query),
            ..Default::default()
        }
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// Per-Kind record gateway: cache-first reads with source-of-truth fallback,
/// write-through saves, and lifecycle operations.
///
/// Construction probes the cache store once; if the probe fails the gateway
/// runs cache-less for its lifetime, serving every read from the source of
/// truth and skipping cache writes, so a store outage never makes the system
/// unusable. Only search degrades to empty results in that mode, since the
/// source of truth cannot be searched directly.
///
/// Population is an explicit, caller-owned initialization step
/// ([`Gateway::ensure_populated`]); reads are safe before and during it, at
/// the cost of observing a partially-populated cache.
pub struct Gateway<K: KindConfig> {
    /// `None` after a failed construction-time probe: cache-less mode.
    pub(crate) store: Option<Arc<dyn Store>>,

    /// Client for the authoritative server.
    pub(crate) source: K::Source,

    /// Named locks guarding population and invalidation.
    pub(crate) lock: Arc<dyn LockService>,

    /// The complete key layout for this Kind.
    pub(crate) keys: KeySpace,

    pub(crate) options: GatewayOptions,

    /// A process-wide unique identifier, for debugging.
    uniq: u64,
}

impl<K> fmt::Display for Gateway<K>
where
    K: KindConfig,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Gateway({})[uniq={}]", K::kind(), self.uniq)
    }
}

impl<K> Gateway<K>
where
    K: KindConfig,
{
    /// Create a gateway for one Kind.
    ///
    /// Asks the source whether identifiers are case sensitive (this fixes id
    /// normalization for the gateway's lifetime) and probes the store with a
    /// single read. The constructor never populates; call
    /// [`Gateway::ensure_populated`] when the cache should be built.
    pub async fn new(
        store: Arc<dyn Store>,
        source: K::Source,
        lock: Arc<dyn LockService>,
        options: GatewayOptions,
    ) -> Result<Self, SourceError> {
        let case_sensitive = source
            .is_case_sensitive()
            .await
            .map_err(|e| e.context("querying case sensitivity at gateway construction"))?;

        let keys = KeySpace::new(&options.namespace, K::kind(), K::key_prefix(), case_sensitive);

        let store = match store.get(&keys.populated_status_key()).await {
            Ok(_) => Some(store),
            Err(e) => {
                warn!(
                    "cache store unavailable, running cache-less for kind={}: {}",
                    K::kind(),
                    e
                );
                None
            }
        };

        static UNIQ: atomic::AtomicU64 = atomic::AtomicU64::new(0);
        let uniq = UNIQ.fetch_add(1, atomic::Ordering::SeqCst);

        Ok(Gateway {
            store,
            source,
            lock,
            keys,
            options,
            uniq,
        })
    }

    /// The key layout in effect, normalization included.
    pub fn keyspace(&self) -> &KeySpace {
        &self.keys
    }

    /// Whether a usable cache store was found at construction.
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Whether the populated-status flag currently reads `POPULATED`.
    pub async fn is_populated(&self) -> bool {
        match self.cached_value(&self.keys.populated_status_key()).await {
            Some(v) => v == POPULATED,
            None => false,
        }
    }

    /// Populate the cache if the populated-status flag is not already set.
    ///
    /// Runs under the per-Kind populate lock with a check-then-run contract;
    /// returns whether a population actually ran. Concurrent callers are
    /// safe: exactly one populates, the rest skip.
    pub async fn ensure_populated(&self) -> Result<bool, CacheError> {
        Populator { gw: self }.run().await
    }

    /// Drop every cache artifact for this Kind and mark it unpopulated, so
    /// the next [`Gateway::ensure_populated`] rebuilds from scratch. Runs
    /// only if currently populated.
    pub async fn invalidate(&self) -> Result<bool, CacheError> {
        Populator { gw: self }.invalidate().await
    }

    /// Reconcile cache contents with the source of truth by checksum diff.
    pub async fn verify(&self) -> Result<VerifyReport, CacheError> {
        Verifier { gw: self }.run().await
    }

    /// Whether a record with this id exists, cache first.
    pub async fn exists(&self, id: &str) -> Result<bool, CacheError> {
        if self.cached_value(&self.keys.record_key(id)).await.is_some() {
            return Ok(true);
        }

        let found = self
            .source
            .fetch_by_id(id)
            .await
            .map_err(|e| CacheError::from(e.context(format!("exists id={}", id))))?;
        Ok(found.is_some())
    }

    /// The subset of `ids` that exist, in input order and original casing.
    pub async fn exists_many(&self, ids: &[String]) -> Result<Vec<String>, CacheError> {
        let keys: Vec<String> = ids.iter().map(|id| self.keys.record_key(id)).collect();

        let cached = match self.store.as_deref() {
            Some(store) => match store.get_multiple(&keys).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("{}: exists_many falling back to source: {}", self, e);
                    BTreeMap::new()
                }
            },
            None => BTreeMap::new(),
        };

        let mut valid = Vec::new();
        for (id, key) in ids.iter().zip(keys.iter()) {
            if cached.contains_key(key) {
                valid.push(id.clone());
                continue;
            }
            let found = self
                .source
                .fetch_by_id(id)
                .await
                .map_err(|e| CacheError::from(e.context(format!("exists_many id={}", id))))?;
            if found.is_some() {
                valid.push(id.clone());
            }
        }
        Ok(valid)
    }

    /// Fetch one record, cache first, falling back to the source of truth.
    ///
    /// A fallback hit is deliberately *not* written back into the cache:
    /// lazy fill here would mask upstream deletions. Use
    /// [`Gateway::fetch_by_id_and_set`] for an explicit refresh.
    pub async fn fetch_by_id(&self, id: &str) -> Result<Option<K::Record>, CacheError> {
        debug!("{}: fetch_by_id({})", self, id);

        if let Some(value) = self.cached_value(&self.keys.record_key(id)).await {
            match serde_json::from_str::<K::Record>(&value) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    warn!(
                        "{}: undecodable cache value for id={}, treating as miss: {}",
                        self, id, e
                    );
                }
            }
        }

        let record = self
            .source
            .fetch_by_id(id)
            .await
            .map_err(|e| CacheError::from(e.context(format!("fetch_by_id id={}", id))))?;
        Ok(record)
    }

    /// Drop any cached state for `id`, refetch it from the source of truth,
    /// and recache it if it still exists.
    ///
    /// The stale entry is deleted *before* the refetch so a record deleted
    /// upstream cannot leave a stale cache hit behind. Never returns an
    /// error: this runs opportunistically during reconciliation and
    /// on-demand refresh, so failures are logged and swallowed.
    pub async fn fetch_by_id_and_set(&self, id: &str) -> Option<K::Record> {
        debug!("{}: fetch_by_id_and_set({})", self, id);

        if let Some(store) = self.store.as_deref() {
            if let Err(e) = self.evict(store, id).await {
                error!("{}: evicting id={} before refetch: {}", self, id, e);
            }
        }

        let record = match self.source.fetch_by_id(id).await {
            Ok(found) => found?,
            Err(e) => {
                error!("{}: refetch of id={} failed: {}", self, id, e);
                return None;
            }
        };

        if let Some(store) = self.store.as_deref() {
            if let Err(e) = self.write_cache_entries(store, &record).await {
                error!("{}: recaching id={} failed: {}", self, id, e);
            }
        }

        Some(record)
    }

    /// Fetch a collection of records; see [`FetchOptions`].
    ///
    /// Individually-missing cache keys are skipped rather than failing the
    /// whole call. Soft-deleted records are filtered out unless
    /// `include_deleted` is set.
    pub async fn fetch_all(&self, options: FetchOptions) -> Result<Vec<K::Record>, CacheError> {
        let store = match self.store.as_deref() {
            Some(store) if !options.bypass_cache => store,
            _ => return self.fetch_all_from_source(&options).await,
        };

        let keys: Vec<String> = if let Some(query) = &options.search {
            let index = SearchIndex {
                store,
                keys: &self.keys,
            };
            let hits = index.query(query).await?;
            hits.iter()
                .map(|hit| self.keys.record_key(&hit.id))
                .collect()
        } else if let Some(ids) = &options.ids {
            ids.iter().map(|id| self.keys.record_key(id)).collect()
        } else if options.include_deleted {
            // Soft-deleted records are out of the Model Set but still hold a
            // primary key, so resolve by pattern instead.
            store
                .keys(&self.keys.record_key_pattern())
                .await
                .map_err(|e| CacheError::from(e.context("fetch_all key scan")))?
        } else {
            s_scan_all(store, &self.keys.model_set(), "*")
                .await
                .map_err(|e| CacheError::from(e.context("fetch_all model-set scan")))?
        };

        let values = store
            .get_multiple(&keys)
            .await
            .map_err(|e| CacheError::from(e.context("fetch_all bulk read")))?;

        let mut records = Vec::with_capacity(values.len());
        for key in &keys {
            let Some(value) = values.get(key) else {
                debug!("{}: fetch_all skipping missing key {}", self, key);
                continue;
            };
            match serde_json::from_str::<K::Record>(value) {
                Ok(record) => {
                    if options.include_deleted || !K::is_deleted(&record) {
                        records.push(record);
                    }
                }
                Err(e) => {
                    warn!("{}: fetch_all skipping undecodable key {}: {}", self, key, e);
                }
            }
        }
        Ok(records)
    }

    /// Search this Kind's index; decoded hits, prefix matches first.
    ///
    /// Returns empty results in cache-less mode: the source of truth cannot
    /// be searched directly.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CacheError> {
        query.validate()?;

        let Some(store) = self.store.as_deref() else {
            warn!("{}: search without a cache store, returning empty", self);
            return Ok(vec![]);
        };

        let index = SearchIndex {
            store,
            keys: &self.keys,
        };
        index.query(query).await
    }

    /// Like [`Gateway::search`] but returning raw index entries.
    pub async fn search_entries(&self, query: &SearchQuery) -> Result<Vec<String>, CacheError> {
        query.validate()?;

        let Some(store) = self.store.as_deref() else {
            return Ok(vec![]);
        };

        let index = SearchIndex {
            store,
            keys: &self.keys,
        };
        index.query_entries(query).await
    }

    /// Write a record through to the source of truth and refresh every cache
    /// artifact derived from it.
    ///
    /// A record without an id is created upstream first, so an id exists
    /// before any cache key can be built; otherwise keys are computed
    /// up-front and the source and cache writes are issued back-to-back.
    pub async fn save(&self, record: K::Record) -> Result<K::Record, CacheError> {
        let record = if K::id(&record).is_empty() {
            self.source
                .create(record)
                .await
                .map_err(|e| CacheError::from(e.context("creating record before caching")))?
        } else {
            self.source
                .save(&record)
                .await
                .map_err(|e| {
                    CacheError::from(e.context(format!("saving record id={}", K::id(&record))))
                })?;
            record
        };

        if let Some(store) = self.store.as_deref() {
            self.write_cache_entries(store, &record)
                .await
                .map_err(|e| e.context(format!("caching saved record id={}", K::id(&record))))?;
        }

        Ok(record)
    }

    /// Delete a record from the source of truth and clean up after it.
    ///
    /// Soft-deleting Kinds flag the record and re-save it instead, keeping
    /// the primary cache entry visible to callers who ask for deleted
    /// records; the Model Set and search sets drop it either way.
    pub async fn delete(&self, record: K::Record) -> Result<K::Record, CacheError> {
        let id = K::id(&record).to_string();

        if K::soft_deletes() {
            let mut record = record;
            K::mark_deleted(&mut record);

            self.source
                .save(&record)
                .await
                .map_err(|e| CacheError::from(e.context(format!("soft-deleting id={}", id))))?;

            if let Some(store) = self.store.as_deref() {
                let index = SearchIndex {
                    store,
                    keys: &self.keys,
                };
                index.remove_id(&id).await?;

                let key = self.keys.record_key(&id);
                store
                    .s_rem(&self.keys.model_set(), std::slice::from_ref(&key))
                    .await
                    .map_err(|e| CacheError::from(e.context("dropping model-set member")))?;

                let value = serde_json::to_string(&record)?;
                store
                    .set(&key, &value)
                    .await
                    .map_err(|e| CacheError::from(e.context("re-saving soft-deleted entry")))?;

                self.unmerge_extra_entries(store, &record).await?;
            }
            return Ok(record);
        }

        self.source
            .delete(&id)
            .await
            .map_err(|e| CacheError::from(e.context(format!("deleting id={}", id))))?;

        if let Some(store) = self.store.as_deref() {
            self.evict(store, &id)
                .await
                .map_err(|e| e.context(format!("evicting deleted id={}", id)))?;
        }
        Ok(record)
    }

    /// Read one key from the cache, treating store failures as misses.
    ///
    /// Read paths must stay usable through a store outage; the source-of-truth
    /// fallback picks up from here.
    async fn cached_value(&self, key: &str) -> Option<String> {
        let store = self.store.as_deref()?;

        match store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("{}: cache read of {} failed, treating as miss: {}", self, key, e);
                None
            }
        }
    }

    /// Remove the primary entry, Model Set membership, search entries and
    /// extra-entry contributions for `id`.
    pub(crate) async fn evict(&self, store: &dyn Store, id: &str) -> Result<(), CacheError> {
        let key = self.keys.record_key(id);

        // The old record is needed to unmerge its extra entries; read it
        // before deleting the primary key.
        let old: Option<K::Record> = match store.get(&key).await {
            Ok(Some(value)) => serde_json::from_str(&value).ok(),
            _ => None,
        };

        store
            .delete(&key)
            .await
            .map_err(|e| CacheError::from(e.context("deleting primary entry")))?;
        store
            .s_rem(&self.keys.model_set(), std::slice::from_ref(&key))
            .await
            .map_err(|e| CacheError::from(e.context("dropping model-set member")))?;

        let index = SearchIndex {
            store,
            keys: &self.keys,
        };
        index.remove_id(id).await?;

        if let Some(old) = old {
            self.unmerge_extra_entries(store, &old).await?;
        }
        Ok(())
    }

    /// Write the primary entry, Model Set membership, search entries and
    /// extra entries for one record. Search entries and extra-entry
    /// contributions of the previously cached record are removed first, so
    /// neither a rename nor a path change leaves orphans.
    pub(crate) async fn write_cache_entries(
        &self,
        store: &dyn Store,
        record: &K::Record,
    ) -> Result<(), CacheError> {
        let id = K::id(record);
        let key = self.keys.record_key(id);
        let value = serde_json::to_string(record)?;

        // The previously cached record still contributes to shared extra
        // entries; read it before the overwrite so those contributions can
        // be unmerged below.
        let old: Option<K::Record> = match store.get(&key).await {
            Ok(Some(previous)) => serde_json::from_str(&previous).ok(),
            _ => None,
        };

        let index = SearchIndex {
            store,
            keys: &self.keys,
        };
        index.remove_id(id).await?;

        store
            .set(&key, &value)
            .await
            .map_err(|e| CacheError::from(e.context("writing primary entry")))?;

        if K::is_deleted(record) {
            store
                .s_rem(&self.keys.model_set(), std::slice::from_ref(&key))
                .await
                .map_err(|e| CacheError::from(e.context("dropping model-set member")))?;
        } else {
            store
                .s_add(&self.keys.model_set(), std::slice::from_ref(&key))
                .await
                .map_err(|e| CacheError::from(e.context("adding model-set member")))?;
        }

        if K::include_in_index(record) && !K::is_deleted(record) {
            let name = K::search_value(record).unwrap_or_else(|| id.to_string());
            index.add(&name, id).await.map_err(CacheError::from)?;
        }

        if let Some(old) = &old {
            self.unmerge_extra_entries(store, old).await?;
        }
        self.merge_extra_entries(store, record).await?;
        Ok(())
    }

    /// Shallow-merge this record's extra entries into their JSON objects.
    pub(crate) async fn merge_extra_entries(
        &self,
        store: &dyn Store,
        record: &K::Record,
    ) -> Result<(), CacheError> {
        let id = K::id(record).to_string();

        for (key, value) in K::extra_cache_entries(record) {
            let key = self.keys.scope_key(&key);
            let mut object = self.read_json_object(store, &key).await;
            object.insert(id.clone(), value);

            let merged = serde_json::Value::Object(object).to_string();
            store
                .set(&key, &merged)
                .await
                .map_err(|e| CacheError::from(e.context(format!("merging extra entry {}", key))))?;
        }
        Ok(())
    }

    /// Remove this record's contribution from each extra entry, deleting the
    /// key once no record contributes to it.
    pub(crate) async fn unmerge_extra_entries(
        &self,
        store: &dyn Store,
        record: &K::Record,
    ) -> Result<(), CacheError> {
        let id = K::id(record);

        for (key, _) in K::extra_cache_entries(record) {
            let key = self.keys.scope_key(&key);
            let mut object = self.read_json_object(store, &key).await;
            object.remove(id);

            if object.is_empty() {
                store.delete(&key).await.map_err(|e| {
                    CacheError::from(e.context(format!("deleting empty extra entry {}", key)))
                })?;
            } else {
                let remaining = serde_json::Value::Object(object).to_string();
                store.set(&key, &remaining).await.map_err(|e| {
                    CacheError::from(e.context(format!("unmerging extra entry {}", key)))
                })?;
            }
        }
        Ok(())
    }

    async fn read_json_object(
        &self,
        store: &dyn Store,
        key: &str,
    ) -> serde_json::Map<String, serde_json::Value> {
        match store.get(key).await {
            Ok(Some(text)) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(serde_json::Value::Object(object)) => object,
                _ => {
                    warn!("{}: extra entry {} is not a JSON object, resetting", self, key);
                    serde_json::Map::new()
                }
            },
            _ => serde_json::Map::new(),
        }
    }

    /// Serve `fetch_all` straight from the source of truth.
    async fn fetch_all_from_source(
        &self,
        options: &FetchOptions,
    ) -> Result<Vec<K::Record>, CacheError> {
        if options.search.is_some() {
            // The source of truth is not searchable; this is the one path
            // allowed to degrade to empty results.
            warn!("{}: search requested without a usable cache, returning empty", self);
            return Ok(vec![]);
        }

        let mut records = Vec::new();

        if let Some(ids) = &options.ids {
            for id in ids {
                let found = self.source.fetch_by_id(id).await.map_err(|e| {
                    CacheError::from(e.context(format!("fetch_all by id={} from source", id)))
                })?;
                if let Some(record) = found {
                    records.push(record);
                }
            }
        } else {
            let mut after: Option<String> = None;
            loop {
                let page = self
                    .source
                    .fetch_page(after.as_deref(), self.options.page_size)
                    .await
                    .map_err(|e| {
                        CacheError::from(e.context("fetch_all paginating the source"))
                    })?;

                let Some(last) = page.last() else { break };
                after = Some(K::id(last).to_string());

                let short_page = page.len() < self.options.page_size;
                records.extend(page);
                if short_page {
                    break;
                }
            }
        }

        if !options.include_deleted {
            records.retain(|record| !K::is_deleted(record));
        }
        Ok(records)
    }
}
