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

use log::debug;
use log::info;

use crate::errors::CacheError;
use crate::gateway::Gateway;
use crate::keys::POPULATED;
use crate::keys::UNPOPULATED;
use crate::kind_config::KindConfig;
use crate::kind_config::SourceOfTruth;
use crate::lock::lock_with_check;
use crate::search::SearchIndex;
use crate::store::Store;

/// Full-population and invalidation worker for one gateway.
///
/// Both operations serialize on the `<kind>_populate` lock and re-evaluate
/// the populated-status flag while holding it, so two callers racing to
/// populate cannot both run, and an invalidate landing just after a populate
/// sees the fresh flag.
pub(crate) struct Populator<'a, K: KindConfig> {
    pub(crate) gw: &'a Gateway<K>,
}

impl<K> Populator<'_, K>
where
    K: KindConfig,
{
    fn lock_name() -> String {
        format!("{}_populate", K::kind())
    }

    /// Populate unless the flag already reads `POPULATED`.
    ///
    /// Returns whether a population actually ran. A source failure mid-page
    /// aborts the whole call and leaves the flag `UNPOPULATED`, so the next
    /// access retries from scratch; no partial-success state is persisted.
    pub(crate) async fn run(&self) -> Result<bool, CacheError> {
        let Some(store) = self.gw.store.as_deref() else {
            debug!("{}: no cache store, populate skipped", self.gw);
            return Ok(false);
        };

        let ran = lock_with_check(
            self.gw.lock.as_ref(),
            &Self::lock_name(),
            self.gw.options.lock_timeout,
            || async { Ok(!self.gw.is_populated().await) },
            || self.populate_body(store),
        )
        .await?;

        Ok(ran.is_some())
    }

    /// Drop all cache artifacts and mark unpopulated, only if currently
    /// populated. Returns whether the invalidation ran.
    pub(crate) async fn invalidate(&self) -> Result<bool, CacheError> {
        let Some(store) = self.gw.store.as_deref() else {
            debug!("{}: no cache store, invalidate skipped", self.gw);
            return Ok(false);
        };

        let ran = lock_with_check(
            self.gw.lock.as_ref(),
            &Self::lock_name(),
            self.gw.options.lock_timeout,
            || async { Ok(self.gw.is_populated().await) },
            || async {
                self.clean_slate(store).await?;
                info!("{}: invalidated", self.gw);
                Ok(())
            },
        )
        .await?;

        Ok(ran.is_some())
    }

    async fn populate_body(&self, store: &dyn Store) -> Result<(), CacheError> {
        self.clean_slate(store).await?;

        let mut pages = 0usize;
        let mut total = 0usize;
        let mut after: Option<String> = None;

        loop {
            let page = self
                .gw
                .source
                .fetch_page(after.as_deref(), self.gw.options.page_size)
                .await
                .map_err(|e| {
                    CacheError::from(e.context(format!("populate page after={:?}", after)))
                })?;

            let Some(last) = page.last() else { break };

            // The cursor is the last id actually returned, never a computed
            // offset: under concurrent upstream writes this may repeat or
            // skip, but it always terminates.
            after = Some(K::id(last).to_string());

            let page_len = page.len();
            self.write_page(store, &page).await?;

            pages += 1;
            total += page_len;

            if page_len < self.gw.options.page_size {
                break;
            }
        }

        store
            .set(&self.gw.keys.populated_status_key(), POPULATED)
            .await
            .map_err(|e| CacheError::from(e.context("setting populated status")))?;

        info!(
            "{}: populated {} record(s) over {} page(s)",
            self.gw, total, pages
        );
        Ok(())
    }

    /// Idempotent clean slate: every key, set, search entry and extra-entry
    /// contribution of this Kind is removed and the flag reads
    /// `UNPOPULATED`.
    async fn clean_slate(&self, store: &dyn Store) -> Result<(), CacheError> {
        let record_keys = store
            .keys(&self.gw.keys.record_key_pattern())
            .await
            .map_err(|e| CacheError::from(e.context("enumerating keys for clean slate")))?;

        // Extra entries (e.g. path indexes) merge contributions from many
        // records; each cached record must unmerge its own before the keys
        // go away, or a record deleted upstream leaves its contribution
        // behind through the rebuild.
        let values = store
            .get_multiple(&record_keys)
            .await
            .map_err(|e| CacheError::from(e.context("reading records for clean slate")))?;
        for value in values.values() {
            if let Ok(record) = serde_json::from_str::<K::Record>(value) {
                self.gw.unmerge_extra_entries(store, &record).await?;
            }
        }

        store
            .delete_multiple(&record_keys)
            .await
            .map_err(|e| CacheError::from(e.context("deleting record entries")))?;

        store
            .delete(&self.gw.keys.model_set())
            .await
            .map_err(|e| CacheError::from(e.context("deleting model set")))?;

        let index = SearchIndex {
            store,
            keys: &self.gw.keys,
        };
        index.clear().await.map_err(CacheError::from)?;

        store
            .set(&self.gw.keys.populated_status_key(), UNPOPULATED)
            .await
            .map_err(|e| CacheError::from(e.context("resetting populated status")))?;

        debug!(
            "{}: clean slate, removed {} record key(s)",
            self.gw,
            record_keys.len()
        );
        Ok(())
    }

    /// Batch-write one page: primary entries and Model Set membership in one
    /// pass, search entries in another.
    async fn write_page(&self, store: &dyn Store, page: &[K::Record]) -> Result<(), CacheError> {
        let mut entries = BTreeMap::new();
        let mut model_members = Vec::with_capacity(page.len());
        let mut search_pairs = Vec::with_capacity(page.len());

        for record in page {
            let id = K::id(record);
            let key = self.gw.keys.record_key(id);
            let value = serde_json::to_string(record)?;

            entries.insert(key.clone(), value);

            if !K::is_deleted(record) {
                model_members.push(key);

                if K::include_in_index(record) {
                    let name = K::search_value(record).unwrap_or_else(|| id.to_string());
                    search_pairs.push((name, id.to_string()));
                }
            }
        }

        store
            .set_multiple(&entries)
            .await
            .map_err(|e| CacheError::from(e.context("writing page entries")))?;
        store
            .s_add(&self.gw.keys.model_set(), &model_members)
            .await
            .map_err(|e| CacheError::from(e.context("writing page model-set members")))?;

        let index = SearchIndex {
            store,
            keys: &self.gw.keys,
        };
        index
            .add_batch(&search_pairs)
            .await
            .map_err(|e| CacheError::from(e.context("writing page search entries")))?;

        // Extra entries (e.g. path indexes) merge per record.
        for record in page {
            if !K::is_deleted(record) {
                self.gw.merge_extra_entries(store, record).await?;
            }
        }
        Ok(())
    }
}
