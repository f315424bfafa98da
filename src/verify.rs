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
use std::collections::BTreeSet;

use log::debug;
use log::error;
use log::info;
use log::warn;

use crate::checksum::content_checksum;
use crate::errors::CacheError;
use crate::gateway::Gateway;
use crate::kind_config::KindConfig;
use crate::kind_config::SourceOfTruth;
use crate::store::Store;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Cache entries deleted because no upstream record matched them.
    pub removed: usize,

    /// Records refetched and recached because the cache held no match.
    pub refetched: usize,
}

/// Checksum-diff reconciliation for one gateway.
///
/// A five-step state machine; each step is recorded in the verify-status key
/// as `"Step i of 5: <description>"` and the key is deleted on completion.
///
/// The diff is keyed by `(normalized id, content checksum)` pairs rather
/// than bare checksums: a record whose content changed still shows up as one
/// removal plus one refetch, but two distinct records that happen to
/// serialize identically can no longer mask each other.
pub(crate) struct Verifier<'a, K: KindConfig> {
    pub(crate) gw: &'a Gateway<K>,
}

impl<K> Verifier<'_, K>
where
    K: KindConfig,
{
    pub(crate) async fn run(&self) -> Result<VerifyReport, CacheError> {
        let Some(store) = self.gw.store.as_deref() else {
            warn!("{}: no cache store, nothing to verify", self.gw);
            return Ok(VerifyReport::default());
        };

        // Step 1: enumerate this Kind's cache keys.
        self.set_status(store, 1, "enumerating cache keys").await;
        let cache_keys = store
            .keys(&self.gw.keys.record_key_pattern())
            .await
            .map_err(|e| CacheError::from(e.context("verify step 1")))?;

        let model_count = store.s_card(&self.gw.keys.model_set()).await.unwrap_or(0);
        debug!(
            "{}: verify found {} cache key(s), model set holds {}",
            self.gw,
            cache_keys.len(),
            model_count
        );

        // Step 2: checksum every cached value, keyed by (id, checksum).
        self.set_status(store, 2, "checksumming cache entries").await;
        let values = store
            .get_multiple(&cache_keys)
            .await
            .map_err(|e| CacheError::from(e.context("verify step 2")))?;

        let mut cached: BTreeMap<(String, String), String> = BTreeMap::new();
        for (key, value) in &values {
            let Some(id) = self.gw.keys.id_of_record_key(key) else {
                warn!("{}: verify skipping foreign key {}", self.gw, key);
                continue;
            };
            cached.insert((id, content_checksum(value)), key.clone());
        }

        // Step 3: checksum every source-of-truth record, fetched in full.
        self.set_status(store, 3, "checksumming source records").await;
        let mut upstream: BTreeMap<(String, String), String> = BTreeMap::new();
        let mut after: Option<String> = None;
        loop {
            let page = self
                .gw
                .source
                .fetch_page(after.as_deref(), self.gw.options.page_size)
                .await
                .map_err(|e| CacheError::from(e.context("verify step 3")))?;

            let Some(last) = page.last() else { break };
            after = Some(K::id(last).to_string());
            let short_page = page.len() < self.gw.options.page_size;

            for record in &page {
                let id = K::id(record);
                let value = serde_json::to_string(record)?;
                upstream.insert(
                    (self.gw.keys.normalize_id(id), content_checksum(&value)),
                    id.to_string(),
                );
            }

            if short_page {
                break;
            }
        }

        let cached_pairs: BTreeSet<&(String, String)> = cached.keys().collect();
        let upstream_pairs: BTreeSet<&(String, String)> = upstream.keys().collect();

        // Step 4: delete cache entries with no upstream counterpart. An
        // individual failure is logged and the loop continues.
        self.set_status(store, 4, "removing extraneous cache entries")
            .await;
        let mut removed = 0usize;
        for pair in cached_pairs.difference(&upstream_pairs) {
            let id = &pair.0;
            match self.gw.evict(store, id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!("{}: verify step 4 failed for id={}: {}", self.gw, id, e);
                }
            }
        }

        // Step 5: refetch and recache records the cache is missing.
        // fetch_by_id_and_set never errors; an upstream record deleted since
        // step 3 simply comes back as None.
        self.set_status(store, 5, "restoring missing cache entries")
            .await;
        let mut refetched = 0usize;
        for pair in upstream_pairs.difference(&cached_pairs) {
            let id = &upstream[*pair];
            if self.gw.fetch_by_id_and_set(id).await.is_some() {
                refetched += 1;
            }
        }

        if let Err(e) = store.delete(&self.gw.keys.verify_status_key()).await {
            error!("{}: clearing verify status: {}", self.gw, e);
        }

        let report = VerifyReport { removed, refetched };
        info!(
            "{}: verify complete, removed={} refetched={}",
            self.gw, report.removed, report.refetched
        );
        Ok(report)
    }

    /// Overwrite the verify-status key; a failure to report progress is
    /// logged but never aborts the pass.
    async fn set_status(&self, store: &dyn Store, step: usize, description: &str) {
        let status = format!("Step {} of 5: {}", step, description);
        debug!("{}: {}", self.gw, status);

        if let Err(e) = store.set(&self.gw.keys.verify_status_key(), &status).await {
            error!("{}: writing verify status `{}`: {}", self.gw, status, e);
        }
    }
}
