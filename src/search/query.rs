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

use std::collections::BTreeSet;

use log::debug;
use log::warn;

use crate::errors::CacheError;
use crate::errors::InvalidSearch;
use crate::errors::StoreError;
use crate::keys::KeySpace;
use crate::search::decode_entry;
use crate::search::encode_entries;
use crate::search::SearchHit;
use crate::search::HIGH_SENTINEL;
use crate::search::PAYLOAD_SEP;
use crate::store::s_scan_all;
use crate::store::Store;

/// A validated-on-use search request.
///
/// `limit == 0` means unlimited. Result order is undefined beyond "prefix
/// matches come before substring-only matches"; callers must not rely on
/// ranking.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// The term to match; lowercased before use.
    pub term: String,

    /// Maximum number of results, `0` for no limit.
    pub limit: usize,

    /// Skip the substring phase entirely.
    pub starts_with_only: bool,

    /// Record ids never to return, compared case-insensitively.
    pub exclude: Vec<String>,
}

impl SearchQuery {
    pub fn new(term: impl ToString) -> Self {
        SearchQuery {
            term: term.to_string(),
            limit: 0,
            starts_with_only: false,
            exclude: vec![],
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn starts_with_only(mut self) -> Self {
        self.starts_with_only = true;
        self
    }

    pub fn with_exclude(mut self, ids: impl IntoIterator<Item = impl ToString>) -> Self {
        self.exclude = ids.into_iter().map(|id| id.to_string()).collect();
        self
    }

    /// Reject malformed input before any cache access.
    pub(crate) fn validate(&self) -> Result<(), InvalidSearch> {
        if self.term.trim().is_empty() {
            return Err(InvalidSearch::new("search term must not be empty"));
        }
        if self.term.contains(PAYLOAD_SEP) || self.term.contains(HIGH_SENTINEL) {
            return Err(InvalidSearch::new(
                "search term contains a reserved separator",
            ));
        }
        Ok(())
    }

    fn lower_term(&self) -> String {
        self.term.to_lowercase()
    }

    fn lower_exclude(&self) -> BTreeSet<String> {
        self.exclude.iter().map(|id| id.to_lowercase()).collect()
    }
}

/// The two search sets of one Kind, bound to a store.
pub(crate) struct SearchIndex<'a> {
    pub store: &'a dyn Store,
    pub keys: &'a KeySpace,
}

impl SearchIndex<'_> {
    /// Write the index entries for one `(name, id)` pair.
    pub async fn add(&self, name: &str, id: &str) -> Result<(), StoreError> {
        let pair = (name.to_string(), id.to_string());
        self.add_batch(std::slice::from_ref(&pair)).await
    }

    /// Write index entries for many `(name, id)` pairs in two set writes.
    pub async fn add_batch(&self, pairs: &[(String, String)]) -> Result<(), StoreError> {
        if pairs.is_empty() {
            return Ok(());
        }

        let mut substring_members = Vec::with_capacity(pairs.len());
        let mut prefix_members = Vec::with_capacity(pairs.len() * 2);

        for (name, id) in pairs {
            let encoded = encode_entries(name, id);
            substring_members.push(encoded.substring);
            prefix_members.extend(encoded.prefix);
        }

        self.store
            .z_add(&self.keys.prefix_index_set(), &prefix_members)
            .await?;
        self.store
            .s_add(&self.keys.substring_index_set(), &substring_members)
            .await?;

        Ok(())
    }

    /// Remove every entry whose recovered id equals `id`.
    ///
    /// Looks the entries up by a raw prefix search on the lowercase id, then
    /// rebuilds both orderings from each matching payload so the pair is
    /// removed even when only one ordering matched the lookup. Must run
    /// before a delete or rename would orphan the entries.
    pub async fn remove_id(&self, id: &str) -> Result<(), CacheError> {
        let target = id.to_lowercase();

        let found = self.prefix_entries(&target, 0).await?;

        let mut prefix_victims = Vec::new();
        let mut substring_victims = Vec::new();

        for entry in found {
            let Some(hit) = decode_entry(&entry) else {
                warn!("search index holds undecodable entry `{}`; skipping", entry);
                continue;
            };
            if hit.id.to_lowercase() != target {
                continue;
            }

            let encoded = encode_entries(&hit.name, &hit.id);
            prefix_victims.extend(encoded.prefix);
            substring_victims.push(encoded.substring);
        }

        if prefix_victims.is_empty() {
            return Ok(());
        }

        self.store
            .z_rem(&self.keys.prefix_index_set(), &prefix_victims)
            .await
            .map_err(|e| CacheError::from(e.context(format!("removing search entries id={}", id))))?;
        self.store
            .s_rem(&self.keys.substring_index_set(), &substring_victims)
            .await
            .map_err(|e| CacheError::from(e.context(format!("removing search entries id={}", id))))?;

        Ok(())
    }

    /// Delete both search sets outright.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store
            .delete_multiple(&[self.keys.prefix_index_set(), self.keys.substring_index_set()])
            .await
    }

    /// Run a query and return raw entries, prefix matches first.
    pub async fn query_entries(&self, query: &SearchQuery) -> Result<Vec<String>, CacheError> {
        query.validate()?;

        let term = query.lower_term();

        // Phase 1: lexicographic prefix match.
        let mut results = self.prefix_entries(&term, query.limit).await?;
        debug!(
            "search kind={} term={}: {} prefix match(es)",
            self.keys.kind(),
            term,
            results.len()
        );

        // Phase 2: substring scan, unless prefix-only or already satisfied.
        let satisfied = query.limit > 0 && results.len() >= query.limit;
        if !query.starts_with_only && !satisfied {
            let seen: BTreeSet<String> = results.iter().cloned().collect();
            let pattern = format!("*{}*", term);

            let mut scanned = s_scan_all(self.store, &self.keys.substring_index_set(), &pattern)
                .await
                .map_err(|e| CacheError::from(e.context("substring scan")))?;
            scanned.sort();
            scanned.dedup();

            let budget = if query.limit > 0 {
                query.limit - results.len()
            } else {
                usize::MAX
            };

            results.extend(
                scanned
                    .into_iter()
                    .filter(|entry| !seen.contains(entry))
                    .take(budget),
            );
        }

        // Exclusion list applies to the merged results.
        let excluded = query.lower_exclude();
        if !excluded.is_empty() {
            results.retain(|entry| match decode_entry(entry) {
                Some(hit) => !excluded.contains(&hit.id.to_lowercase()),
                None => false,
            });
        }

        Ok(results)
    }

    /// Run a query and decode the payloads.
    ///
    /// Both orderings of a record's prefix entries can match one term (a
    /// search for `eng` matches `engineering:eng...` and
    /// `eng:engineering...` alike), so decoded hits dedupe by recovered id.
    pub async fn query(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CacheError> {
        let entries = self.query_entries(query).await?;

        let mut seen = BTreeSet::new();
        Ok(entries
            .iter()
            .filter_map(|entry| decode_entry(entry))
            .filter(|hit| seen.insert(hit.id.to_lowercase()))
            .collect())
    }

    /// Sorted, deduplicated entries starting with `term`, truncated to
    /// `limit` when non-zero.
    async fn prefix_entries(&self, term: &str, limit: usize) -> Result<Vec<String>, CacheError> {
        let upper = format!("{}{}", term, HIGH_SENTINEL);

        let found = self
            .store
            .z_range_by_lex(&self.keys.prefix_index_set(), term, &upper, 0, None)
            .await
            .map_err(|e| CacheError::from(e.context("prefix range query")))?;

        let mut entries: Vec<String> = found;
        entries.sort();
        entries.dedup();

        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}
