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

use crate::errors::StoreError;

/// Contract for the remote cache store.
///
/// Any key-value service offering scalar KV, an ordered string set with
/// lexicographic range queries, and an unordered string set with pattern
/// scanning is interface-compatible. Each operation is atomic on its own;
/// the cache layer never assumes atomicity across calls.
///
/// Patterns (for [`Store::keys`] and [`Store::s_scan`]) are glob-style:
/// `*` matches any run of characters, everything else is literal.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Get the value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set `key` to `value`, overwriting any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Get many keys at once; absent keys are simply missing from the map.
    async fn get_multiple(&self, keys: &[String]) -> Result<BTreeMap<String, String>, StoreError>;

    /// Set many key-value pairs at once.
    async fn set_multiple(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError>;

    /// Delete many keys at once.
    async fn delete_multiple(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Add members to the sorted set at `set`.
    ///
    /// All members share one rank; ordering inside the set is purely
    /// lexicographic, which is what the prefix index relies on.
    async fn z_add(&self, set: &str, members: &[String]) -> Result<(), StoreError>;

    /// Members of the sorted set in `[min, max)`, lexicographically,
    /// skipping `offset` and returning at most `count` when given.
    async fn z_range_by_lex(
        &self,
        set: &str,
        min: &str,
        max: &str,
        offset: usize,
        count: Option<usize>,
    ) -> Result<Vec<String>, StoreError>;

    /// Remove members from the sorted set.
    async fn z_rem(&self, set: &str, members: &[String]) -> Result<(), StoreError>;

    /// Add members to the unordered set at `set`.
    async fn s_add(&self, set: &str, members: &[String]) -> Result<(), StoreError>;

    /// Remove members from the unordered set.
    async fn s_rem(&self, set: &str, members: &[String]) -> Result<(), StoreError>;

    /// One page of members matching `pattern`, starting at `cursor`.
    ///
    /// Returns the next cursor and the page; a returned cursor of `0` means
    /// the scan is complete. `count` is a page-size hint, not a guarantee.
    async fn s_scan(
        &self,
        set: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError>;

    /// Cardinality of the unordered set.
    async fn s_card(&self, set: &str) -> Result<usize, StoreError>;

    /// All keys matching `pattern`.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

/// Drain an unordered set scan into one vector.
pub(crate) async fn s_scan_all(
    store: &dyn Store,
    set: &str,
    pattern: &str,
) -> Result<Vec<String>, StoreError> {
    let mut members = Vec::new();
    let mut cursor = 0;

    loop {
        let (next, page) = store.s_scan(set, cursor, pattern, 512).await?;
        members.extend(page);
        if next == 0 {
            return Ok(members);
        }
        cursor = next;
    }
}
