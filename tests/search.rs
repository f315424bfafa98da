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

//! Search engine integration tests.
//!
//! Covers the dual-index query contract:
//! 1. **Symmetry**: a record is found by name prefix, id prefix, and
//!    substring alike, case-insensitively
//! 2. **startsWithOnly**: the substring phase can be skipped
//! 3. **Ordering**: prefix matches come before substring-only matches
//! 4. **Limits and exclusion lists**
//! 5. **Validation**: bad input is rejected before any cache access
//! 6. **Index predicate**: records a Kind excludes never get entries

use mirror_cache::errors::CacheError;
use mirror_cache::testing::source::TestSource;
use mirror_cache::testing::store::MemStore;
use mirror_cache::testing::types::GroupKind;
use mirror_cache::testing::types::TestGroup;
use mirror_cache::testing::util::build_gateway;
use mirror_cache::testing::util::small_pages;
use mirror_cache::Gateway;
use mirror_cache::SearchQuery;
use pretty_assertions::assert_eq;

async fn gateway_with(groups: Vec<TestGroup>) -> (MemStore, Gateway<GroupKind>) {
    let store = MemStore::new();
    let source = TestSource::new();
    for group in groups {
        source.insert(group).await;
    }
    let gw = build_gateway::<GroupKind>(&store, source, small_pages()).await;
    gw.ensure_populated().await.unwrap();
    (store, gw)
}

fn hit_ids(hits: &[mirror_cache::SearchHit]) -> Vec<&str> {
    hits.iter().map(|h| h.id.as_str()).collect()
}

#[tokio::test]
async fn test_entry_symmetry_name_and_id_prefix() {
    let (_store, gw) = gateway_with(vec![TestGroup::new("User1", "Zebras")]).await;

    // Name prefix, id prefix, and mixed case all land on the same record.
    for term in ["zeb", "user", "USER1", "Zebras"] {
        let hits = gw.search(&SearchQuery::new(term)).await.unwrap();
        assert_eq!(hit_ids(&hits), vec!["User1"], "term {}", term);
        assert_eq!(hits[0].name, "Zebras");
    }

    // Id prefix satisfied without the substring phase.
    let hits = gw
        .search(&SearchQuery::new("user1").starts_with_only())
        .await
        .unwrap();
    assert_eq!(hit_ids(&hits), vec!["User1"]);

    // A mid-string term needs the substring phase.
    let miss = gw
        .search(&SearchQuery::new("ebra").starts_with_only())
        .await
        .unwrap();
    assert_eq!(miss, vec![]);
    let hits = gw.search(&SearchQuery::new("ebra")).await.unwrap();
    assert_eq!(hit_ids(&hits), vec!["User1"]);
}

#[tokio::test]
async fn test_prefix_hits_come_before_substring_hits() {
    let (_store, gw) = gateway_with(vec![
        TestGroup::new("a1", "Zed"),
        TestGroup::new("b1", "XZed"),
    ])
    .await;

    // "zed" is a prefix of a1's name but only a substring of b1's.
    let hits = gw.search(&SearchQuery::new("zed")).await.unwrap();
    assert_eq!(hit_ids(&hits), vec!["a1", "b1"]);

    let prefix_only = gw
        .search(&SearchQuery::new("zed").starts_with_only())
        .await
        .unwrap();
    assert_eq!(hit_ids(&prefix_only), vec!["a1"]);
}

#[tokio::test]
async fn test_limit_and_exclusion() {
    let (_store, gw) = gateway_with(vec![
        TestGroup::new("dev1", "Developers One"),
        TestGroup::new("dev2", "Developers Two"),
        TestGroup::new("dev3", "Developers Three"),
    ])
    .await;

    let all = gw.search(&SearchQuery::new("dev")).await.unwrap();
    assert_eq!(all.len(), 3);

    let limited = gw.search(&SearchQuery::new("dev").with_limit(1)).await.unwrap();
    assert_eq!(limited.len(), 1);

    // An excluded id never comes back, however well it matches, and the
    // comparison ignores case.
    let excluded = gw
        .search(&SearchQuery::new("dev").with_exclude(["DEV2"]))
        .await
        .unwrap();
    assert_eq!(hit_ids(&excluded), vec!["dev1", "dev3"]);
}

#[tokio::test]
async fn test_invalid_input_rejected_synchronously() {
    let (store, gw) = gateway_with(vec![TestGroup::new("eng", "Engineering")]).await;

    // Break the store: validation must fire before any cache access.
    store.set_broken(true);

    let empty = gw.search(&SearchQuery::new("   ")).await;
    assert!(matches!(empty, Err(CacheError::InvalidSearch(_))));

    let reserved = gw.search(&SearchQuery::new("a\u{1f}b")).await;
    assert!(matches!(reserved, Err(CacheError::InvalidSearch(_))));
}

#[tokio::test]
async fn test_raw_entries_recover_payload() {
    let (_store, gw) = gateway_with(vec![TestGroup::new("User1", "Zebras")]).await;

    let entries = gw.search_entries(&SearchQuery::new("zeb")).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("zebras:user1"));
    assert!(entries[0].ends_with("Zebras:User1"));
}

#[tokio::test]
async fn test_project_backing_groups_stay_out_of_the_index() {
    let (store, gw) = gateway_with(vec![
        TestGroup::new("eng", "Engineering"),
        TestGroup::new("shadow", "Shadow").backing_project("proj1"),
    ])
    .await;

    // Cached like any group, but never indexed.
    assert!(store.kv_snapshot().await.contains_key("group^shadow"));
    assert_eq!(gw.search(&SearchQuery::new("shadow")).await.unwrap(), vec![]);
    assert_eq!(
        store.sset_snapshot("search_includes^group").await.len(),
        1,
        "only the real group has a substring entry"
    );
}

#[tokio::test]
async fn test_group_scenario_populate_search_delete() {
    let (_store, gw) = gateway_with(vec![
        TestGroup::new("eng", "Engineering"),
        TestGroup::new("qa", "QA"),
    ])
    .await;

    let hits = gw.search(&SearchQuery::new("eng").with_limit(10)).await.unwrap();
    assert_eq!(hit_ids(&hits), vec!["eng"]);

    let hits = gw.search(&SearchQuery::new("q")).await.unwrap();
    assert_eq!(hit_ids(&hits), vec!["qa"]);

    let qa = gw.fetch_by_id("qa").await.unwrap().unwrap();
    gw.delete(qa).await.unwrap();

    assert_eq!(gw.search(&SearchQuery::new("q")).await.unwrap(), vec![]);
}
