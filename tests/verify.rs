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

//! Reconciliation (verify) integration tests.
//!
//! Drifts the cache away from the source of truth in every direction at
//! once — an extraneous entry, an upstream deletion, an upstream edit and an
//! upstream addition — then checks that one verify pass converges the cache
//! key set exactly onto upstream and clears its status key.

use mirror_cache::testing::source::TestSource;
use mirror_cache::testing::store::MemStore;
use mirror_cache::testing::types::GroupKind;
use mirror_cache::testing::types::TestGroup;
use mirror_cache::testing::util::build_gateway;
use mirror_cache::testing::util::small_pages;
use mirror_cache::SearchQuery;
use mirror_cache::Store;
use mirror_cache::VerifyReport;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_verify_converges_all_drift_at_once() {
    let store = MemStore::new();
    let source = TestSource::new();
    for (id, name) in [("design", "Design"), ("eng", "Engineering"), ("qa", "QA")] {
        source.insert(TestGroup::new(id, name)).await;
    }

    let gw = build_gateway::<GroupKind>(&store, source.clone(), small_pages()).await;
    gw.ensure_populated().await.unwrap();

    // Drift 1: an extraneous cache entry nothing upstream backs.
    let ghost = serde_json::to_string(&TestGroup::new("ghost", "Ghost")).unwrap();
    store.set("group^ghost", &ghost).await.unwrap();
    store
        .s_add("group-models", &["group^ghost".to_string()])
        .await
        .unwrap();

    // Drift 2: an upstream deletion the cache missed.
    source.remove("qa").await;

    // Drift 3: an upstream edit the cache missed.
    source.insert(TestGroup::new("eng", "Engineering v2")).await;

    // Drift 4: an upstream addition the cache missed.
    source.insert(TestGroup::new("ops", "Operations")).await;

    let report = gw.verify().await.unwrap();

    // ghost + qa + stale eng content removed; new eng content + ops fetched.
    assert_eq!(
        report,
        VerifyReport {
            removed: 3,
            refetched: 2
        }
    );

    // The cache key set now matches upstream exactly.
    let kv = store.kv_snapshot().await;
    let mut cached_ids: Vec<String> = kv
        .keys()
        .filter_map(|k| k.strip_prefix("group^").map(|id| id.to_string()))
        .collect();
    cached_ids.sort();
    assert_eq!(cached_ids, vec!["design", "eng", "ops"]);

    assert_eq!(
        gw.fetch_by_id("eng").await.unwrap().unwrap().name,
        "Engineering v2"
    );

    // Model set and search index converged too.
    let models = store.sset_snapshot("group-models").await;
    assert_eq!(models.len(), 3);
    assert!(!models.contains("group^ghost"));
    assert!(!models.contains("group^qa"));

    assert_eq!(gw.search(&SearchQuery::new("qa")).await.unwrap(), vec![]);
    let hits = gw.search(&SearchQuery::new("operations")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "ops");

    // Progress key is cleared on completion.
    assert!(!kv.contains_key("group-verify-status"));
}

#[tokio::test]
async fn test_verify_on_synced_cache_is_a_no_op() {
    let store = MemStore::new();
    let source = TestSource::new();
    source.insert(TestGroup::new("eng", "Engineering")).await;

    let gw = build_gateway::<GroupKind>(&store, source, small_pages()).await;
    gw.ensure_populated().await.unwrap();

    let before = store.kv_snapshot().await;
    let report = gw.verify().await.unwrap();

    assert_eq!(report, VerifyReport::default());
    assert_eq!(before, store.kv_snapshot().await);
}

#[tokio::test]
async fn test_failed_verify_leaves_step_status_visible() {
    let store = MemStore::new();
    let source = TestSource::new();
    source.insert(TestGroup::new("eng", "Engineering")).await;

    let gw = build_gateway::<GroupKind>(&store, source.clone(), small_pages()).await;
    gw.ensure_populated().await.unwrap();

    // The source dies between populate and verify: the pass aborts while
    // checksumming upstream records, and the status key reports exactly
    // where it stopped.
    source.set_fail(true).await;
    assert!(gw.verify().await.is_err());

    assert_eq!(
        store
            .kv_snapshot()
            .await
            .get("group-verify-status")
            .map(String::as_str),
        Some("Step 3 of 5: checksumming source records")
    );
}

#[tokio::test]
async fn test_verify_without_store_reports_nothing() {
    let store = MemStore::new();
    store.set_broken(true);

    let source = TestSource::new();
    source.insert(TestGroup::new("eng", "Engineering")).await;

    let gw = build_gateway::<GroupKind>(&store, source, small_pages()).await;
    assert_eq!(gw.verify().await.unwrap(), VerifyReport::default());
}
