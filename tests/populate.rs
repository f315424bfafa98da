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

//! Population lifecycle integration tests.
//!
//! Covers:
//! 1. **Full population**: paginated load of the source of truth into the
//!    cache, model set and search sets, flag flipped last
//! 2. **Idempotence**: a second populate with no intervening writes leaves
//!    cache content byte-identical
//! 3. **Invalidate**: clean slate plus `UNPOPULATED`, and the next
//!    `ensure_populated` rebuilds
//! 4. **Failure**: a source error mid-page aborts the populate and leaves
//!    the flag unpopulated, so a later attempt retries from scratch
//! 5. **Concurrency**: racing callers agree on exactly one populate run

use std::sync::Arc;

use mirror_cache::path_key;
use mirror_cache::testing::source::TestSource;
use mirror_cache::testing::store::MemStore;
use mirror_cache::testing::types::GroupKind;
use mirror_cache::testing::types::ProjectKind;
use mirror_cache::testing::types::TestGroup;
use mirror_cache::testing::types::TestProject;
use mirror_cache::testing::util::build_gateway;
use mirror_cache::testing::util::small_pages;
use mirror_cache::POPULATED;
use mirror_cache::UNPOPULATED;
use pretty_assertions::assert_eq;

async fn seeded_source(ids: &[(&str, &str)]) -> TestSource<TestGroup> {
    let source = TestSource::new();
    for (id, name) in ids {
        source.insert(TestGroup::new(*id, *name)).await;
    }
    source
}

#[tokio::test]
async fn test_populate_writes_all_artifacts() {
    let store = MemStore::new();
    let source = seeded_source(&[
        ("design", "Design"),
        ("eng", "Engineering"),
        ("ops", "Operations"),
        ("qa", "QA"),
        ("sales", "Sales"),
    ])
    .await;

    // Page size 2 over 5 records forces three pages.
    let gw = build_gateway::<GroupKind>(&store, source, small_pages()).await;

    assert!(!gw.is_populated().await);
    assert!(gw.ensure_populated().await.unwrap(), "populate should run");
    assert!(gw.is_populated().await);

    let kv = store.kv_snapshot().await;
    assert_eq!(kv.get("group-populated-status").unwrap(), POPULATED);
    for id in ["design", "eng", "ops", "qa", "sales"] {
        assert!(kv.contains_key(&format!("group^{}", id)), "missing {}", id);
    }

    let models = store.sset_snapshot("group-models").await;
    assert_eq!(models.len(), 5);
    assert!(models.contains("group^eng"));

    // One substring entry per record. Two prefix entries when lowercase
    // name and id differ (eng, ops), one when they coincide (design, qa,
    // sales): 2 * 2 + 3 = 7.
    assert_eq!(store.sset_snapshot("search_includes^group").await.len(), 5);
    assert_eq!(
        store.zset_snapshot("search_starts_with^group").await.len(),
        7
    );
}

#[tokio::test]
async fn test_populate_twice_is_idempotent() {
    let store = MemStore::new();
    let source = seeded_source(&[("eng", "Engineering"), ("qa", "QA")]).await;
    let gw = build_gateway::<GroupKind>(&store, source, small_pages()).await;

    assert!(gw.ensure_populated().await.unwrap());
    let after_first = store.kv_snapshot().await;

    // The flag is set, so the check under the lock skips the body.
    assert!(!gw.ensure_populated().await.unwrap());
    assert_eq!(after_first, store.kv_snapshot().await);
}

#[tokio::test]
async fn test_invalidate_then_repopulate() {
    let store = MemStore::new();
    let source = seeded_source(&[("eng", "Engineering"), ("qa", "QA")]).await;
    let gw = build_gateway::<GroupKind>(&store, source, small_pages()).await;

    gw.ensure_populated().await.unwrap();
    assert!(gw.invalidate().await.unwrap(), "invalidate should run");
    assert!(!gw.is_populated().await);

    let kv = store.kv_snapshot().await;
    assert_eq!(kv.get("group-populated-status").unwrap(), UNPOPULATED);
    assert!(!kv.contains_key("group^eng"));
    assert!(store.sset_snapshot("group-models").await.is_empty());
    assert!(store.sset_snapshot("search_includes^group").await.is_empty());
    assert!(store
        .zset_snapshot("search_starts_with^group")
        .await
        .is_empty());

    // Not populated, so a second invalidate is a no-op.
    assert!(!gw.invalidate().await.unwrap());

    assert!(gw.ensure_populated().await.unwrap());
    assert!(store.kv_snapshot().await.contains_key("group^eng"));
}

#[tokio::test]
async fn test_populate_failure_leaves_flag_unpopulated() {
    let store = MemStore::new();
    let source = seeded_source(&[("eng", "Engineering"), ("qa", "QA"), ("ops", "Ops")]).await;
    let gw = build_gateway::<GroupKind>(&store, source.clone(), small_pages()).await;

    source.set_fail(true).await;
    assert!(gw.ensure_populated().await.is_err());
    assert!(!gw.is_populated().await);

    // The next access retries from scratch and succeeds.
    source.set_fail(false).await;
    assert!(gw.ensure_populated().await.unwrap());
    assert!(gw.is_populated().await);
    assert_eq!(store.sset_snapshot("group-models").await.len(), 3);
}

#[tokio::test]
async fn test_clean_slate_unmerges_path_entries_of_removed_records() {
    let store = MemStore::new();
    let source = TestSource::new();
    source
        .insert(TestProject::new("proj1", "Platform").with_branch("main", ["//depot/x"]))
        .await;
    source.insert(TestProject::new("proj2", "Tools")).await;

    let gw = build_gateway::<ProjectKind>(&store, source.clone(), small_pages()).await;
    gw.ensure_populated().await.unwrap();

    let key = path_key("//depot/x");
    assert!(store.kv_snapshot().await.contains_key(&key));

    // Removed upstream before the rebuild: its path contribution must not
    // outlive the clean slate.
    source.remove("proj1").await;
    gw.invalidate().await.unwrap();
    assert!(!store.kv_snapshot().await.contains_key(&key));

    gw.ensure_populated().await.unwrap();
    assert!(!store.kv_snapshot().await.contains_key(&key));
    assert_eq!(store.sset_snapshot("project-models").await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_callers_populate_exactly_once() {
    let store = MemStore::new();
    let source = seeded_source(&[("eng", "Engineering"), ("qa", "QA")]).await;
    let gw = Arc::new(build_gateway::<GroupKind>(&store, source, small_pages()).await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gw = gw.clone();
        handles.push(tokio::spawn(async move {
            gw.ensure_populated().await.unwrap()
        }));
    }

    let mut ran = 0;
    for handle in handles {
        if handle.await.unwrap() {
            ran += 1;
        }
    }

    assert_eq!(ran, 1, "exactly one caller should have populated");
    assert!(gw.is_populated().await);
    assert_eq!(store.sset_snapshot("group-models").await.len(), 2);
}
