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

//! MemStore: an in-memory cache store for integration tests.
//!
//! Implements every [`Store`] primitive over locked maps, plus an outage
//! switch so tests can exercise the cache-less degraded mode.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::store::Store;

#[derive(Debug, Default)]
struct MemState {
    kv: BTreeMap<String, String>,
    zsets: BTreeMap<String, BTreeSet<String>>,
    ssets: BTreeMap<String, BTreeSet<String>>,
}

/// In-memory [`Store`]. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<MemState>>,
    broken: Arc<AtomicBool>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, or stop doing so.
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if self.broken.load(Ordering::SeqCst) {
            Err(StoreError::new("store is down (simulated)"))
        } else {
            Ok(())
        }
    }

    /// Snapshot of all scalar keys and values.
    pub async fn kv_snapshot(&self) -> BTreeMap<String, String> {
        self.state.lock().await.kv.clone()
    }

    /// Snapshot of one unordered set.
    pub async fn sset_snapshot(&self, set: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .await
            .ssets
            .get(set)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of one sorted set.
    pub async fn zset_snapshot(&self, set: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .await
            .zsets
            .get(set)
            .cloned()
            .unwrap_or_default()
    }
}

/// Glob matching with `*` as the only wildcard.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[async_trait::async_trait]
impl Store for MemStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_up()?;
        Ok(self.state.lock().await.kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_up()?;
        self.state
            .lock()
            .await
            .kv
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_up()?;
        let mut state = self.state.lock().await;
        state.kv.remove(key);
        state.zsets.remove(key);
        state.ssets.remove(key);
        Ok(())
    }

    async fn get_multiple(&self, keys: &[String]) -> Result<BTreeMap<String, String>, StoreError> {
        self.check_up()?;
        let state = self.state.lock().await;
        Ok(keys
            .iter()
            .filter_map(|k| state.kv.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set_multiple(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.check_up()?;
        let mut state = self.state.lock().await;
        for (k, v) in entries {
            state.kv.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn delete_multiple(&self, keys: &[String]) -> Result<(), StoreError> {
        self.check_up()?;
        let mut state = self.state.lock().await;
        for k in keys {
            state.kv.remove(k);
            state.zsets.remove(k);
            state.ssets.remove(k);
        }
        Ok(())
    }

    async fn z_add(&self, set: &str, members: &[String]) -> Result<(), StoreError> {
        self.check_up()?;
        let mut state = self.state.lock().await;
        let zset = state.zsets.entry(set.to_string()).or_default();
        for m in members {
            zset.insert(m.clone());
        }
        Ok(())
    }

    async fn z_range_by_lex(
        &self,
        set: &str,
        min: &str,
        max: &str,
        offset: usize,
        count: Option<usize>,
    ) -> Result<Vec<String>, StoreError> {
        self.check_up()?;
        let state = self.state.lock().await;
        let Some(zset) = state.zsets.get(set) else {
            return Ok(vec![]);
        };

        let range = zset.range::<str, _>((Bound::Included(min), Bound::Excluded(max)));
        let members = range.skip(offset);
        Ok(match count {
            Some(count) => members.take(count).cloned().collect(),
            None => members.cloned().collect(),
        })
    }

    async fn z_rem(&self, set: &str, members: &[String]) -> Result<(), StoreError> {
        self.check_up()?;
        let mut state = self.state.lock().await;
        if let Some(zset) = state.zsets.get_mut(set) {
            for m in members {
                zset.remove(m);
            }
        }
        Ok(())
    }

    async fn s_add(&self, set: &str, members: &[String]) -> Result<(), StoreError> {
        self.check_up()?;
        let mut state = self.state.lock().await;
        let sset = state.ssets.entry(set.to_string()).or_default();
        for m in members {
            sset.insert(m.clone());
        }
        Ok(())
    }

    async fn s_rem(&self, set: &str, members: &[String]) -> Result<(), StoreError> {
        self.check_up()?;
        let mut state = self.state.lock().await;
        if let Some(sset) = state.ssets.get_mut(set) {
            for m in members {
                sset.remove(m);
            }
        }
        Ok(())
    }

    async fn s_scan(
        &self,
        set: &str,
        _cursor: u64,
        pattern: &str,
        _count: usize,
    ) -> Result<(u64, Vec<String>), StoreError> {
        self.check_up()?;
        let state = self.state.lock().await;
        let members = state
            .ssets
            .get(set)
            .map(|sset| {
                sset.iter()
                    .filter(|m| glob_match(pattern, m))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Everything fits in one page; the scan always completes.
        Ok((0, members))
    }

    async fn s_card(&self, set: &str) -> Result<usize, StoreError> {
        self.check_up()?;
        let state = self.state.lock().await;
        Ok(state.ssets.get(set).map(|s| s.len()).unwrap_or(0))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check_up()?;
        let state = self.state.lock().await;
        let mut found: Vec<String> = state
            .kv
            .keys()
            .chain(state.zsets.keys())
            .chain(state.ssets.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        found.sort();
        found.dedup();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("group^*", "group^eng"));
        assert!(!glob_match("group^*", "project^eng"));
        assert!(glob_match("*eng*", "xx eng yy"));
        assert!(glob_match("*eng*", "eng"));
        assert!(!glob_match("*eng*", "e-n-g"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("a*c", "abd"));
        assert!(glob_match("a*c*", "abcd"));
    }

    #[tokio::test]
    async fn test_kv_and_sets() {
        let store = MemStore::new();

        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        store.z_add("z", &["b".into(), "a".into(), "c".into()]).await.unwrap();
        let in_range = store.z_range_by_lex("z", "a", "c", 0, None).await.unwrap();
        assert_eq!(in_range, vec!["a", "b"]);

        store.s_add("s", &["x".into(), "y".into()]).await.unwrap();
        assert_eq!(store.s_card("s").await.unwrap(), 2);
        let (cursor, members) = store.s_scan("s", 0, "*x*", 10).await.unwrap();
        assert_eq!(cursor, 0);
        assert_eq!(members, vec!["x"]);

        // delete() clears a set stored under the same name.
        store.delete("s").await.unwrap();
        assert_eq!(store.s_card("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broken_switch() {
        let store = MemStore::new();
        store.set_broken(true);
        assert!(store.get("a").await.is_err());
        store.set_broken(false);
        assert!(store.get("a").await.is_ok());
    }
}
