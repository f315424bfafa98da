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

//! TestSource: an in-memory source-of-truth server for integration tests.
//!
//! Holds records in an id-ordered map, pages the way the real client
//! contract demands (strictly after the cursor), and can simulate outages
//! and flip case sensitivity.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::SourceError;
use crate::kind_config::SourceOfTruth;

/// Identity accessors the in-memory source needs from a record type.
pub trait TestRecord: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

#[derive(Debug)]
struct SourceState<R> {
    records: BTreeMap<String, R>,
    case_sensitive: bool,
    fail: bool,
    created: u64,
}

/// In-memory [`SourceOfTruth`]. Cloning shares the underlying state.
#[derive(Debug)]
pub struct TestSource<R> {
    state: Arc<Mutex<SourceState<R>>>,
}

impl<R> Clone for TestSource<R> {
    fn clone(&self) -> Self {
        TestSource {
            state: self.state.clone(),
        }
    }
}

impl<R> Default for TestSource<R>
where
    R: TestRecord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> TestSource<R>
where
    R: TestRecord,
{
    pub fn new() -> Self {
        TestSource {
            state: Arc::new(Mutex::new(SourceState {
                records: BTreeMap::new(),
                case_sensitive: false,
                fail: false,
                created: 0,
            })),
        }
    }

    /// Insert or replace a record, bypassing the gateway.
    pub async fn insert(&self, record: R) {
        let mut state = self.state.lock().await;
        state.records.insert(record.id().to_string(), record);
    }

    /// Remove a record, bypassing the gateway.
    pub async fn remove(&self, id: &str) {
        self.state.lock().await.records.remove(id);
    }

    pub async fn set_case_sensitive(&self, case_sensitive: bool) {
        self.state.lock().await.case_sensitive = case_sensitive;
    }

    /// Make every subsequent call fail, or stop doing so.
    pub async fn set_fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.records.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<R> {
        self.state.lock().await.records.values().cloned().collect()
    }

    fn find<'a>(state: &'a SourceState<R>, id: &str) -> Option<&'a R> {
        if state.case_sensitive {
            state.records.get(id)
        } else {
            let lower = id.to_lowercase();
            state
                .records
                .values()
                .find(|r| r.id().to_lowercase() == lower)
        }
    }
}

#[async_trait::async_trait]
impl<R> SourceOfTruth<R> for TestSource<R>
where
    R: TestRecord + fmt::Debug,
{
    async fn fetch_by_id(&self, id: &str) -> Result<Option<R>, SourceError> {
        let state = self.state.lock().await;
        if state.fail {
            return Err(SourceError::new("source is down (simulated)").context("fetch_by_id"));
        }
        Ok(Self::find(&state, id).cloned())
    }

    async fn fetch_page(&self, after: Option<&str>, max: usize) -> Result<Vec<R>, SourceError> {
        let state = self.state.lock().await;
        if state.fail {
            return Err(SourceError::new("source is down (simulated)").context("fetch_page"));
        }

        let page = state
            .records
            .iter()
            .filter(|(id, _)| match after {
                Some(after) => id.as_str() > after,
                None => true,
            })
            .take(max)
            .map(|(_, r)| r.clone())
            .collect();
        Ok(page)
    }

    async fn create(&self, mut record: R) -> Result<R, SourceError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(SourceError::new("source is down (simulated)").context("create"));
        }

        state.created += 1;
        record.set_id(format!("id{}", state.created));
        state
            .records
            .insert(record.id().to_string(), record.clone());
        Ok(record)
    }

    async fn save(&self, record: &R) -> Result<(), SourceError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(SourceError::new("source is down (simulated)").context("save"));
        }

        state
            .records
            .insert(record.id().to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SourceError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(SourceError::new("source is down (simulated)").context("delete"));
        }

        state.records.remove(id);
        Ok(())
    }

    async fn is_case_sensitive(&self) -> Result<bool, SourceError> {
        let state = self.state.lock().await;
        if state.fail {
            return Err(SourceError::new("source is down (simulated)").context("is_case_sensitive"));
        }
        Ok(state.case_sensitive)
    }
}
