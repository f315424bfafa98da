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

//! Test utilities: a single-process lock service and gateway builders.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::errors::LockError;
use crate::gateway::Gateway;
use crate::gateway::GatewayOptions;
use crate::kind_config::KindConfig;
use crate::lock::LockLease;
use crate::lock::LockService;
use crate::testing::store::MemStore;

/// Named locks backed by in-process tokio mutexes.
///
/// Good enough wherever all writers share one process; production
/// deployments plug in a genuinely distributed implementation.
#[derive(Debug, Default)]
pub struct LocalLockService {
    locks: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

#[async_trait::async_trait]
impl LockService for LocalLockService {
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockLease, LockError> {
        let mutex = {
            let mut locks = self.locks.lock().await;
            locks.entry(name.to_string()).or_default().clone()
        };

        let guard = tokio::time::timeout(timeout, mutex.lock_owned())
            .await
            .map_err(|_| LockError::timeout(name, timeout))?;

        Ok(LockLease::new(name, Box::new(guard)))
    }
}

/// Build a gateway over a shared [`MemStore`] and a [`LocalLockService`].
pub async fn build_gateway<K>(
    store: &MemStore,
    source: K::Source,
    options: GatewayOptions,
) -> Gateway<K>
where
    K: KindConfig,
{
    Gateway::new(
        Arc::new(store.clone()),
        source,
        Arc::new(LocalLockService::default()),
        options,
    )
    .await
    .expect("test gateway construction")
}

/// [`GatewayOptions`] with a small page size, so pagination paths are
/// exercised by modest fixtures.
pub fn small_pages() -> GatewayOptions {
    GatewayOptions {
        page_size: 2,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_is_exclusive_until_dropped() {
        let locks = LocalLockService::default();

        let lease = locks
            .acquire("kind_populate", Duration::from_millis(50))
            .await
            .unwrap();

        let blocked = locks.acquire("kind_populate", Duration::from_millis(50)).await;
        assert!(matches!(blocked, Err(LockError::Timeout { .. })));

        // Unrelated names are independent.
        locks
            .acquire("other_populate", Duration::from_millis(50))
            .await
            .unwrap();

        drop(lease);
        locks
            .acquire("kind_populate", Duration::from_millis(50))
            .await
            .unwrap();
    }
}
