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

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use log::debug;

use crate::errors::CacheError;
use crate::errors::LockError;

/// A held named lock, released when dropped.
///
/// The boxed payload is whatever the lock service needs to keep the lock
/// alive (a mutex guard, a lease token, a connection handle).
pub struct LockLease {
    name: String,
    _keepalive: Box<dyn Any + Send>,
}

impl LockLease {
    pub fn new(name: impl ToString, keepalive: Box<dyn Any + Send>) -> Self {
        LockLease {
            name: name.to_string(),
            _keepalive: keepalive,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Named mutual-exclusion locks shared across workers.
///
/// Population and invalidation serialize on a per-Kind lock; everything else
/// in the cache layer runs lock-free. The `timeout` bounds how long the
/// caller waits to acquire; callers with an ambient execution-time limit
/// must first extend it to at least this long.
#[async_trait::async_trait]
pub trait LockService: Send + Sync {
    /// Acquire the lock named `name`, waiting up to `timeout`.
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockLease, LockError>;
}

/// Acquire `name`, evaluate `check` while holding it, and run `body` only if
/// the check holds.
///
/// This is the check-then-run contract population depends on: re-evaluating
/// the predicate under the lock means two callers racing to populate cannot
/// both run the body, and a caller arriving just after another finished sees
/// the fresh state and correctly skips. Returns `Ok(None)` when the check
/// failed and the body was skipped.
pub async fn lock_with_check<C, CFut, B, BFut, T>(
    lock: &dyn LockService,
    name: &str,
    timeout: Duration,
    check: C,
    body: B,
) -> Result<Option<T>, CacheError>
where
    C: FnOnce() -> CFut,
    CFut: Future<Output = Result<bool, CacheError>>,
    B: FnOnce() -> BFut,
    BFut: Future<Output = Result<T, CacheError>>,
{
    let lease = lock.acquire(name, timeout).await?;
    debug!("lock `{}` acquired", lease.name());

    let wanted = check().await?;
    if !wanted {
        debug!("lock `{}`: check failed, skipping body", lease.name());
        return Ok(None);
    }

    let out = body().await?;

    // Lease dropped here, releasing the lock after the body completed.
    drop(lease);
    Ok(Some(out))
}
