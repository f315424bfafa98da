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

use std::time::Duration;

/// Failure to acquire a named distributed lock.
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("lock `{name}` not acquired within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("lock `{name}` failed: {reason}")]
    Failed { name: String, reason: String },
}

impl LockError {
    pub fn timeout(name: impl ToString, timeout: Duration) -> Self {
        LockError::Timeout {
            name: name.to_string(),
            timeout,
        }
    }

    pub fn failed(name: impl ToString, reason: impl ToString) -> Self {
        LockError::Failed {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
