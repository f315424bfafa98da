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

use std::fmt;

use crate::errors::InvalidSearch;
use crate::errors::LockError;
use crate::errors::SourceError;
use crate::errors::StoreError;

/// Any error the gateway surface can return.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    Lock(#[from] LockError),

    #[error("{0}")]
    InvalidSearch(#[from] InvalidSearch),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    /// Append a context to the underlying error where it carries one.
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            Self::Store(e) => Self::Store(e.context(context)),
            Self::Source(e) => Self::Source(e.context(context)),
            other => other,
        }
    }
}
