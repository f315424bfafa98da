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

/// A search query was rejected before any cache access.
///
/// Raised synchronously for an empty term or a term containing one of the
/// reserved search-entry separators.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid search input: {reason}")]
pub struct InvalidSearch {
    reason: String,
}

impl InvalidSearch {
    pub fn new(reason: impl ToString) -> Self {
        InvalidSearch {
            reason: reason.to_string(),
        }
    }
}
