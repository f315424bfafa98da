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

//! Dual search index over string-set primitives.
//!
//! Prefix matching uses a lexicographic range query over a sorted set;
//! substring matching uses a wildcard scan over an unordered set. Both sets
//! hold [entries](entry) that encode a record's lowercase text for matching
//! and its original-case `name:id` payload for recovery.

mod entry;
mod query;

pub use entry::SearchHit;
pub use query::SearchQuery;

pub(crate) use entry::decode_entry;
pub(crate) use entry::encode_entries;
pub(crate) use entry::HIGH_SENTINEL;
pub(crate) use entry::PAYLOAD_SEP;
pub(crate) use query::SearchIndex;
