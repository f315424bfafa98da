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

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::SourceError;

/// Per-Kind capability interface.
///
/// Every cached record category (user, group, project, ...) supplies one
/// implementation describing how its records are identified, indexed and
/// deleted. The gateway, populator, search engine and verifier are generic
/// over this trait; nothing in them knows a concrete record shape.
pub trait KindConfig
where
    Self: fmt::Debug,
    Self: Default,
    Self: Send + Sync + 'static,
{
    /// The record type cached for this Kind.
    ///
    /// The serde JSON form of a record is both its cache value and its
    /// checksum input, so serialization must be deterministic for equal
    /// records.
    type Record: fmt::Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// The client for the authoritative server holding this Kind's records.
    type Source: SourceOfTruth<Self::Record> + Send + Sync + 'static;

    /// The Kind name, e.g. `"group"`. Drives every key this Kind writes.
    fn kind() -> &'static str;

    /// The prefix of primary cache keys. Defaults to the Kind name.
    fn key_prefix() -> &'static str {
        Self::kind()
    }

    /// The unique identifier of a record. Must not contain `:`.
    fn id(record: &Self::Record) -> &str;

    /// The human-readable value indexed for search, typically a name.
    ///
    /// `None` means the record has no searchable text beyond its id.
    fn search_value(record: &Self::Record) -> Option<String>;

    /// Whether the record belongs in the search index at all.
    ///
    /// Used to hide records that live inside this Kind's namespace but
    /// logically belong to another one, e.g. a project's backing group.
    fn include_in_index(_record: &Self::Record) -> bool {
        true
    }

    /// Extra cache entries derived from a record, beyond its primary key.
    ///
    /// Each pair is `(cache key, value contributed under this record's id)`;
    /// the gateway shallow-merges the value into a JSON object stored at the
    /// key, keyed by record id, so records sharing a derived key (e.g. two
    /// projects mapping the same depot path) coexist. Deleting the record
    /// removes only its own id from each object.
    fn extra_cache_entries(_record: &Self::Record) -> Vec<(String, serde_json::Value)> {
        vec![]
    }

    /// Whether this Kind soft-deletes.
    ///
    /// A soft-deleting Kind keeps the primary cache entry on delete (flagged
    /// via [`KindConfig::mark_deleted`]) so callers asking for deleted
    /// records still see it; it still leaves the Model Set and search sets.
    fn soft_deletes() -> bool {
        false
    }

    /// Flag a record as deleted. Only called when [`KindConfig::soft_deletes`] is true.
    fn mark_deleted(_record: &mut Self::Record) {}

    /// Whether a record carries the deleted flag.
    fn is_deleted(_record: &Self::Record) -> bool {
        false
    }
}

/// Client contract for the authoritative source-of-truth server.
#[async_trait::async_trait]
pub trait SourceOfTruth<R> {
    /// Fetch one record by id. `Ok(None)` means the record does not exist.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<R>, SourceError>;

    /// Fetch up to `max` records ordered by id, strictly after the cursor.
    ///
    /// `after = None` starts from the beginning. A page shorter than `max`
    /// signals the end of the collection.
    async fn fetch_page(&self, after: Option<&str>, max: usize) -> Result<Vec<R>, SourceError>;

    /// Create a record, assigning it an id. Returns the stored form.
    async fn create(&self, record: R) -> Result<R, SourceError>;

    /// Save an existing record.
    async fn save(&self, record: &R) -> Result<(), SourceError>;

    /// Delete a record by id.
    async fn delete(&self, id: &str) -> Result<(), SourceError>;

    /// Whether the server compares identifiers case sensitively.
    ///
    /// When false, ids are lower-cased before building cache keys; the same
    /// normalization must apply on every read and write or lookups silently
    /// fail.
    async fn is_case_sensitive(&self) -> Result<bool, SourceError>;
}
