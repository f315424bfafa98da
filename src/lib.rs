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

#![allow(clippy::uninlined_format_args)]

//! A read-optimized, search-indexed cache of records whose authoritative copy lives in a
//! remote, slow-to-query source-of-truth server.
//!
//! Features:
//! - Cache-first reads with source-of-truth fallback on miss
//! - Full population under a distributed lock, paginated through the source
//! - Write-through save/delete that keeps cache and search index in step
//! - Dual search index: lexicographic prefix matching plus substring scanning
//! - Checksum-based reconciliation ("verify") to catch drift without a rebuild
//!
//! # Cache Key Structure
//!
//! All keys a Kind writes live under its own prefix inside an optional deployment
//! namespace:
//!
//! ```text
//! <kind>^<id>                     primary record entries
//! <kind>-models                   set of cache keys believed valid
//! search_starts_with^<kind>       sorted set: prefix search entries
//! search_includes^<kind>          unordered set: substring search entries
//! <kind>-populated-status         POPULATED / UNPOPULATED sentinel
//! <kind>-verify-status            human-readable reconciliation progress
//! path^<sha256(path)>             project path-index entries
//! ```
//!
//! # Population and Read Path
//!
//! A [`Gateway`] is constructed against a cache [`Store`], a [`SourceOfTruth`] client
//! and a [`LockService`]. Construction only probes the store and asks the source
//! whether identifiers are case sensitive; callers then run
//! [`Gateway::ensure_populated`] once as an explicit initialization step. Reads never
//! take a lock and tolerate a population in progress, because a miss simply falls
//! back to the source of truth.
//!
//! ```text
//! | caller +--> ensure_populated() --> lock_with_check("<kind>_populate")
//! |        |                                |
//! |        |                                v               Source-of-truth
//! |        |                           page loop  <--------- fetch_page(after, max)
//! |        |                                |
//! |        |        Cache Store             v
//! |        +------> <kind>^a  <---- set_multiple / s_add / z_add
//! |        reads    <kind>^b
//! |        fall     search sets
//! |        back on  status keys
//! |        miss --------------------------------> fetch_by_id(id)
//! ```
//!
//! # Error Handling
//!
//! Cache-store unavailability is detected once, at gateway construction; a gateway
//! without a store serves every read from the source of truth and skips cache
//! writes. Search is the only operation allowed to degrade to empty results, since
//! the source of truth cannot be searched directly.

mod checksum;
mod gateway;
mod keys;
mod kind_config;
mod lock;
mod populate;
mod search;
mod store;
mod traverse;
mod verify;

pub use gateway::FetchOptions;
pub use gateway::Gateway;
pub use gateway::GatewayOptions;
pub use keys::path_key;
pub use keys::KeySpace;
pub use keys::POPULATED;
pub use keys::UNPOPULATED;
pub use kind_config::KindConfig;
pub use kind_config::SourceOfTruth;
pub use lock::lock_with_check;
pub use lock::LockLease;
pub use lock::LockService;
pub use search::SearchHit;
pub use search::SearchQuery;
pub use store::Store;
pub use traverse::expand;
pub use verify::VerifyReport;

pub mod errors;

pub mod testing {
    pub mod source;
    pub mod store;
    pub mod types;
    pub mod util;
}
