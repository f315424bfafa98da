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

//! Error types for the cache layer.
//!
//! [`StoreError`] and [`SourceError`] carry a reason plus an appendable chain of
//! `when` contexts describing where along an operation the failure surfaced.
//! [`CacheError`] composes them for the gateway surface.

mod cache_error;
mod invalid_search;
mod lock_error;
mod source_error;
mod store_error;

pub use cache_error::CacheError;
pub use invalid_search::InvalidSearch;
pub use lock_error::LockError;
pub use source_error::SourceError;
pub use store_error::StoreError;
