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

use crate::checksum::content_checksum;

/// Separator between a key's fixed prefix and its variable tail.
pub const KEY_SEP: char = '^';

/// Value of the populated-status key while the cache is trustworthy.
pub const POPULATED: &str = "POPULATED";

/// Value of the populated-status key while the cache must not be trusted.
pub const UNPOPULATED: &str = "UNPOPULATED";

/// Unscoped path-index key for a depot path: `path^<sha256(path)>`.
///
/// `KindConfig::extra_cache_entries` implementations return keys built here;
/// the gateway scopes them into the deployment namespace.
pub fn path_key(path: &str) -> String {
    format!("path{}{}", KEY_SEP, content_checksum(path))
}

/// The complete key layout for one Kind inside one deployment namespace.
///
/// Every key the crate reads or writes is built here, so normalization is
/// applied in exactly one place. Id normalization lower-cases only when the
/// source of truth compares identifiers case-insensitively; applying it
/// inconsistently between read and write paths makes lookups silently fail,
/// so nothing outside this type ever assembles a key by hand.
#[derive(Debug, Clone)]
pub struct KeySpace {
    /// Deployment namespace, prepended to every key when non-empty.
    namespace: String,

    /// The Kind name, e.g. `group`.
    kind: String,

    /// Prefix of primary record keys, usually equal to `kind`.
    prefix: String,

    /// Whether the source of truth treats ids case sensitively.
    case_sensitive: bool,
}

impl KeySpace {
    pub fn new(
        namespace: impl ToString,
        kind: impl ToString,
        prefix: impl ToString,
        case_sensitive: bool,
    ) -> Self {
        KeySpace {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            prefix: prefix.to_string(),
            case_sensitive,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Normalize an id the same way the source of truth compares it.
    pub fn normalize_id(&self, id: &str) -> String {
        if self.case_sensitive {
            id.to_string()
        } else {
            id.to_lowercase()
        }
    }

    fn scoped(&self, key: String) -> String {
        if self.namespace.is_empty() {
            key
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    /// Primary cache key for a record id.
    pub fn record_key(&self, id: &str) -> String {
        self.scoped(format!(
            "{}{}{}",
            self.prefix,
            KEY_SEP,
            self.normalize_id(id)
        ))
    }

    /// Pattern matching every primary cache key of this Kind.
    pub fn record_key_pattern(&self) -> String {
        self.scoped(format!("{}{}*", self.prefix, KEY_SEP))
    }

    /// Recover the normalized id from a primary cache key, if it is one.
    pub fn id_of_record_key(&self, key: &str) -> Option<String> {
        let unscoped = if self.namespace.is_empty() {
            key
        } else {
            key.strip_prefix(&format!("{}:", self.namespace))?
        };

        let tail = unscoped.strip_prefix(&format!("{}{}", self.prefix, KEY_SEP))?;
        Some(tail.to_string())
    }

    /// The Model Set: cache keys currently believed to hold valid records.
    pub fn model_set(&self) -> String {
        self.scoped(format!("{}-models", self.kind))
    }

    /// Sorted set backing prefix search.
    pub fn prefix_index_set(&self) -> String {
        self.scoped(format!("search_starts_with{}{}", KEY_SEP, self.kind))
    }

    /// Unordered set backing substring search.
    pub fn substring_index_set(&self) -> String {
        self.scoped(format!("search_includes{}{}", KEY_SEP, self.kind))
    }

    /// Sentinel key gating whether reads may trust the cache.
    pub fn populated_status_key(&self) -> String {
        self.scoped(format!("{}-populated-status", self.kind))
    }

    /// Human-readable reconciliation progress key.
    pub fn verify_status_key(&self) -> String {
        self.scoped(format!("{}-verify-status", self.kind))
    }

    /// Path-index key for a depot path, shared by all Kinds that map paths.
    pub fn path_index_key(&self, path: &str) -> String {
        self.scoped(path_key(path))
    }

    /// Scope an externally-built key (e.g. one returned by
    /// `KindConfig::extra_cache_entries`) into this namespace.
    pub fn scope_key(&self, key: &str) -> String {
        self.scoped(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyspace(case_sensitive: bool) -> KeySpace {
        KeySpace::new("", "group", "group", case_sensitive)
    }

    #[test]
    fn test_record_key_normalization() {
        let ks = keyspace(false);
        assert_eq!(ks.record_key("Eng"), "group^eng");
        assert_eq!(ks.record_key("eng"), "group^eng");

        let ks = keyspace(true);
        assert_eq!(ks.record_key("Eng"), "group^Eng");
    }

    #[test]
    fn test_id_round_trip() {
        let ks = keyspace(false);
        let key = ks.record_key("QA");
        assert_eq!(ks.id_of_record_key(&key), Some("qa".to_string()));
        assert_eq!(ks.id_of_record_key("other^qa"), None);
        assert_eq!(ks.id_of_record_key("group-models"), None);
    }

    #[test]
    fn test_namespaced_keys() {
        let ks = KeySpace::new("deploy1", "project", "project", true);
        assert_eq!(ks.record_key("p1"), "deploy1:project^p1");
        assert_eq!(ks.model_set(), "deploy1:project-models");
        assert_eq!(ks.prefix_index_set(), "deploy1:search_starts_with^project");
        assert_eq!(ks.substring_index_set(), "deploy1:search_includes^project");
        assert_eq!(ks.populated_status_key(), "deploy1:project-populated-status");
        assert_eq!(ks.verify_status_key(), "deploy1:project-verify-status");
        assert_eq!(
            ks.id_of_record_key("deploy1:project^p1"),
            Some("p1".to_string())
        );
    }

    #[test]
    fn test_path_index_key_is_stable() {
        let ks = keyspace(true);
        assert_eq!(
            ks.path_index_key("//depot/main"),
            ks.path_index_key("//depot/main")
        );
        assert_ne!(
            ks.path_index_key("//depot/main"),
            ks.path_index_key("//depot/dev")
        );
        assert!(ks.path_index_key("//depot/main").starts_with("path^"));
    }
}
