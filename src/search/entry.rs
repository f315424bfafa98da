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

/// Joins the two lowercase halves of an entry, and name with id inside the
/// payload. Ids must not contain it; names may, so payload decoding splits
/// from the right.
pub(crate) const HALF_SEP: char = ':';

/// Separates the matchable lowercase part of an entry from its
/// original-case payload. Unit separator, never present in user text that
/// passes validation.
pub(crate) const PAYLOAD_SEP: char = '\u{1f}';

/// Appended to a search term to form the exclusive upper bound of the
/// lexicographic range `[term, term + HIGH_SENTINEL)`: every string starting
/// with `term` sorts below it.
pub(crate) const HIGH_SENTINEL: char = char::MAX;

/// A decoded search result: the original-case id and name of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
}

/// The index entries one record produces.
pub(crate) struct EncodedEntries {
    /// The single entry for the substring set: `lowername:lowerid<payload>`.
    pub substring: String,

    /// One or two entries for the prefix set: the substring entry plus, when
    /// name and id differ after lowercasing, the halves swapped so an
    /// id-prefix query can match by range too.
    pub prefix: Vec<String>,
}

/// Build the index entries for a record's `(name, id)` pair.
///
/// Every indexable record yields exactly one substring entry and one or two
/// prefix entries; both carry the original-case `name:id` payload so either
/// match recovers the record.
pub(crate) fn encode_entries(name: &str, id: &str) -> EncodedEntries {
    let lower_name = name.to_lowercase();
    let lower_id = id.to_lowercase();

    let payload = format!("{}{}{}", name, HALF_SEP, id);

    let name_first = format!(
        "{}{}{}{}{}",
        lower_name, HALF_SEP, lower_id, PAYLOAD_SEP, payload
    );

    let mut prefix = vec![name_first.clone()];
    if lower_name != lower_id {
        let id_first = format!(
            "{}{}{}{}{}",
            lower_id, HALF_SEP, lower_name, PAYLOAD_SEP, payload
        );
        prefix.push(id_first);
    }

    EncodedEntries {
        substring: name_first,
        prefix,
    }
}

/// Recover `(id, name)` from either ordering of an entry.
///
/// The payload sits after [`PAYLOAD_SEP`] and splits at its last
/// [`HALF_SEP`], because ids never contain the separator while names may.
/// Returns `None` for strings that are not well-formed entries.
pub(crate) fn decode_entry(entry: &str) -> Option<SearchHit> {
    let (_, payload) = entry.split_once(PAYLOAD_SEP)?;
    let (name, id) = payload.rsplit_once(HALF_SEP)?;

    Some(SearchHit {
        id: id.to_string(),
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_prefix_entries_when_name_differs() {
        let entries = encode_entries("Zebras", "User1");

        assert_eq!(
            entries.substring,
            format!("zebras:user1{}Zebras:User1", PAYLOAD_SEP)
        );
        assert_eq!(entries.prefix.len(), 2);
        assert!(entries.prefix[0].starts_with("zebras:user1"));
        assert!(entries.prefix[1].starts_with("user1:zebras"));
    }

    #[test]
    fn test_single_prefix_entry_when_name_equals_id() {
        let entries = encode_entries("ENG", "eng");
        assert_eq!(entries.prefix.len(), 1);
        assert_eq!(entries.substring, format!("eng:eng{}ENG:eng", PAYLOAD_SEP));
    }

    #[test]
    fn test_decode_either_ordering() {
        let entries = encode_entries("Zebras", "User1");

        for entry in &entries.prefix {
            let hit = decode_entry(entry).unwrap();
            assert_eq!(hit.id, "User1");
            assert_eq!(hit.name, "Zebras");
        }
    }

    #[test]
    fn test_decode_name_containing_separator() {
        let entries = encode_entries("Team: Alpha", "alpha");
        let hit = decode_entry(&entries.substring).unwrap();
        assert_eq!(hit.id, "alpha");
        assert_eq!(hit.name, "Team: Alpha");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_entry("no payload separator"), None);
        assert_eq!(decode_entry(&format!("half{}nohalfsep", PAYLOAD_SEP)), None);
    }
}
