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

use std::collections::BTreeSet;
use std::collections::VecDeque;

/// Expand a graph of string ids from `roots`, visiting each node once.
///
/// `neighbors` yields the nodes reachable in one step from a node. The
/// worklist carries a visited set, so membership cycles (a group containing
/// a subgroup that contains it back) terminate: no id is expanded twice.
/// Returns the ids in visit order, roots first.
pub fn expand<I, F>(roots: I, mut neighbors: F) -> Vec<String>
where
    I: IntoIterator<Item = String>,
    F: FnMut(&str) -> Vec<String>,
{
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();
    let mut work: VecDeque<String> = roots.into_iter().collect();

    while let Some(node) = work.pop_front() {
        if !seen.insert(node.clone()) {
            continue;
        }
        work.extend(neighbors(&node));
        order.push(node);
    }

    order
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(from, to)| {
                (
                    from.to_string(),
                    to.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_expands_nested_membership() {
        let g = graph(&[("eng", &["backend", "frontend"]), ("backend", &["db"])]);

        let order = expand(vec!["eng".to_string()], |id| {
            g.get(id).cloned().unwrap_or_default()
        });

        assert_eq!(order, vec!["eng", "backend", "frontend", "db"]);
    }

    #[test]
    fn test_cycle_terminates_and_visits_once() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a", "b"])]);

        let mut expanded = Vec::new();
        let order = expand(vec!["a".to_string()], |id| {
            expanded.push(id.to_string());
            g.get(id).cloned().unwrap_or_default()
        });

        assert_eq!(order, vec!["a", "b", "c"]);
        // Each node expanded exactly once despite the a->b->c->a cycle.
        assert_eq!(expanded, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_roots_collapse() {
        let order = expand(
            vec!["x".to_string(), "x".to_string()],
            |_| vec![],
        );
        assert_eq!(order, vec!["x"]);
    }
}
