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

//! Test Kinds: a hard-deleting group Kind with nested membership, and a
//! soft-deleting project Kind with branch path indexing.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::keys::path_key;
use crate::kind_config::KindConfig;
use crate::testing::source::TestRecord;
use crate::testing::source::TestSource;
use crate::traverse::expand;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub subgroups: Vec<String>,
    /// Set when this group only exists as a project's backing storage; such
    /// groups stay out of the group search index.
    #[serde(default)]
    pub project_id: Option<String>,
}

impl TestGroup {
    pub fn new(id: impl ToString, name: impl ToString) -> Self {
        TestGroup {
            id: id.to_string(),
            name: name.to_string(),
            members: vec![],
            subgroups: vec![],
            project_id: None,
        }
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = impl ToString>) -> Self {
        self.members = members.into_iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_subgroups(mut self, subgroups: impl IntoIterator<Item = impl ToString>) -> Self {
        self.subgroups = subgroups.into_iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn backing_project(mut self, project_id: impl ToString) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }
}

impl TestRecord for TestGroup {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Group Kind: hard deletes, indexes by name, hides project-backing groups.
#[derive(Debug, Default)]
pub struct GroupKind;

impl KindConfig for GroupKind {
    type Record = TestGroup;
    type Source = TestSource<TestGroup>;

    fn kind() -> &'static str {
        "group"
    }

    fn id(record: &Self::Record) -> &str {
        &record.id
    }

    fn search_value(record: &Self::Record) -> Option<String> {
        Some(record.name.clone())
    }

    fn include_in_index(record: &Self::Record) -> bool {
        record.project_id.is_none()
    }
}

/// Flatten a group's direct and transitive membership.
///
/// Subgroup edges form an arbitrary graph (cycles included); the expansion
/// visits each group once, so the result is the member union over every
/// reachable group.
pub fn flatten_membership(groups: &BTreeMap<String, TestGroup>, root: &str) -> Vec<String> {
    let visited = expand(vec![root.to_string()], |id| {
        groups
            .get(id)
            .map(|g| g.subgroups.clone())
            .unwrap_or_default()
    });

    let mut members = BTreeSet::new();
    for id in visited {
        if let Some(group) = groups.get(&id) {
            members.extend(group.members.iter().cloned());
        }
    }
    members.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestBranch {
    pub id: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub branches: Vec<TestBranch>,
}

impl TestProject {
    pub fn new(id: impl ToString, name: impl ToString) -> Self {
        TestProject {
            id: id.to_string(),
            name: name.to_string(),
            deleted: false,
            branches: vec![],
        }
    }

    pub fn with_branch(
        mut self,
        branch_id: impl ToString,
        paths: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        self.branches.push(TestBranch {
            id: branch_id.to_string(),
            paths: paths.into_iter().map(|p| p.to_string()).collect(),
        });
        self
    }
}

impl TestRecord for TestProject {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Project Kind: soft deletes, indexes by name, and maps every branch path
/// to a path-index entry listing the branches touching it.
#[derive(Debug, Default)]
pub struct ProjectKind;

impl KindConfig for ProjectKind {
    type Record = TestProject;
    type Source = TestSource<TestProject>;

    fn kind() -> &'static str {
        "project"
    }

    fn id(record: &Self::Record) -> &str {
        &record.id
    }

    fn search_value(record: &Self::Record) -> Option<String> {
        Some(record.name.clone())
    }

    fn extra_cache_entries(record: &Self::Record) -> Vec<(String, serde_json::Value)> {
        let mut by_path: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for branch in &record.branches {
            for path in &branch.paths {
                by_path.entry(path).or_default().push(&branch.id);
            }
        }

        by_path
            .into_iter()
            .map(|(path, branch_ids)| (path_key(path), serde_json::json!(branch_ids)))
            .collect()
    }

    fn soft_deletes() -> bool {
        true
    }

    fn mark_deleted(record: &mut Self::Record) {
        record.deleted = true;
    }

    fn is_deleted(record: &Self::Record) -> bool {
        record.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_membership_with_cycle() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "eng".to_string(),
            TestGroup::new("eng", "Engineering")
                .with_members(["alice"])
                .with_subgroups(["backend"]),
        );
        groups.insert(
            "backend".to_string(),
            TestGroup::new("backend", "Backend")
                .with_members(["bob", "alice"])
                .with_subgroups(["eng"]),
        );

        let members = flatten_membership(&groups, "eng");
        assert_eq!(members, vec!["alice", "bob"]);
    }

    #[test]
    fn test_project_path_entries_group_branches_by_path() {
        let project = TestProject::new("p1", "Platform")
            .with_branch("main", ["//depot/main"])
            .with_branch("dev", ["//depot/main", "//depot/dev"]);

        let entries = ProjectKind::extra_cache_entries(&project);
        assert_eq!(entries.len(), 2);

        let main_entry = entries
            .iter()
            .find(|(key, _)| *key == path_key("//depot/main"))
            .unwrap();
        assert_eq!(main_entry.1, serde_json::json!(["main", "dev"]));
    }
}
