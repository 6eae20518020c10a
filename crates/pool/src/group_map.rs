// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexPool.
//
// PlexPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexPool. If not, see <https://www.gnu.org/licenses/>.

//! Name-keyed group storage.
//!
//! A thin wrapper over `BTreeMap` providing exactly the operations the
//! orchestrator needs: keyed insert/remove/lookup, stable traversal, and
//! `pick_any` to drive one-at-a-time destruction. Iteration order is an
//! implementation detail and not observable through the pool surface.

use std::collections::BTreeMap;

use crate::group::Group;

#[derive(Default)]
pub(crate) struct GroupMap {
    groups: BTreeMap<String, Group>,
}

impl GroupMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a group under its own name, replacing any previous entry.
    pub fn insert(&mut self, group: Group) -> Option<Group> {
        self.groups.insert(group.name().to_string(), group)
    }

    pub fn remove(&mut self, name: &str) -> Option<Group> {
        self.groups.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.groups.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Any group's name; which one is unspecified.
    pub fn pick_any(&self) -> Option<&str> {
        self.groups.keys().next().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Group> {
        self.groups.values_mut()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexpool_core::Options;

    fn group(name: &str) -> Group {
        Group::new(&Options::for_app_group(name))
    }

    #[test]
    fn insert_lookup_remove() {
        let mut map = GroupMap::new();
        assert!(map.is_empty());

        map.insert(group("a"));
        map.insert(group("b"));
        assert_eq!(map.len(), 2);
        assert!(map.contains("a"));
        assert_eq!(map.get("b").unwrap().name(), "b");

        let removed = map.remove("a").unwrap();
        assert_eq!(removed.name(), "a");
        assert!(!map.contains("a"));
        assert!(map.get("a").is_none());
    }

    #[test]
    fn insert_same_name_replaces() {
        let mut map = GroupMap::new();
        let first_secret = {
            let g = group("a");
            let secret = g.secret().to_string();
            map.insert(g);
            secret
        };
        let replaced = map.insert(group("a"));
        assert_eq!(replaced.unwrap().secret(), first_secret);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn pick_any_drains_the_map() {
        let mut map = GroupMap::new();
        for name in ["a", "b", "c"] {
            map.insert(group(name));
        }

        let mut picked = Vec::new();
        while let Some(name) = map.pick_any().map(str::to_string) {
            picked.push(name.clone());
            map.remove(&name);
        }
        picked.sort();
        assert_eq!(picked, vec!["a", "b", "c"]);
        assert!(map.is_empty());
    }
}
