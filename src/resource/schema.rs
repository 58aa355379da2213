//! Resource type hierarchy index
//!
//! Turns the flat `type path -> api versions` snapshot into a navigable
//! hierarchy. Every entry is reachable by its full uppercased path, and every
//! entry whose parent type is also in the snapshot is linked into that
//! parent's children under its last path segment.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Flat snapshot as shipped: full type path to ordered api versions
pub type SchemaSnapshot = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
struct SchemaNode {
    path: String,
    versions: Vec<String>,
    children: BTreeMap<String, usize>,
}

/// Immutable resource type hierarchy, safe to share across crawl tasks.
#[derive(Debug, Clone, Default)]
pub struct SchemaTree {
    nodes: Vec<SchemaNode>,
    index: HashMap<String, usize>,
}

/// A borrowed view of one node in a [`SchemaTree`]
#[derive(Debug, Clone, Copy)]
pub struct SchemaEntry<'a> {
    tree: &'a SchemaTree,
    node: usize,
}

impl PartialEq for SchemaEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.node == other.node
    }
}

impl<'a> SchemaEntry<'a> {
    fn inner(&self) -> &'a SchemaNode {
        &self.tree.nodes[self.node]
    }

    /// Uppercased full type path
    pub fn path(&self) -> &'a str {
        &self.inner().path
    }

    pub fn versions(&self) -> &'a [String] {
        &self.inner().versions
    }

    /// The last listed version. No semantic ordering is applied: the
    /// snapshot is expected to be sorted upstream.
    pub fn latest_version(&self) -> Option<&'a str> {
        self.inner().versions.last().map(String::as_str)
    }

    /// Direct children keyed by their uppercased last segment
    pub fn children(&self) -> impl Iterator<Item = (&'a str, SchemaEntry<'a>)> + 'a {
        let tree = self.tree;
        self.inner()
            .children
            .iter()
            .map(move |(name, &node)| (name.as_str(), SchemaEntry { tree, node }))
    }

    pub fn child(&self, name: &str) -> Option<SchemaEntry<'a>> {
        self.inner()
            .children
            .get(&name.to_uppercase())
            .map(|&node| SchemaEntry {
                tree: self.tree,
                node,
            })
    }
}

impl SchemaTree {
    /// Build the hierarchy from a flat snapshot.
    ///
    /// Fails without building anything if a type path has fewer than two
    /// segments or no api versions.
    pub fn build(snapshot: SchemaSnapshot) -> Result<Self> {
        let mut remaining = normalize_trailing_slashes(snapshot);

        for (rt, versions) in &remaining {
            let segs: Vec<&str> = rt.split('/').collect();
            if segs.len() < 2 || segs.iter().any(|s| s.is_empty()) {
                return Err(Error::schema(format!("malformed resource type: {rt}")));
            }
            if versions.is_empty() {
                return Err(Error::schema(format!("no api versions for resource type: {rt}")));
            }
        }

        let mut tree = SchemaTree::default();
        let mut level = 2;

        // Each level is a self-contained batch whose parents were all created
        // by the previous batch, so the result does not depend on input order.
        while !remaining.is_empty() {
            let batch: Vec<String> = remaining
                .keys()
                .filter(|rt| rt.split('/').count() == level)
                .cloned()
                .collect();

            for rt in batch {
                let Some(versions) = remaining.remove(&rt) else {
                    continue;
                };
                // Casing is not consistent between parent and child types in the snapshot
                let upper = rt.to_uppercase();
                let segs: Vec<&str> = upper.split('/').collect();
                let parent_path = segs[..level - 1].join("/");
                let child_name = segs[level - 1].to_string();

                let node = match tree.index.get(&upper) {
                    // Two keys differing only in case collapse into one node
                    Some(&existing) => {
                        let versions = merge_versions(&tree.nodes[existing].versions, &versions);
                        tree.nodes[existing].versions = versions;
                        existing
                    }
                    None => {
                        tree.nodes.push(SchemaNode {
                            path: upper.clone(),
                            versions,
                            children: BTreeMap::new(),
                        });
                        let node = tree.nodes.len() - 1;
                        tree.index.insert(upper.clone(), node);
                        node
                    }
                };

                // Parent types are not guaranteed to be in the snapshot
                if let Some(&parent) = tree.index.get(&parent_path) {
                    tree.nodes[parent].children.insert(child_name, node);
                }
            }

            level += 1;
        }

        tracing::debug!("Schema tree built with {} resource types", tree.len());
        Ok(tree)
    }

    /// Parse a JSON snapshot and build the hierarchy
    pub fn from_json(content: &str) -> Result<Self> {
        let snapshot: SchemaSnapshot = serde_json::from_str(content)?;
        Self::build(snapshot)
    }

    /// Load the snapshot file at `path` and build the hierarchy
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("reading schema snapshot {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Look up an entry by type path, case-insensitively; a leading `/` is ignored
    pub fn get(&self, type_path: &str) -> Option<SchemaEntry<'_>> {
        let key = type_path.trim_start_matches('/').to_uppercase();
        self.index
            .get(&key)
            .map(|&node| SchemaEntry { tree: self, node })
    }

    pub fn contains(&self, type_path: &str) -> bool {
        self.get(type_path).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All entries in path order
    pub fn entries(&self) -> impl Iterator<Item = SchemaEntry<'_>> + '_ {
        let mut ordered: Vec<(&String, &usize)> = self.index.iter().collect();
        ordered.sort();
        ordered
            .into_iter()
            .map(move |(_, &node)| SchemaEntry { tree: self, node })
    }
}

/// Merge legacy keys with a trailing slash (e.g. `Microsoft.Network/publicIPAddresses/`)
/// into their canonical key.
fn normalize_trailing_slashes(mut snapshot: SchemaSnapshot) -> SchemaSnapshot {
    let legacy: Vec<String> = snapshot
        .keys()
        .filter(|rt| rt.ends_with('/'))
        .cloned()
        .collect();

    for rt in legacy {
        let Some(versions) = snapshot.remove(&rt) else {
            continue;
        };
        let canonical = rt.trim_end_matches('/').to_string();
        let merged = match snapshot.get(&canonical) {
            Some(existing) => merge_versions(existing, &versions),
            None => versions,
        };
        snapshot.insert(canonical, merged);
    }

    snapshot
}

fn merge_versions(a: &[String], b: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = a.iter().chain(b).cloned().collect();
    merged.sort();
    merged.dedup();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(&str, &[&str])]) -> SchemaSnapshot {
        entries
            .iter()
            .map(|(rt, versions)| {
                (
                    rt.to_string(),
                    versions.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_build_links_children() {
        let tree = SchemaTree::build(snapshot(&[
            ("Microsoft.Network/virtualnetworks", &["v1", "v2"]),
            ("Microsoft.Network/virtualnetworks/subnets", &["v1", "v2"]),
            ("Microsoft.Network/virtualnetworks/subnets/foos", &["v1", "v2"]),
        ]))
        .unwrap();

        assert_eq!(tree.len(), 3);
        let vnet = tree.get("MICROSOFT.NETWORK/VIRTUALNETWORKS").unwrap();
        let subnet = vnet.child("SUBNETS").unwrap();
        assert_eq!(
            subnet,
            tree.get("MICROSOFT.NETWORK/VIRTUALNETWORKS/SUBNETS").unwrap()
        );
        assert_eq!(subnet.versions(), &["v1".to_string(), "v2".to_string()]);
        assert_eq!(subnet.latest_version(), Some("v2"));

        let foos = subnet.child("foos").unwrap();
        assert_eq!(foos.path(), "MICROSOFT.NETWORK/VIRTUALNETWORKS/SUBNETS/FOOS");
        assert_eq!(foos.children().count(), 0);
        assert_eq!(vnet.children().map(|(k, _)| k).collect::<Vec<_>>(), vec!["SUBNETS"]);
    }

    #[test]
    fn test_parent_missing_from_snapshot() {
        let tree = SchemaTree::build(snapshot(&[
            ("Microsoft.ExtendedLocation/customLocations", &["v1", "v2"]),
            ("Microsoft.ExtendedLocation/customLocations/resourceSyncRules", &["v1", "v2"]),
            ("Microsoft.Capacity/resourceProviders/locations/serviceLimits", &["v1"]),
        ]))
        .unwrap();

        assert_eq!(tree.len(), 3);
        assert!(tree.get("MICROSOFT.CAPACITY/RESOURCEPROVIDERS").is_none());
        let limits = tree
            .get("/Microsoft.Capacity/resourceProviders/locations/serviceLimits")
            .unwrap();
        assert_eq!(limits.latest_version(), Some("v1"));
        assert!(tree
            .get("MICROSOFT.EXTENDEDLOCATION/CUSTOMLOCATIONS")
            .unwrap()
            .child("RESOURCESYNCRULES")
            .is_some());
    }

    #[test]
    fn test_single_segment_is_rejected() {
        let err = SchemaTree::build(snapshot(&[("Foo", &["v1"])])).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_empty_versions_rejected() {
        let err = SchemaTree::build(snapshot(&[("Foo/bars", &[])])).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_trailing_slash_merged() {
        let tree = SchemaTree::build(snapshot(&[
            ("Microsoft.Network/publicIPAddresses", &["2020-01-01", "2022-01-01"]),
            ("Microsoft.Network/publicIPAddresses/", &["2021-01-01", "2022-01-01"]),
        ]))
        .unwrap();

        assert_eq!(tree.len(), 1);
        let entry = tree.get("microsoft.network/publicipaddresses").unwrap();
        assert_eq!(
            entry.versions(),
            &["2020-01-01".to_string(), "2021-01-01".to_string(), "2022-01-01".to_string()]
        );
    }

    #[test]
    fn test_trailing_slash_only_single_segment_rejected() {
        let err = SchemaTree::build(snapshot(&[("Foo/", &["v1"])])).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_latest_version_is_last_element() {
        let tree = SchemaTree::build(snapshot(&[("A/b", &["2023-01-01", "2019-01-01"])])).unwrap();
        assert_eq!(tree.get("A/B").unwrap().latest_version(), Some("2019-01-01"));
    }

    #[test]
    fn test_from_json() {
        let tree = SchemaTree::from_json(
            r#"{"Microsoft.Network/virtualnetworks": ["v1"], "Microsoft.Network/virtualnetworks/subnets": ["v1"]}"#,
        )
        .unwrap();
        assert_eq!(tree.entries().map(|e| e.path()).collect::<Vec<_>>(), vec![
            "MICROSOFT.NETWORK/VIRTUALNETWORKS",
            "MICROSOFT.NETWORK/VIRTUALNETWORKS/SUBNETS",
        ]);
        assert!(SchemaTree::from_json("[]").is_err());
    }
}
