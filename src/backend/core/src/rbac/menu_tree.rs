//! Navigable menu tree built from an effective permission set.
//!
//! # Usage
//!
//! ```rust,ignore
//! let tree = MenuTreeBuilder::new(&snapshot).build_tree(&effective);
//! for root in tree.roots() {
//!     println!("{} ({} children)", root.key(), root.children_count());
//!     for child in root.children() {
//!         println!("  {}", child.key());
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::models::{MenuKey, MenuLevel, MenuModule};
use super::permission::EffectivePermissionSet;
use super::snapshot::ConfigSnapshot;

/// Builds [`MenuTree`]s from the menu catalog of a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MenuTreeBuilder<'a> {
    snapshot: &'a ConfigSnapshot,
}

impl<'a> MenuTreeBuilder<'a> {
    pub fn new(snapshot: &'a ConfigSnapshot) -> Self {
        Self { snapshot }
    }

    /// Select the active modules in `set`, order siblings by
    /// `(sort_order, key)` and nest them through their `group` attribute.
    ///
    /// A module whose enclosing module is not itself selected cannot be
    /// reached and is left out of the tree.
    pub fn build_tree(&self, set: &EffectivePermissionSet) -> MenuTree {
        let mut selected: Vec<&MenuModule> = set
            .iter()
            .filter_map(|key| self.snapshot.menu(key))
            .filter(|m| m.active)
            .collect();
        selected.sort_by(|a, b| (a.sort_order, &a.key).cmp(&(b.sort_order, &b.key)));

        let mut roots = Vec::new();
        let mut children: BTreeMap<MenuKey, Vec<MenuModule>> = BTreeMap::new();
        for module in &selected {
            match (&module.level, &module.group) {
                (MenuLevel::Root, _) => roots.push((*module).clone()),
                (_, Some(group)) => children
                    .entry(group.clone())
                    .or_default()
                    .push((*module).clone()),
                (_, None) => {}
            }
        }

        let mut tree = MenuTree { roots, children };
        tree.prune_unreachable();
        tree
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tree
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered menu tree. Nodes borrow from the tree and iterate lazily.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuTree {
    roots: Vec<MenuModule>,
    children: BTreeMap<MenuKey, Vec<MenuModule>>,
}

impl MenuTree {
    /// Iterate the root nodes. Each call starts from the beginning.
    pub fn roots(&self) -> MenuNodes<'_> {
        MenuNodes {
            tree: self,
            inner: self.roots.iter(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of reachable modules in the tree.
    pub fn node_count(&self) -> usize {
        self.roots.len() + self.children.values().map(Vec::len).sum::<usize>()
    }

    /// Owned, serializable rendering of the tree.
    pub fn to_view(&self) -> Vec<MenuNodeView> {
        self.roots().map(|node| node.to_view()).collect()
    }

    fn children_of(&self, key: &MenuKey) -> &[MenuModule] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop child lists whose parent is not reachable from a root.
    fn prune_unreachable(&mut self) {
        let mut reachable: Vec<MenuKey> = self.roots.iter().map(|m| m.key.clone()).collect();
        let mut i = 0;
        while i < reachable.len() {
            let next: Vec<MenuKey> = self
                .children_of(&reachable[i])
                .iter()
                .map(|m| m.key.clone())
                .collect();
            reachable.extend(next);
            i += 1;
        }
        self.children.retain(|parent, _| reachable.contains(parent));
    }
}

/// Restartable, lazy iterator over sibling nodes.
#[derive(Debug, Clone)]
pub struct MenuNodes<'a> {
    tree: &'a MenuTree,
    inner: std::slice::Iter<'a, MenuModule>,
}

impl<'a> Iterator for MenuNodes<'a> {
    type Item = MenuNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|module| MenuNode {
            tree: self.tree,
            module,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MenuNodes<'_> {}

/// A node in a [`MenuTree`].
#[derive(Debug, Clone, Copy)]
pub struct MenuNode<'a> {
    tree: &'a MenuTree,
    module: &'a MenuModule,
}

impl<'a> MenuNode<'a> {
    pub fn module(&self) -> &'a MenuModule {
        self.module
    }

    pub fn key(&self) -> &'a MenuKey {
        &self.module.key
    }

    pub fn children_count(&self) -> usize {
        self.tree.children_of(&self.module.key).len()
    }

    pub fn children(&self) -> MenuNodes<'a> {
        MenuNodes {
            tree: self.tree,
            inner: self.tree.children_of(&self.module.key).iter(),
        }
    }

    pub fn to_view(&self) -> MenuNodeView {
        MenuNodeView {
            key: self.module.key.clone(),
            name: self.module.name.clone(),
            level: self.module.level,
            icon: self.module.icon.clone(),
            url: self.module.url.clone(),
            sort_order: self.module.sort_order,
            children: self.children().map(|child| child.to_view()).collect(),
        }
    }
}

/// Owned node for HTTP and CLI output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNodeView {
    pub key: MenuKey,
    pub name: String,
    pub level: MenuLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub sort_order: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuNodeView>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
