//! Presentation-neutral chooser content: what the proposal popup shows.
//!
//! Rendering is out of scope; these models carry the selection and accept
//! semantics the controller needs: flat candidate lists for plain fields,
//! parent-keyed trees for hierarchical browsing.

use fieldkit_lookup::{LookupKey, LookupRow};

/// Content of an open proposal chooser.
#[derive(Debug, Clone)]
pub enum ChooserContent<K> {
    Table(TableChooserContent<K>),
    Tree(TreeChooserContent<K>),
}

impl<K: LookupKey> ChooserContent<K> {
    pub fn row_count(&self) -> usize {
        match self {
            ChooserContent::Table(table) => table.rows().len(),
            ChooserContent::Tree(tree) => tree.visible().len(),
        }
    }

    pub fn selected_row(&self) -> Option<&LookupRow<K>> {
        match self {
            ChooserContent::Table(table) => table.selected_row(),
            ChooserContent::Tree(tree) => tree.selected_row(),
        }
    }
}

/// Flat table of candidate rows.
#[derive(Debug, Clone)]
pub struct TableChooserContent<K> {
    rows: Vec<LookupRow<K>>,
    selected: Option<usize>,
    /// More rows exist than the configured limit allows to show.
    overflow: bool,
}

impl<K: LookupKey> TableChooserContent<K> {
    /// Builds the table from fetched rows, trimming the overflow-detection
    /// surplus row when the configured limit was exceeded.
    pub fn new(mut rows: Vec<LookupRow<K>>, configured_max: usize) -> Self {
        let overflow = configured_max > 0 && rows.len() > configured_max;
        if overflow {
            rows.truncate(configured_max);
        }
        Self {
            rows,
            selected: None,
            overflow,
        }
    }

    pub fn rows(&self) -> &[LookupRow<K>] {
        &self.rows
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    /// Selects a row by index; out-of-range clears the selection.
    pub fn select(&mut self, index: usize) {
        self.selected = (index < self.rows.len()).then_some(index);
    }

    /// Selects the row denoting the given committed value, if present.
    pub fn select_key(&mut self, key: Option<&K>) {
        self.selected = self.rows.iter().position(|row| row.matches_key(key));
    }

    pub fn selected_row(&self) -> Option<&LookupRow<K>> {
        self.selected.and_then(|index| self.rows.get(index))
    }

    /// The row an accept gesture would commit: the selected row, enabled
    /// rows only.
    pub fn accepted_row(&self) -> Option<&LookupRow<K>> {
        self.selected_row().filter(|row| row.enabled)
    }
}

/// One node of a hierarchical chooser.
#[derive(Debug, Clone)]
pub struct TreeNode<K> {
    pub row: LookupRow<K>,
    pub children: Vec<TreeNode<K>>,
}

/// Tree of candidate rows, built from `parent_key` chains.
///
/// Depth here is semantic: roots are at depth 0. A rendering tree usually
/// adds one synthetic invisible root above them, so its depths are off by
/// one from what the accept predicate sees.
#[derive(Debug, Clone)]
pub struct TreeChooserContent<K> {
    nodes: Vec<TreeNode<K>>,
    selected_key: Option<K>,
}

impl<K: LookupKey> TreeChooserContent<K> {
    /// Builds the tree. A row becomes a root when it has no parent key or
    /// its parent is not part of the row set.
    pub fn from_rows(rows: Vec<LookupRow<K>>) -> Self {
        let keys: Vec<K> = rows.iter().filter_map(|row| row.key.clone()).collect();
        let mut pool: Vec<LookupRow<K>> = Vec::new();
        let mut root_rows: Vec<LookupRow<K>> = Vec::new();
        for row in rows {
            let is_root = match &row.parent_key {
                None => true,
                Some(parent) => !keys.iter().any(|key| key == parent),
            };
            if is_root {
                root_rows.push(row);
            } else {
                pool.push(row);
            }
        }
        let nodes = root_rows
            .into_iter()
            .map(|row| Self::grow(row, &mut pool))
            .collect();
        Self {
            nodes,
            selected_key: None,
        }
    }

    fn grow(row: LookupRow<K>, pool: &mut Vec<LookupRow<K>>) -> TreeNode<K> {
        let mut child_rows = Vec::new();
        if let Some(key) = row.key.clone() {
            let mut i = 0;
            while i < pool.len() {
                if pool[i].parent_key.as_ref() == Some(&key) {
                    child_rows.push(pool.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        let children = child_rows
            .into_iter()
            .map(|child| Self::grow(child, pool))
            .collect();
        TreeNode { row, children }
    }

    pub fn roots(&self) -> &[TreeNode<K>] {
        &self.nodes
    }

    /// Filter pass during matching-text browsing.
    ///
    /// The accept predicate is keyed by (row key, depth, is-leaf); a node is
    /// kept when the predicate accepts it or any descendant survives, so
    /// non-matching ancestor chains stay visible for a matching descendant.
    /// `is_leaf` reflects the tree before filtering.
    pub fn retain_matching<F>(&mut self, accept: &F)
    where
        F: Fn(Option<&K>, usize, bool) -> bool,
    {
        Self::retain_nodes(&mut self.nodes, 0, accept);
    }

    fn retain_nodes<F>(nodes: &mut Vec<TreeNode<K>>, depth: usize, accept: &F) -> bool
    where
        F: Fn(Option<&K>, usize, bool) -> bool,
    {
        nodes.retain_mut(|node| {
            let is_leaf = node.children.is_empty();
            let descendant_kept = Self::retain_nodes(&mut node.children, depth + 1, accept);
            accept(node.row.key.as_ref(), depth, is_leaf) || descendant_kept
        });
        !nodes.is_empty()
    }

    /// Depth-first flattening: (row, semantic depth) in display order.
    pub fn visible(&self) -> Vec<(&LookupRow<K>, usize)> {
        let mut out = Vec::new();
        fn walk<'a, K>(nodes: &'a [TreeNode<K>], depth: usize, out: &mut Vec<(&'a LookupRow<K>, usize)>) {
            for node in nodes {
                out.push((&node.row, depth));
                walk(&node.children, depth + 1, out);
            }
        }
        walk(&self.nodes, 0, &mut out);
        out
    }

    pub fn select_key(&mut self, key: Option<K>) {
        self.selected_key = key;
    }

    pub fn selected_row(&self) -> Option<&LookupRow<K>> {
        let key = self.selected_key.as_ref()?;
        self.visible()
            .into_iter()
            .map(|(row, _)| row)
            .find(|row| row.key.as_ref() == Some(key))
    }
}
