//! In-memory lazily expanded tree.
//!
//! [`LazyTreeModel`] stores nodes by key with ordered child rows, where a
//! child row is either a node or the loading placeholder of its parent. It
//! implements [`TreeView`], so it can back a [`TreeExpander`](crate::TreeExpander)
//! directly, and records every mutation as a [`TreeChange`] for a UI layer (or
//! a test) to replay. The change log is bounded: once it holds
//! [`DEFAULT_CHANGE_CAPACITY`] entries the oldest ones are dropped, so a
//! consumer should drain it with [`LazyTreeModel::take_changes`].
//!
//! # Example
//!
//! ```
//! use loadpulse::{LazyTreeModel, TreeRow};
//!
//! let model = LazyTreeModel::<String>::new();
//! model.add_root("postgres".to_string()).unwrap();
//! model.add_child(&"postgres".to_string(), "public".to_string()).unwrap();
//!
//! assert_eq!(
//!     model.children(&"postgres".to_string()),
//!     vec![TreeRow::Node("public".to_string())]
//! );
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use loadpulse_core::ExpansionPlaceholder;

use crate::LOG_TARGET;
use crate::view::{TreeNodeData, TreeRow, TreeView, ViewError};

/// Number of changes a [`LazyTreeModel`] keeps by default.
pub const DEFAULT_CHANGE_CAPACITY: usize = 4096;

/// A mutation applied to a [`LazyTreeModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange<K> {
    /// `count` rows were appended under `parent` (`None` for the root level).
    RowsInserted {
        /// The parent key.
        parent: Option<K>,
        /// Number of rows appended.
        count: usize,
    },
    /// A loading placeholder was shown under the key.
    PlaceholderInserted(K),
    /// The row and its subtree were removed.
    RowRemoved(TreeRow<K>),
    /// The row was repainted.
    RowRedrawn(TreeRow<K>),
    /// Redraw was suspended.
    RedrawSuspended,
    /// Redraw was resumed.
    RedrawResumed,
    /// Every row was removed.
    Cleared,
}

/// A node in the tree structure.
struct TreeNode<N: TreeNodeData> {
    data: N,
    parent: Option<N::Key>,
    children: Vec<TreeRow<N::Key>>,
}

/// Internal storage for tree nodes.
struct TreeStorage<N: TreeNodeData> {
    nodes: HashMap<N::Key, TreeNode<N>>,
    roots: Vec<N::Key>,
    placeholders: HashMap<N::Key, Arc<ExpansionPlaceholder<N::Key>>>,
}

impl<N: TreeNodeData> TreeStorage<N> {
    fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            placeholders: HashMap::new(),
        }
    }

    fn insert(&mut self, parent: Option<&N::Key>, data: N) -> Result<N::Key, ViewError> {
        let key = data.key();
        if self.nodes.contains_key(&key) {
            return Err(ViewError::duplicate_key(&key));
        }
        match parent {
            Some(parent_key) => self
                .nodes
                .get_mut(parent_key)
                .ok_or_else(|| ViewError::unknown_parent(parent_key))?
                .children
                .push(TreeRow::Node(key.clone())),
            None => self.roots.push(key.clone()),
        }
        self.nodes.insert(
            key.clone(),
            TreeNode {
                data,
                parent: parent.cloned(),
                children: Vec::new(),
            },
        );
        Ok(key)
    }

    fn contains(&self, row: &TreeRow<N::Key>) -> bool {
        match row {
            TreeRow::Node(key) => self.nodes.contains_key(key),
            TreeRow::Placeholder(key) => self.placeholders.contains_key(key),
        }
    }

    fn parent_of(&self, row: &TreeRow<N::Key>) -> Option<N::Key> {
        match row {
            TreeRow::Node(key) => self.nodes.get(key)?.parent.clone(),
            TreeRow::Placeholder(key) => self
                .nodes
                .get(key)
                .filter(|node| node.children.contains(row))
                .map(|_| key.clone()),
        }
    }

    fn children_of(&self, parent: &N::Key) -> &[TreeRow<N::Key>] {
        self.nodes
            .get(parent)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Detach `row` from its parent and drop it with its subtree.
    fn remove_row(&mut self, row: &TreeRow<N::Key>) -> Option<Option<N>> {
        if !self.contains(row) {
            return None;
        }
        match self.parent_of(row) {
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.retain(|child| child != row);
                }
            }
            None => {
                if let TreeRow::Node(key) = row {
                    self.roots.retain(|root| root != key);
                }
            }
        }
        Some(self.remove_subtree(row))
    }

    fn remove_subtree(&mut self, row: &TreeRow<N::Key>) -> Option<N> {
        match row {
            TreeRow::Placeholder(key) => {
                self.placeholders.remove(key);
                None
            }
            TreeRow::Node(key) => {
                let node = self.nodes.remove(key)?;
                for child in &node.children {
                    self.remove_subtree(child);
                }
                Some(node.data)
            }
        }
    }
}

/// Redraw bookkeeping and the change log.
struct Journal<K> {
    suspended: usize,
    redraws: HashMap<TreeRow<K>, usize>,
    changes: VecDeque<TreeChange<K>>,
    capacity: usize,
}

impl<K> Journal<K> {
    fn push(&mut self, change: TreeChange<K>) {
        if self.capacity == 0 {
            return;
        }
        if self.changes.len() == self.capacity {
            self.changes.pop_front();
        }
        self.changes.push_back(change);
    }
}

/// An in-memory tree whose children can be loaded lazily.
///
/// All methods take `&self`; storage sits behind a `RwLock` so the model can
/// be shared through an `Arc` with the expander that fills it.
pub struct LazyTreeModel<N: TreeNodeData> {
    storage: RwLock<TreeStorage<N>>,
    journal: Mutex<Journal<N::Key>>,
}

impl<N: TreeNodeData> LazyTreeModel<N> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::with_change_capacity(DEFAULT_CHANGE_CAPACITY)
    }

    /// Create an empty tree keeping at most `capacity` changes.
    pub fn with_change_capacity(capacity: usize) -> Self {
        Self {
            storage: RwLock::new(TreeStorage::new()),
            journal: Mutex::new(Journal {
                suspended: 0,
                redraws: HashMap::new(),
                changes: VecDeque::new(),
                capacity,
            }),
        }
    }

    fn record(&self, change: TreeChange<N::Key>) {
        self.journal.lock().push(change);
    }

    /// Record a removal and forget the redraw counters of rows that are gone.
    fn record_removal(&self, row: TreeRow<N::Key>) {
        let storage = self.storage.read();
        let mut journal = self.journal.lock();
        journal.redraws.retain(|counted, _| storage.contains(counted));
        journal.push(TreeChange::RowRemoved(row));
    }

    /// Add a root-level node. Returns its key.
    pub fn add_root(&self, data: N) -> Result<N::Key, ViewError> {
        let key = self.storage.write().insert(None, data)?;
        self.record(TreeChange::RowsInserted {
            parent: None,
            count: 1,
        });
        Ok(key)
    }

    /// Add a node under `parent`. Returns its key.
    pub fn add_child(&self, parent: &N::Key, data: N) -> Result<N::Key, ViewError> {
        let key = self.storage.write().insert(Some(parent), data)?;
        self.record(TreeChange::RowsInserted {
            parent: Some(parent.clone()),
            count: 1,
        });
        Ok(key)
    }

    /// Remove a node and its subtree. Returns the node's data.
    pub fn remove(&self, key: &N::Key) -> Option<N> {
        let row = TreeRow::Node(key.clone());
        let removed = self.storage.write().remove_row(&row)?;
        self.record_removal(row);
        removed
    }

    /// Remove every node.
    pub fn clear(&self) {
        {
            let mut storage = self.storage.write();
            storage.nodes.clear();
            storage.roots.clear();
            storage.placeholders.clear();
        }
        let mut journal = self.journal.lock();
        journal.redraws.clear();
        journal.push(TreeChange::Cleared);
    }

    /// Whether a node with `key` exists.
    pub fn contains_key(&self, key: &N::Key) -> bool {
        self.storage.read().nodes.contains_key(key)
    }

    /// Number of nodes, placeholders excluded.
    pub fn len(&self) -> usize {
        self.storage.read().nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.storage.read().nodes.is_empty()
    }

    /// Keys of the root-level nodes, in order.
    pub fn roots(&self) -> Vec<N::Key> {
        self.storage.read().roots.clone()
    }

    /// Child rows of `parent`, in order.
    pub fn children(&self, parent: &N::Key) -> Vec<TreeRow<N::Key>> {
        self.storage.read().children_of(parent).to_vec()
    }

    /// Number of child rows of `parent`, placeholders included.
    pub fn child_count(&self, parent: &N::Key) -> usize {
        self.storage.read().children_of(parent).len()
    }

    /// The text of every child row of `parent`, as it would be displayed.
    pub fn child_labels(&self, parent: &N::Key) -> Vec<String> {
        let storage = self.storage.read();
        storage
            .children_of(parent)
            .iter()
            .filter_map(|row| match row {
                TreeRow::Node(key) => storage.nodes.get(key).map(|node| node.data.label()),
                TreeRow::Placeholder(key) => storage
                    .placeholders
                    .get(key)
                    .map(|placeholder| placeholder.label().to_string()),
            })
            .collect()
    }

    /// Read access to a node's data.
    pub fn with_node<F, R>(&self, key: &N::Key, f: F) -> Option<R>
    where
        F: FnOnce(&N) -> R,
    {
        self.storage.read().nodes.get(key).map(|node| f(&node.data))
    }

    /// The placeholder shown under `key`, if any.
    pub fn placeholder(&self, key: &N::Key) -> Option<Arc<ExpansionPlaceholder<N::Key>>> {
        self.storage.read().placeholders.get(key).cloned()
    }

    /// Whether redraw is currently suspended.
    pub fn is_redraw_suspended(&self) -> bool {
        self.journal.lock().suspended > 0
    }

    /// How many times `row` was repainted.
    pub fn redraw_count(&self, row: &TreeRow<N::Key>) -> usize {
        self.journal.lock().redraws.get(row).copied().unwrap_or(0)
    }

    /// A copy of the change log, oldest first.
    pub fn changes(&self) -> Vec<TreeChange<N::Key>> {
        self.journal.lock().changes.iter().cloned().collect()
    }

    /// Drain the change log, oldest first.
    pub fn take_changes(&self) -> Vec<TreeChange<N::Key>> {
        self.journal.lock().changes.drain(..).collect()
    }
}

impl<N: TreeNodeData> Default for LazyTreeModel<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: TreeNodeData> std::fmt::Debug for LazyTreeModel<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.read();
        f.debug_struct("LazyTreeModel")
            .field("nodes", &storage.nodes.len())
            .field("placeholders", &storage.placeholders.len())
            .finish()
    }
}

impl<N: TreeNodeData> TreeView<N> for LazyTreeModel<N> {
    fn contains(&self, row: &TreeRow<N::Key>) -> bool {
        self.storage.read().contains(row)
    }

    fn parent_of(&self, row: &TreeRow<N::Key>) -> Option<N::Key> {
        self.storage.read().parent_of(row)
    }

    fn insert_children(&self, parent: &N::Key, children: Vec<N>) -> Result<usize, ViewError> {
        let count = children.len();
        {
            let mut storage = self.storage.write();
            if !storage.nodes.contains_key(parent) {
                return Err(ViewError::unknown_parent(parent));
            }
            // Validate the whole batch so a failure leaves the tree untouched.
            let mut batch = HashSet::with_capacity(count);
            for child in &children {
                let key = child.key();
                if storage.nodes.contains_key(&key) || !batch.insert(key.clone()) {
                    return Err(ViewError::duplicate_key(&key));
                }
            }
            for child in children {
                storage.insert(Some(parent), child)?;
            }
        }
        self.record(TreeChange::RowsInserted {
            parent: Some(parent.clone()),
            count,
        });
        Ok(count)
    }

    fn insert_placeholder(
        &self,
        placeholder: Arc<ExpansionPlaceholder<N::Key>>,
    ) -> Result<(), ViewError> {
        let key = placeholder.key().clone();
        if placeholder.is_disposed() {
            tracing::debug!(target: LOG_TARGET, ?key, "placeholder already disposed, not shown");
            return Ok(());
        }
        {
            let mut storage = self.storage.write();
            let row = TreeRow::Placeholder(key.clone());
            let node = storage
                .nodes
                .get_mut(&key)
                .ok_or_else(|| ViewError::unknown_parent(&key))?;
            if !node.children.contains(&row) {
                node.children.push(row);
            }
            storage.placeholders.insert(key.clone(), placeholder);
        }
        self.record(TreeChange::PlaceholderInserted(key));
        Ok(())
    }

    fn remove_row(&self, row: &TreeRow<N::Key>) -> bool {
        let removed = self.storage.write().remove_row(row).is_some();
        if removed {
            self.record_removal(row.clone());
        }
        removed
    }

    fn redraw_row(&self, row: &TreeRow<N::Key>) {
        let mut journal = self.journal.lock();
        *journal.redraws.entry(row.clone()).or_default() += 1;
        journal.push(TreeChange::RowRedrawn(row.clone()));
    }

    fn set_redraw(&self, enabled: bool) {
        let mut journal = self.journal.lock();
        if enabled {
            match journal.suspended {
                0 => tracing::warn!(target: LOG_TARGET, "redraw resumed without being suspended"),
                1 => {
                    journal.suspended = 0;
                    journal.push(TreeChange::RedrawResumed);
                }
                _ => journal.suspended -= 1,
            }
        } else {
            journal.suspended += 1;
            if journal.suspended == 1 {
                journal.push(TreeChange::RedrawSuspended);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Table {
        id: u32,
        name: &'static str,
    }

    impl TreeNodeData for Table {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }

        fn label(&self) -> String {
            self.name.to_string()
        }
    }

    fn table(id: u32, name: &'static str) -> Table {
        Table { id, name }
    }

    fn sample() -> LazyTreeModel<Table> {
        let model = LazyTreeModel::new();
        model.add_root(table(1, "catalog")).unwrap();
        model.add_child(&1, table(2, "public")).unwrap();
        model.add_child(&2, table(3, "orders")).unwrap();
        model.take_changes();
        model
    }

    #[test]
    fn test_tree_model_hierarchy() {
        let model = sample();
        assert_eq!(model.roots(), vec![1]);
        assert_eq!(model.children(&1), vec![TreeRow::Node(2)]);
        assert_eq!(model.parent_of(&TreeRow::Node(3)), Some(2));
        assert_eq!(model.parent_of(&TreeRow::Node(1)), None);
        assert_eq!(model.with_node(&3, |t| t.name), Some("orders"));
        assert_eq!(model.len(), 3);
    }

    #[test]
    fn test_add_child_errors() {
        let model = sample();
        assert_eq!(
            model.add_child(&99, table(4, "x")),
            Err(ViewError::unknown_parent(&99))
        );
        assert_eq!(
            model.add_child(&1, table(3, "again")),
            Err(ViewError::duplicate_key(&3))
        );
    }

    #[test]
    fn test_remove_drops_subtree() {
        let model = sample();
        assert_eq!(model.remove(&2), Some(table(2, "public")));
        assert!(!model.contains_key(&3));
        assert_eq!(model.child_count(&1), 0);
        assert_eq!(model.take_changes(), vec![TreeChange::RowRemoved(TreeRow::Node(2))]);
        assert_eq!(model.remove(&2), None);
    }

    #[test]
    fn test_insert_children_is_atomic() {
        let model = sample();
        let err = model
            .insert_children(&1, vec![table(10, "a"), table(10, "b")])
            .unwrap_err();
        assert_eq!(err, ViewError::duplicate_key(&10));
        assert_eq!(model.child_count(&1), 1);

        assert_eq!(
            model.insert_children(&1, vec![table(10, "a"), table(11, "b")]),
            Ok(2)
        );
        assert_eq!(model.child_labels(&1), vec!["public", "a", "b"]);
        assert_eq!(
            model.take_changes(),
            vec![TreeChange::RowsInserted {
                parent: Some(1),
                count: 2
            }]
        );
    }

    #[test]
    fn test_placeholder_rows() {
        let model = sample();
        let registry = loadpulse_core::DedupRegistry::new();
        let placeholder = registry.create_placeholder(&3);

        model.insert_placeholder(placeholder.clone()).unwrap();
        model.insert_placeholder(placeholder.clone()).unwrap();
        assert_eq!(model.children(&3), vec![TreeRow::Placeholder(3)]);
        assert_eq!(model.child_labels(&3), vec!["Loading"]);
        assert_eq!(model.parent_of(&TreeRow::Placeholder(3)), Some(3));

        placeholder.advance();
        assert_eq!(model.child_labels(&3), vec!["Loading."]);

        assert!(model.remove_row(&TreeRow::Placeholder(3)));
        assert!(!model.remove_row(&TreeRow::Placeholder(3)));
        assert!(model.children(&3).is_empty());
        assert!(model.placeholder(&3).is_none());
    }

    #[test]
    fn test_disposed_placeholder_is_not_shown() {
        let model = sample();
        let registry = loadpulse_core::DedupRegistry::new();
        let placeholder = registry.create_placeholder(&3);
        registry.dispose(&3);

        model.insert_placeholder(placeholder).unwrap();
        assert!(model.children(&3).is_empty());
        assert!(model.take_changes().is_empty());
    }

    #[test]
    fn test_placeholder_needs_parent() {
        let model = sample();
        let registry = loadpulse_core::DedupRegistry::new();
        let placeholder = registry.create_placeholder(&42);
        assert_eq!(
            model.insert_placeholder(placeholder),
            Err(ViewError::unknown_parent(&42))
        );
    }

    #[test]
    fn test_removing_parent_drops_placeholder() {
        let model = sample();
        let registry = loadpulse_core::DedupRegistry::new();
        model
            .insert_placeholder(registry.create_placeholder(&2))
            .unwrap();
        model.remove(&2);
        assert!(!model.contains(&TreeRow::Placeholder(2)));
        assert_eq!(model.parent_of(&TreeRow::Placeholder(2)), None);
    }

    #[test]
    fn test_redraw_nesting() {
        let model = sample();
        model.set_redraw(false);
        model.set_redraw(false);
        assert!(model.is_redraw_suspended());
        model.set_redraw(true);
        assert!(model.is_redraw_suspended());
        model.set_redraw(true);
        assert!(!model.is_redraw_suspended());
        model.set_redraw(true);
        assert!(!model.is_redraw_suspended());

        assert_eq!(
            model.take_changes(),
            vec![TreeChange::RedrawSuspended, TreeChange::RedrawResumed]
        );
    }

    #[test]
    fn test_redraw_counts() {
        let model = sample();
        let row = TreeRow::Node(3);
        model.redraw_row(&row);
        model.redraw_row(&row);
        assert_eq!(model.redraw_count(&row), 2);
        assert_eq!(model.redraw_count(&TreeRow::Node(2)), 0);
    }

    #[test]
    fn test_change_log_is_bounded() {
        let model = LazyTreeModel::with_change_capacity(3);
        model.add_root(table(1, "catalog")).unwrap();
        let row = TreeRow::Node(1);
        for _ in 0..5 {
            model.redraw_row(&row);
        }

        assert_eq!(model.changes(), vec![TreeChange::RowRedrawn(row.clone()); 3]);
        assert_eq!(model.redraw_count(&row), 5);
        assert_eq!(model.take_changes().len(), 3);
        assert!(model.changes().is_empty());
    }

    #[test]
    fn test_removed_rows_forget_redraws() {
        let model = sample();
        model.redraw_row(&TreeRow::Node(3));
        model.redraw_row(&TreeRow::Node(1));
        model.remove(&2);

        assert_eq!(model.redraw_count(&TreeRow::Node(3)), 0);
        assert_eq!(model.redraw_count(&TreeRow::Node(1)), 1);
    }

    #[test]
    fn test_clear_is_recorded() {
        let model = sample();
        model.redraw_row(&TreeRow::Node(3));
        model.clear();

        assert!(model.is_empty());
        assert!(model.roots().is_empty());
        assert_eq!(model.redraw_count(&TreeRow::Node(3)), 0);
        assert_eq!(
            model.take_changes(),
            vec![TreeChange::RowRedrawn(TreeRow::Node(3)), TreeChange::Cleared]
        );
    }
}
