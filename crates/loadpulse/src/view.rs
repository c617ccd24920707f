//! The tree-view collaborator contract.
//!
//! Expansion needs very little from the widget that displays the tree: a way
//! to test whether a row still exists, to insert and remove rows under a
//! parent, and to suspend redraw around a batch of mutations. [`TreeView`]
//! captures exactly that; [`LazyTreeModel`](crate::LazyTreeModel) is the
//! in-memory implementation.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use thiserror::Error;

use loadpulse_core::ExpansionPlaceholder;

/// Data stored in a lazily expanded tree.
pub trait TreeNodeData: Send + Sync + 'static {
    /// The identity of a node within its tree.
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// This node's key. Must be unique within the tree.
    fn key(&self) -> Self::Key;

    /// The text shown for this node.
    fn label(&self) -> String;
}

impl TreeNodeData for String {
    type Key = String;

    fn key(&self) -> String {
        self.clone()
    }

    fn label(&self) -> String {
        self.clone()
    }
}

/// A row of the tree: a real node, or the loading placeholder under a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreeRow<K> {
    /// The row of the node with this key.
    Node(K),
    /// The loading placeholder shown under the node with this key.
    Placeholder(K),
}

impl<K> TreeRow<K> {
    /// The node key this row belongs to.
    pub fn key(&self) -> &K {
        match self {
            Self::Node(key) | Self::Placeholder(key) => key,
        }
    }

    /// Whether this is a placeholder row.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }
}

/// Errors from tree view mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    /// The parent row does not exist, or no longer does.
    #[error("parent row {parent} is not in the view")]
    UnknownParent {
        /// The parent key, debug-formatted.
        parent: String,
    },

    /// A node with this key is already in the view.
    #[error("row {key} is already in the view")]
    DuplicateKey {
        /// The offending key, debug-formatted.
        key: String,
    },
}

impl ViewError {
    pub(crate) fn unknown_parent(parent: &impl Debug) -> Self {
        Self::UnknownParent {
            parent: format!("{parent:?}"),
        }
    }

    pub(crate) fn duplicate_key(key: &impl Debug) -> Self {
        Self::DuplicateKey {
            key: format!("{key:?}"),
        }
    }
}

/// What expansion requires from the view displaying the tree.
///
/// Implementations are shared between the UI thread and the thread that
/// starts an expansion, hence `&self` and the `Sync` bound. Mutations are only
/// ever issued from the UI thread.
pub trait TreeView<N: TreeNodeData>: Send + Sync {
    /// Whether `row` is currently in the view.
    fn contains(&self, row: &TreeRow<N::Key>) -> bool;

    /// The key of the node `row` is attached under, if it is attached.
    fn parent_of(&self, row: &TreeRow<N::Key>) -> Option<N::Key>;

    /// Append `children` under `parent`. Returns how many rows were added.
    fn insert_children(&self, parent: &N::Key, children: Vec<N>) -> Result<usize, ViewError>;

    /// Show `placeholder` as the loading row under its key.
    ///
    /// A placeholder that was already disposed belongs to a finished load and
    /// must not be shown.
    fn insert_placeholder(
        &self,
        placeholder: Arc<ExpansionPlaceholder<N::Key>>,
    ) -> Result<(), ViewError>;

    /// Remove `row` and everything below it. Returns whether it was present.
    fn remove_row(&self, row: &TreeRow<N::Key>) -> bool;

    /// Repaint a single row.
    fn redraw_row(&self, row: &TreeRow<N::Key>);

    /// Suspend (`false`) or resume (`true`) redraw. Calls nest.
    fn set_redraw(&self, enabled: bool);
}
