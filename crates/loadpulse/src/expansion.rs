//! Lazy expansion of tree nodes.
//!
//! Expanding a node starts one background load of its children and shows a
//! single animated placeholder row under it until they arrive:
//!
//! 1. [`TreeExpander::expand_children`] asks the [`DedupRegistry`] for the
//!    node's placeholder and for the right to load. Only the first caller per
//!    node wins; every other caller gets nothing to show.
//! 2. The winner schedules a [`TreeExpansionTask`] paired with a
//!    [`TreeExpansionVisualizer`] on the [`LoadRuntime`].
//! 3. Each pulse advances the placeholder's animation and repaints its row.
//! 4. On completion the visualizer merges the children, removes the
//!    placeholder row and releases the node in the registry, whatever the
//!    outcome of the load.

use std::sync::Arc;

use loadpulse_core::{
    DedupRegistry, ExpansionPlaceholder, FamilyKey, LoadHandle, LoadResult, LoadRuntime,
    LoadScheduler, LoadTask, LoadVisualizer, NestedTask, ProgressMonitor,
};

use crate::LOG_TARGET;
use crate::view::{TreeNodeData, TreeRow, TreeView, ViewError};

type ChildLoader<N> = Box<
    dyn Fn(&<N as TreeNodeData>::Key, &ProgressMonitor) -> LoadResult<Vec<N>> + Send + Sync,
>;

/// Loads the children of one tree node.
pub struct TreeExpansionTask<N: TreeNodeData> {
    name: String,
    parent: N::Key,
    nested: NestedTask,
    loader: ChildLoader<N>,
}

impl<N: TreeNodeData> TreeExpansionTask<N> {
    /// Create a task loading the children of `parent` with `loader`.
    ///
    /// `name` titles failure reports.
    pub fn new<F>(name: impl Into<String>, parent: N::Key, loader: F) -> Self
    where
        F: Fn(&N::Key, &ProgressMonitor) -> LoadResult<Vec<N>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parent,
            nested: NestedTask::new(),
            loader: Box::new(loader),
        }
    }

    /// The node whose children this task loads.
    pub fn parent(&self) -> &N::Key {
        &self.parent
    }
}

impl<N: TreeNodeData> LoadTask for TreeExpansionTask<N> {
    type Output = Vec<N>;

    fn name(&self) -> &str {
        &self.name
    }

    fn nested(&self) -> &NestedTask {
        &self.nested
    }

    fn evaluate(&self, progress: &ProgressMonitor) -> LoadResult<Vec<N>> {
        progress.sub_task(format!("Loading children of {:?}", self.parent));
        (self.loader)(&self.parent, progress)
    }
}

impl<N: TreeNodeData> std::fmt::Debug for TreeExpansionTask<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeExpansionTask")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Resumes redraw and releases the node on every exit from `complete_loading`.
struct ReleaseOnDrop<'a, N: TreeNodeData> {
    view: &'a dyn TreeView<N>,
    registry: &'a DedupRegistry<N::Key>,
    key: &'a N::Key,
}

impl<N: TreeNodeData> Drop for ReleaseOnDrop<'_, N> {
    fn drop(&mut self) {
        self.view.set_redraw(true);
        self.registry.dispose(self.key);
    }
}

/// Animates the placeholder of a node and merges its loaded children.
pub struct TreeExpansionVisualizer<N: TreeNodeData> {
    view: Arc<dyn TreeView<N>>,
    registry: Arc<DedupRegistry<N::Key>>,
    placeholder: Arc<ExpansionPlaceholder<N::Key>>,
}

impl<N: TreeNodeData> TreeExpansionVisualizer<N> {
    /// Bind a visualizer to `placeholder` in `view`.
    pub fn new(
        view: Arc<dyn TreeView<N>>,
        registry: Arc<DedupRegistry<N::Key>>,
        placeholder: Arc<ExpansionPlaceholder<N::Key>>,
    ) -> Self {
        Self {
            view,
            registry,
            placeholder,
        }
    }

    /// The node being expanded.
    pub fn key(&self) -> &N::Key {
        self.placeholder.key()
    }
}

impl<N: TreeNodeData> LoadVisualizer<Vec<N>> for TreeExpansionVisualizer<N> {
    fn is_completed(&self) -> bool {
        self.placeholder.is_disposed() || !self.view.contains(&TreeRow::Node(self.key().clone()))
    }

    fn visualize_loading(&mut self) {
        self.placeholder.advance();
        self.view.redraw_row(&TreeRow::Placeholder(self.key().clone()));
    }

    fn complete_loading(&mut self, children: Option<Vec<N>>) {
        let key = self.key().clone();
        self.view.set_redraw(false);
        let _release = ReleaseOnDrop {
            view: self.view.as_ref(),
            registry: self.registry.as_ref(),
            key: &key,
        };

        let attached = self.view.contains(&TreeRow::Node(key.clone()));
        match children {
            Some(children) if attached && !children.is_empty() => {
                match self.view.insert_children(&key, children) {
                    Ok(count) => {
                        tracing::debug!(target: LOG_TARGET, ?key, count, "children merged");
                    }
                    Err(err) => {
                        tracing::warn!(target: LOG_TARGET, ?key, error = %err, "failed to merge children");
                    }
                }
            }
            Some(_) if !attached => {
                tracing::debug!(target: LOG_TARGET, ?key, "node left the view, dropping children");
            }
            _ => {}
        }

        let row = TreeRow::Placeholder(key.clone());
        if self.view.parent_of(&row).as_ref() == Some(&key) {
            self.view.remove_row(&row);
        }
    }
}

/// Starts lazy expansions of the nodes of one view.
///
/// The [`DedupRegistry`] is shared with every expander of the same tree, so
/// that a node is never loaded twice at once.
pub struct TreeExpander<N: TreeNodeData> {
    runtime: LoadRuntime,
    view: Arc<dyn TreeView<N>>,
    registry: Arc<DedupRegistry<N::Key>>,
    family: Option<FamilyKey>,
}

impl<N: TreeNodeData> TreeExpander<N> {
    /// Create an expander for `view`.
    pub fn new(
        runtime: &LoadRuntime,
        view: Arc<dyn TreeView<N>>,
        registry: Arc<DedupRegistry<N::Key>>,
    ) -> Self {
        Self {
            runtime: runtime.clone(),
            view,
            registry,
            family: None,
        }
    }

    /// Tag every load started by this expander with `family`.
    pub fn in_family(mut self, family: impl Into<FamilyKey>) -> Self {
        self.family = Some(family.into());
        self
    }

    /// The view being expanded.
    pub fn view(&self) -> &Arc<dyn TreeView<N>> {
        &self.view
    }

    /// The registry deduplicating loads.
    pub fn registry(&self) -> &Arc<DedupRegistry<N::Key>> {
        &self.registry
    }

    /// Start loading the children of `row` with `task`.
    ///
    /// Returns the placeholder to show under the node, or nothing when `row`
    /// is itself a placeholder or a load for it is already running. Inserting
    /// the returned placeholder into the view is up to the caller, on the UI
    /// thread; [`expand`](Self::expand) does both and may be called from any
    /// thread.
    pub fn expand_children(
        &self,
        row: &TreeRow<N::Key>,
        task: TreeExpansionTask<N>,
    ) -> Vec<Arc<ExpansionPlaceholder<N::Key>>> {
        let Some(placeholder) = self.claim(row) else {
            return Vec::new();
        };
        self.start(placeholder.clone(), task);
        vec![placeholder]
    }

    /// Expand the node `key` and show its placeholder row.
    ///
    /// The placeholder row is in the view before the load starts, so the
    /// load's completion always finds it. Returns the handle of the started
    /// load, or `None` if one is already running for `key`.
    ///
    /// # Errors
    ///
    /// [`ViewError::UnknownParent`] if `key` is not in the view. Nothing is
    /// scheduled in that case and `key` is released again.
    pub fn expand(
        &self,
        key: &N::Key,
        task: TreeExpansionTask<N>,
    ) -> Result<Option<LoadHandle>, ViewError> {
        let Some(placeholder) = self.claim(&TreeRow::Node(key.clone())) else {
            return Ok(None);
        };
        if let Err(err) = self.view.insert_placeholder(placeholder.clone()) {
            self.registry.dispose(key);
            return Err(err);
        }
        Ok(Some(self.start(placeholder, task)))
    }

    /// Win the right to load the children of `row`.
    fn claim(&self, row: &TreeRow<N::Key>) -> Option<Arc<ExpansionPlaceholder<N::Key>>> {
        let TreeRow::Node(key) = row else {
            tracing::trace!(target: LOG_TARGET, key = ?row.key(), "placeholders do not expand");
            return None;
        };

        let placeholder = self.registry.create_placeholder(key);
        if !self.registry.try_begin_load(key) {
            return None;
        }
        // The previous load of this key may have disposed it in between.
        if placeholder.is_disposed() {
            return Some(self.registry.create_placeholder(key));
        }
        Some(placeholder)
    }

    fn start(
        &self,
        placeholder: Arc<ExpansionPlaceholder<N::Key>>,
        task: TreeExpansionTask<N>,
    ) -> LoadHandle {
        let key = placeholder.key().clone();
        let visualizer =
            TreeExpansionVisualizer::new(self.view.clone(), self.registry.clone(), placeholder);
        let mut scheduler = LoadScheduler::new(&self.runtime, task, visualizer);
        if let Some(family) = &self.family {
            scheduler = scheduler.in_family(family.clone());
        }
        let handle = scheduler.schedule();
        tracing::debug!(target: LOG_TARGET, ?key, id = ?handle.id(), "expansion started");
        handle
    }
}

impl<N: TreeNodeData> Clone for TreeExpander<N> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            view: self.view.clone(),
            registry: self.registry.clone(),
            family: self.family.clone(),
        }
    }
}

impl<N: TreeNodeData> std::fmt::Debug for TreeExpander<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeExpander")
            .field("registry", &self.registry)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LazyTreeModel;

    fn setup() -> (Arc<LazyTreeModel<String>>, Arc<DedupRegistry<String>>) {
        let model = Arc::new(LazyTreeModel::new());
        model.add_root("db".to_string()).unwrap();
        (model, Arc::new(DedupRegistry::new()))
    }

    fn visualizer(
        model: &Arc<LazyTreeModel<String>>,
        registry: &Arc<DedupRegistry<String>>,
    ) -> TreeExpansionVisualizer<String> {
        let placeholder = registry.create_placeholder(&"db".to_string());
        registry.try_begin_load(&"db".to_string());
        model.insert_placeholder(placeholder.clone()).unwrap();
        TreeExpansionVisualizer::<String>::new(model.clone(), registry.clone(), placeholder)
    }

    #[test]
    fn test_visualize_loading_redraws_placeholder_only() {
        let (model, registry) = setup();
        let mut visualizer = visualizer(&model, &registry);

        visualizer.visualize_loading();
        visualizer.visualize_loading();

        let row = TreeRow::Placeholder("db".to_string());
        assert_eq!(model.redraw_count(&row), 2);
        assert_eq!(model.redraw_count(&TreeRow::Node("db".to_string())), 0);
        assert_eq!(model.child_labels(&"db".to_string()), vec!["Loading.."]);
    }

    #[test]
    fn test_complete_loading_merges_and_releases() {
        let (model, registry) = setup();
        let mut visualizer = visualizer(&model, &registry);
        assert!(!visualizer.is_completed());

        visualizer.complete_loading(Some(vec!["a".to_string(), "b".to_string()]));

        assert_eq!(model.child_labels(&"db".to_string()), vec!["a", "b"]);
        assert!(!model.is_redraw_suspended());
        assert!(registry.is_empty());
        assert!(visualizer.is_completed());
    }

    #[test]
    fn test_complete_loading_with_nothing() {
        let (model, registry) = setup();
        let mut visualizer = visualizer(&model, &registry);

        visualizer.complete_loading(None);

        assert!(model.children(&"db".to_string()).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_merge_failure_still_releases() {
        let (model, registry) = setup();
        model.add_child(&"db".to_string(), "dup".to_string()).unwrap();
        let mut visualizer = visualizer(&model, &registry);

        visualizer.complete_loading(Some(vec!["dup".to_string()]));

        assert_eq!(model.child_labels(&"db".to_string()), vec!["dup"]);
        assert!(!model.is_redraw_suspended());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removed_node_completes_visualizer() {
        let (model, registry) = setup();
        let mut visualizer = visualizer(&model, &registry);

        model.remove(&"db".to_string());
        assert!(visualizer.is_completed());

        visualizer.complete_loading(Some(vec!["late".to_string()]));
        assert!(!model.contains_key(&"late".to_string()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_placeholder_rows_never_expand() {
        let (model, registry) = setup();
        let ui = loadpulse_core::UiEventLoop::new();
        let runtime = LoadRuntime::new(ui.handle());
        let expander = TreeExpander::<String>::new(&runtime, model, registry.clone());

        let task = TreeExpansionTask::<String>::new("noop", "db".to_string(), |_key, _progress| {
            Ok(Vec::new())
        });
        let placeholders =
            expander.expand_children(&TreeRow::Placeholder("db".to_string()), task);

        assert!(placeholders.is_empty());
        assert!(registry.is_empty());
        assert_eq!(runtime.jobs().active_count(), 0);
    }
}
