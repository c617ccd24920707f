//! Commonly used types.
//!
//! ```
//! use loadpulse::prelude::*;
//! ```

pub use crate::{
    DedupRegistry, ErrorSink, ExpansionPlaceholder, FamilyKey, LazyTreeModel, LoadError,
    LoadHandle, LoadOutcome, LoadResult, LoadRuntime, LoadScheduler, LoadTask, LoadVisualizer,
    NestedTask, NullTask, ProgressMonitor, TreeExpander, TreeExpansionTask,
    TreeExpansionVisualizer, TreeNodeData, TreeRow, TreeView, UiDispatcher, UiEventLoop,
};
