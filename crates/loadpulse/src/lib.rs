//! Lazy tree expansion with animated placeholders.
//!
//! This crate specializes the [`loadpulse_core`] load engine for hierarchical
//! views: expanding a node loads its children in the background, shows one
//! "Loading..." row under it meanwhile, and merges the children once they
//! arrive. Concurrent expansions of the same node collapse into one load.
//!
//! The core crate is re-exported, so depending on `loadpulse` alone is enough.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use loadpulse::prelude::*;
//!
//! let ui = UiEventLoop::new();
//! let runtime = LoadRuntime::new(ui.handle());
//!
//! let model = Arc::new(LazyTreeModel::<String>::new());
//! model.add_root("inventory".to_string()).unwrap();
//!
//! let registry = Arc::new(DedupRegistry::new());
//! let expander = TreeExpander::<String>::new(&runtime, model.clone(), registry);
//!
//! let task = TreeExpansionTask::<String>::new(
//!     "Load tables",
//!     "inventory".to_string(),
//!     |_parent, _progress| Ok(vec!["items".to_string(), "stock".to_string()]),
//! );
//!
//! let handle = expander.expand(&"inventory".to_string(), task).unwrap().unwrap();
//! assert_eq!(model.child_labels(&"inventory".to_string()), vec!["Loading"]);
//!
//! assert!(ui.run_until(Duration::from_secs(5), || handle.is_done()));
//! assert_eq!(model.child_labels(&"inventory".to_string()), vec!["items", "stock"]);
//! ```

pub use loadpulse_core::*;

mod expansion;
mod model;
pub mod prelude;
mod view;

pub use expansion::{TreeExpander, TreeExpansionTask, TreeExpansionVisualizer};
pub use model::{DEFAULT_CHANGE_CAPACITY, LazyTreeModel, TreeChange};
pub use view::{TreeNodeData, TreeRow, TreeView, ViewError};

/// Log target of tree expansion.
pub const LOG_TARGET: &str = "loadpulse::tree";

static_assertions::assert_impl_all!(TreeExpander<String>: Send, Sync, Clone);
static_assertions::assert_impl_all!(LazyTreeModel<String>: Send, Sync);
static_assertions::assert_impl_all!(TreeExpansionTask<String>: Send, Sync);
