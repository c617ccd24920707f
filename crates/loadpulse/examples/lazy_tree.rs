//! Lazily expands a simulated database catalog.
//!
//! Each level takes a moment to "fetch", so the placeholder animation is
//! visible. Run with `RUST_LOG=loadpulse=debug,loadpulse_core=debug` to watch
//! the scheduler at work.

use std::sync::Arc;
use std::time::Duration;

use loadpulse::prelude::*;
use loadpulse::{LOG_TARGET, PulseConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct CatalogEntry {
    path: String,
}

impl CatalogEntry {
    fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl TreeNodeData for CatalogEntry {
    type Key = String;

    fn key(&self) -> String {
        self.path.clone()
    }

    fn label(&self) -> String {
        self.path
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
            .to_string()
    }
}

/// Pretend to query the server for the children of `parent`.
fn fetch_children(parent: &String, progress: &ProgressMonitor) -> LoadResult<Vec<CatalogEntry>> {
    let names: &[&str] = match parent.matches('/').count() {
        0 => &["public", "audit"],
        1 => &["orders", "customers", "invoices"],
        _ => &["id", "created_at", "total"],
    };
    progress.begin_task(format!("Reading {parent}"), names.len() as u64);

    let mut children = Vec::with_capacity(names.len());
    for name in names {
        progress.check_cancelled()?;
        std::thread::sleep(Duration::from_millis(150));
        children.push(CatalogEntry::new(format!("{parent}/{name}")));
        progress.worked(1);
    }
    Ok(children)
}

fn print_tree(model: &LazyTreeModel<CatalogEntry>, key: &String, depth: usize) {
    if let Some(label) = model.with_node(key, |entry| entry.label()) {
        println!("{:indent$}{label}", "", indent = depth * 2);
    }
    for row in model.children(key) {
        match row {
            TreeRow::Node(child) => print_tree(model, &child, depth + 1),
            TreeRow::Placeholder(parent) => {
                if let Some(placeholder) = model.placeholder(&parent) {
                    println!("{:indent$}{}", "", placeholder.label(), indent = (depth + 1) * 2);
                }
            }
        }
    }
}

fn expand(
    ui: &UiEventLoop,
    expander: &TreeExpander<CatalogEntry>,
    key: &String,
) -> Result<(), ViewErrorOrTimeout> {
    let task =
        TreeExpansionTask::<CatalogEntry>::new(format!("Load {key}"), key.clone(), fetch_children);
    let Some(handle) = expander.expand(key, task)? else {
        tracing::info!(target: LOG_TARGET, %key, "already loading");
        return Ok(());
    };
    if !ui.run_until(Duration::from_secs(10), || handle.is_done()) {
        return Err(ViewErrorOrTimeout::Timeout(key.clone()));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum ViewErrorOrTimeout {
    #[error(transparent)]
    View(#[from] loadpulse::ViewError),
    #[error("expanding {0} timed out")]
    Timeout(String),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let ui = UiEventLoop::new();
    let runtime = LoadRuntime::builder(ui.handle())
        .pulse(PulseConfig::default().with_interval(Duration::from_millis(100)))
        .build();

    let model = Arc::new(LazyTreeModel::new());
    let root = model.add_root(CatalogEntry::new("warehouse"))?;
    let registry = Arc::new(DedupRegistry::new());
    let expander = TreeExpander::<CatalogEntry>::new(&runtime, model.clone(), registry)
        .in_family("warehouse");

    // Show a few animation frames of the first expansion.
    let task =
        TreeExpansionTask::<CatalogEntry>::new("Load warehouse", root.clone(), fetch_children);
    if let Some(handle) = expander.expand(&root, task)? {
        while !handle.is_done() {
            ui.run_until(Duration::from_millis(100), || handle.is_done());
            print_tree(&model, &root, 0);
            println!("--");
        }
    }

    expand(&ui, &expander, &"warehouse/public".to_string())?;
    expand(&ui, &expander, &"warehouse/public/orders".to_string())?;

    print_tree(&model, &root, 0);
    println!(
        "{} nodes, {} loads active",
        model.len(),
        runtime.jobs().active_count()
    );
    Ok(())
}
