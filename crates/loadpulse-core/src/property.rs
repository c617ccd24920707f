//! Lazy properties evaluated inline as nested tasks.
//!
//! An object exposes named attributes through [`PropertySource`]. An attribute
//! is either already available or *deferred*: a [`LoadTask`] that computes it
//! on demand. [`extract_value`] resolves either kind from inside a running
//! task. Deferred values are evaluated synchronously on the caller's
//! background thread with the caller's progress handle, installed as the
//! caller's nested task for the duration so that cancelling the caller also
//! cancels them.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use loadpulse_core::{extract_value, NullTask, ProgressMonitor, PropertyValue};
//!
//! let mut object = HashMap::new();
//! object.insert("comment".to_string(), PropertyValue::Ready("orders table".to_string()));
//!
//! let host = NullTask::<()>::new();
//! let value = extract_value(&object, "comment", &host, &ProgressMonitor::new()).unwrap();
//! assert_eq!(value.as_deref(), Some("orders table"));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LoadError, LoadResult};
use crate::logging::targets;
use crate::progress::ProgressMonitor;
use crate::task::{LoadTask, NestedTask};

/// The value of a named attribute.
pub enum PropertyValue<V> {
    /// The value is available.
    Ready(V),
    /// The value is produced by evaluating a task.
    Deferred(Arc<dyn LoadTask<Output = V>>),
}

impl<V> PropertyValue<V> {
    /// Wrap a task computing the value.
    pub fn deferred<T>(task: T) -> Self
    where
        T: LoadTask<Output = V> + 'static,
    {
        Self::Deferred(Arc::new(task))
    }

    /// Whether the value needs a task evaluation.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl<V: Clone> Clone for PropertyValue<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Ready(value) => Self::Ready(value.clone()),
            Self::Deferred(task) => Self::Deferred(task.clone()),
        }
    }
}

impl<V: std::fmt::Debug + Send + 'static> std::fmt::Debug for PropertyValue<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Deferred(task) => f.debug_tuple("Deferred").field(&task.name()).finish(),
        }
    }
}

/// Typed access to the named attributes of an object.
pub trait PropertySource<V> {
    /// Look up `name`. `None` if the object has no such attribute.
    fn property(&self, name: &str) -> Option<PropertyValue<V>>;
}

impl<V: Clone> PropertySource<V> for HashMap<String, PropertyValue<V>> {
    fn property(&self, name: &str) -> Option<PropertyValue<V>> {
        self.get(name).cloned()
    }
}

/// Clears the nested-task link on every exit path, panics included.
///
/// Tasks the nested evaluation began on the host's monitor without finishing
/// are dropped as well.
struct NestedLink<'a> {
    slot: &'a NestedTask,
    progress: &'a ProgressMonitor,
    depth: usize,
}

impl Drop for NestedLink<'_> {
    fn drop(&mut self) {
        self.progress.unwind_to(self.depth);
        if let Err(violation) = self.slot.clear() {
            tracing::warn!(
                target: targets::SCHEDULER,
                error = %violation,
                "nested task was unlinked by someone else"
            );
        }
    }
}

/// Read attribute `name` of `object` on behalf of `host`.
///
/// A ready value is returned as is. A deferred value is installed as `host`'s
/// nested task, evaluated inline with `progress`, and unlinked again whatever
/// the outcome. Cancellation of the nested task yields `Ok(None)`.
///
/// # Errors
///
/// - [`LoadError::PropertyNotFound`] if `object` has no attribute `name`.
/// - [`LoadError::Precondition`] if `host` already has a nested task.
/// - Any failure of the nested task, unchanged.
pub fn extract_value<S, V, H>(
    object: &S,
    name: &str,
    host: &H,
    progress: &ProgressMonitor,
) -> LoadResult<Option<V>>
where
    S: PropertySource<V> + ?Sized,
    V: Send + 'static,
    H: LoadTask + ?Sized,
{
    let task = match object.property(name) {
        Some(PropertyValue::Ready(value)) => return Ok(Some(value)),
        Some(PropertyValue::Deferred(task)) => task,
        None => return Err(LoadError::PropertyNotFound(name.to_string())),
    };

    host.nested().set(task.clone())?;
    let _link = NestedLink {
        slot: host.nested(),
        progress,
        depth: progress.depth(),
    };
    tracing::trace!(
        target: targets::SCHEDULER,
        host = %host.name(),
        nested = %task.name(),
        property = name,
        "evaluating nested task"
    );

    match task.evaluate(progress) {
        Ok(value) => Ok(Some(value)),
        Err(LoadError::Cancelled) => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreconditionViolation;
    use crate::task::NullTask;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Computes its value, optionally observing the host while running.
    struct Computed<F> {
        nested: NestedTask,
        compute: F,
    }

    impl<F> Computed<F>
    where
        F: Fn(&ProgressMonitor) -> LoadResult<String> + Send + Sync,
    {
        fn new(compute: F) -> Self {
            Self {
                nested: NestedTask::new(),
                compute,
            }
        }
    }

    impl<F> LoadTask for Computed<F>
    where
        F: Fn(&ProgressMonitor) -> LoadResult<String> + Send + Sync,
    {
        type Output = String;

        fn name(&self) -> &str {
            "computed"
        }

        fn nested(&self) -> &NestedTask {
            &self.nested
        }

        fn evaluate(&self, progress: &ProgressMonitor) -> LoadResult<String> {
            (self.compute)(progress)
        }
    }

    fn object_with(name: &str, value: PropertyValue<String>) -> HashMap<String, PropertyValue<String>> {
        let mut object = HashMap::new();
        object.insert(name.to_string(), value);
        object
    }

    #[test]
    fn test_ready_value_skips_nesting() {
        let object = object_with("comment", PropertyValue::Ready("hello".into()));
        let host = NullTask::<()>::new();
        let value = extract_value(&object, "comment", &host, &ProgressMonitor::new()).unwrap();
        assert_eq!(value.as_deref(), Some("hello"));
        assert!(!host.nested().is_set());
    }

    #[test]
    fn test_deferred_value_is_nested_while_evaluating() {
        let host = Arc::new(NullTask::<()>::new());
        let seen_nested = Arc::new(AtomicBool::new(false));

        let observer = host.clone();
        let seen = seen_nested.clone();
        let object = object_with(
            "ddl",
            PropertyValue::deferred(Computed::new(move |_progress: &ProgressMonitor| {
                seen.store(observer.nested().is_set(), Ordering::SeqCst);
                Ok("CREATE TABLE t ()".to_string())
            })),
        );

        let value = extract_value(&object, "ddl", host.as_ref(), &ProgressMonitor::new()).unwrap();
        assert_eq!(value.as_deref(), Some("CREATE TABLE t ()"));
        assert!(seen_nested.load(Ordering::SeqCst));
        assert!(!host.nested().is_set());
    }

    #[test]
    fn test_nested_uses_callers_progress() {
        let object = object_with(
            "rows",
            PropertyValue::deferred(Computed::new(|progress: &ProgressMonitor| {
                progress.sub_task("counting rows");
                Ok("42".to_string())
            })),
        );
        let progress = ProgressMonitor::new();
        let host = NullTask::<()>::new();
        extract_value(&object, "rows", &host, &progress).unwrap();
        assert_eq!(progress.sub_task_message().as_deref(), Some("counting rows"));
    }

    #[test]
    fn test_cancellation_maps_to_none() {
        let object = object_with(
            "slow",
            PropertyValue::deferred(Computed::new(|progress: &ProgressMonitor| {
                progress.check_cancelled()?;
                Ok("unreachable".to_string())
            })),
        );
        let progress = ProgressMonitor::new();
        progress.cancel();
        let host = NullTask::<()>::new();

        let value = extract_value(&object, "slow", &host, &progress).unwrap();
        assert!(value.is_none());
        assert!(!host.nested().is_set());
    }

    #[test]
    fn test_failure_propagates_and_unlinks() {
        let object = object_with(
            "broken",
            PropertyValue::deferred(Computed::new(|_progress: &ProgressMonitor| {
                Err(LoadError::execution("driver error"))
            })),
        );
        let host = NullTask::<()>::new();

        let err = extract_value(&object, "broken", &host, &ProgressMonitor::new()).unwrap_err();
        assert_eq!(err.to_string(), "execution failed: driver error");
        assert!(!host.nested().is_set());
    }

    #[test]
    fn test_panic_still_unlinks() {
        let object = object_with(
            "panics",
            PropertyValue::deferred(Computed::new(|_progress: &ProgressMonitor| -> LoadResult<String> {
                panic!("boom")
            })),
        );
        let host = NullTask::<()>::new();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            extract_value(&object, "panics", &host, &ProgressMonitor::new())
        }));
        assert!(outcome.is_err());
        assert!(!host.nested().is_set());
    }

    #[test]
    fn test_nested_progress_is_restored() {
        let object = object_with(
            "ddl",
            PropertyValue::deferred(Computed::new(|progress: &ProgressMonitor| {
                progress.begin_task("read ddl", 3);
                progress.worked(1);
                Err(LoadError::execution("lost connection"))
            })),
        );
        let progress = ProgressMonitor::new();
        progress.begin_task("Load tables", 4);
        progress.worked(1);
        let host = NullTask::<()>::new();

        assert!(extract_value(&object, "ddl", &host, &progress).is_err());
        assert_eq!(progress.depth(), 1);
        assert_eq!(progress.task_name().as_deref(), Some("Load tables"));
        assert!((progress.fraction() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cleared_link_is_tolerated() {
        let host = Arc::new(NullTask::<()>::new());
        let observer = host.clone();
        let object = object_with(
            "ddl",
            PropertyValue::deferred(Computed::new(move |_progress: &ProgressMonitor| {
                observer.nested().clear()?;
                Ok("text".to_string())
            })),
        );

        let value = extract_value(&object, "ddl", host.as_ref(), &ProgressMonitor::new()).unwrap();
        assert_eq!(value.as_deref(), Some("text"));
        assert!(!host.nested().is_set());
    }

    #[test]
    fn test_debug_names_deferred_task() {
        let ready = PropertyValue::Ready("orders".to_string());
        assert_eq!(format!("{ready:?}"), r#"Ready("orders")"#);

        let deferred = PropertyValue::deferred(Computed::new(|_progress: &ProgressMonitor| {
            Ok(String::new())
        }));
        assert!(deferred.is_deferred());
        assert_eq!(format!("{deferred:?}"), r#"Deferred("computed")"#);
    }

    #[test]
    fn test_missing_property() {
        let object: HashMap<String, PropertyValue<String>> = HashMap::new();
        let host = NullTask::<()>::new();
        let err = extract_value(&object, "owner", &host, &ProgressMonitor::new()).unwrap_err();
        assert!(matches!(err, LoadError::PropertyNotFound(name) if name == "owner"));
    }

    #[test]
    fn test_busy_host_is_precondition_violation() {
        let object = object_with(
            "ddl",
            PropertyValue::deferred(Computed::new(|_progress: &ProgressMonitor| Ok(String::new()))),
        );
        let host = NullTask::<()>::new();
        host.nested().set(Arc::new(NullTask::<u8>::new())).unwrap();

        let err = extract_value(&object, "ddl", &host, &ProgressMonitor::new()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Precondition(PreconditionViolation::NestedTaskAlreadySet { .. })
        ));
        // The existing link is untouched.
        assert_eq!(host.nested().name().as_deref(), Some("Null"));
    }
}
