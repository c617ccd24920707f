//! UI-side callbacks of a load.

/// Merges a load's result into the UI and animates it while it runs.
///
/// Every method runs on the UI thread only, and must be short.
pub trait LoadVisualizer<T>: Send {
    /// Whether the UI no longer needs pulses.
    ///
    /// May turn true for reasons unrelated to the task, e.g. the target row
    /// was removed by the user. Pulsing stops for good once it does.
    fn is_completed(&self) -> bool;

    /// Render one animation step of the in-progress indicator.
    ///
    /// A stray call right before [`complete_loading`](Self::complete_loading)
    /// is possible, so rendering must be idempotent.
    fn visualize_loading(&mut self);

    /// Merge the result. Called exactly once per scheduled load.
    ///
    /// `None` means the load failed or was cancelled.
    fn complete_loading(&mut self, result: Option<T>);
}

/// A visualizer that only hands the result to a closure.
///
/// Never pulses anything; [`is_completed`](LoadVisualizer::is_completed) turns
/// true once the closure has run.
pub struct CallbackVisualizer<F> {
    callback: Option<F>,
}

impl<F> CallbackVisualizer<F> {
    /// Create a visualizer calling `callback` with the result.
    pub fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
        }
    }
}

impl<T, F> LoadVisualizer<T> for CallbackVisualizer<F>
where
    F: FnOnce(Option<T>) + Send,
{
    fn is_completed(&self) -> bool {
        self.callback.is_none()
    }

    fn visualize_loading(&mut self) {}

    fn complete_loading(&mut self, result: Option<T>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}
