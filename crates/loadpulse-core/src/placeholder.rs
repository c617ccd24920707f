//! The animated "loading" row shown while a key's children load.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Animation frames of a placeholder, advanced once per pulse.
pub const PLACEHOLDER_FRAMES: [&str; 4] = ["Loading", "Loading.", "Loading..", "Loading..."];

/// A transient placeholder owned by one key of a [`DedupRegistry`](crate::DedupRegistry).
///
/// Created on the first request for a key and disposed exactly once when the
/// load for that key ends.
#[derive(Debug)]
pub struct ExpansionPlaceholder<K> {
    key: K,
    frame: AtomicUsize,
    disposed: AtomicBool,
}

impl<K> ExpansionPlaceholder<K> {
    pub(crate) fn new(key: K) -> Self {
        Self {
            key,
            frame: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// The key this placeholder stands in for.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The current animation frame, in `0..4`.
    pub fn frame(&self) -> usize {
        self.frame.load(Ordering::Acquire)
    }

    /// The text of the current frame.
    pub fn label(&self) -> &'static str {
        PLACEHOLDER_FRAMES[self.frame()]
    }

    /// Step the animation, wrapping after the last frame. Returns the new frame.
    pub fn advance(&self) -> usize {
        let len = PLACEHOLDER_FRAMES.len();
        let previous = self
            .frame
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |frame| {
                Some((frame + 1) % len)
            })
            .unwrap_or_default();
        (previous + 1) % len
    }

    /// Whether the placeholder has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark disposed. Returns `true` for the call that did it.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_wrap() {
        let placeholder = ExpansionPlaceholder::new("tables");
        assert_eq!(placeholder.label(), "Loading");

        let labels: Vec<_> = (0..5)
            .map(|_| {
                placeholder.advance();
                placeholder.label()
            })
            .collect();
        assert_eq!(
            labels,
            vec!["Loading.", "Loading..", "Loading...", "Loading", "Loading."]
        );
        assert_eq!(placeholder.frame(), 1);
    }

    #[test]
    fn test_mark_disposed_once() {
        let placeholder = ExpansionPlaceholder::new(7_u32);
        assert!(!placeholder.is_disposed());
        assert!(placeholder.mark_disposed());
        assert!(!placeholder.mark_disposed());
        assert!(placeholder.is_disposed());
        assert_eq!(*placeholder.key(), 7);
    }
}
