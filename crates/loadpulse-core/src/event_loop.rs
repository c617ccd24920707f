//! A single-threaded cooperative UI dispatcher.
//!
//! [`UiEventLoop`] is the reference [`UiDispatcher`]. Any thread may post jobs
//! through a [`UiHandle`]; the thread that pumps the loop runs them, one at a
//! time, ordered by due time and then by submission order.
//!
//! The loop is pumped explicitly, which keeps it embeddable in a host event
//! loop and deterministic in tests:
//!
//! ```
//! use std::time::Duration;
//! use loadpulse_core::{UiDispatcher, UiEventLoop};
//!
//! let ui = UiEventLoop::new();
//! let handle = ui.handle();
//!
//! std::thread::spawn(move || {
//!     handle.dispatch(Box::new(|| println!("on the UI thread")));
//! });
//!
//! ui.run_for(Duration::from_millis(50));
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;

use crate::executor::{UiDispatcher, UiJob};
use crate::logging::targets;

/// A job in flight between a [`UiHandle`] and the loop.
struct Envelope {
    run_at: Instant,
    seq: u64,
    job: UiJob,
}

/// An entry in the loop queue (min-heap by due time, then sequence).
struct QueueEntry(Envelope);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.run_at == other.0.run_at && self.0.seq == other.0.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .0
            .run_at
            .cmp(&self.0.run_at)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// A cloneable, thread-safe handle for posting jobs to a [`UiEventLoop`].
#[derive(Clone)]
pub struct UiHandle {
    sender: Sender<Envelope>,
    next_seq: Arc<AtomicU64>,
}

impl UiHandle {
    fn post(&self, run_at: Instant, job: UiJob) {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(Envelope { run_at, seq, job }).is_err() {
            tracing::debug!(target: targets::EVENT_LOOP, seq, "event loop gone, dropping job");
        }
    }
}

impl UiDispatcher for UiHandle {
    fn dispatch(&self, job: UiJob) {
        self.post(Instant::now(), job);
    }

    fn dispatch_after(&self, delay: Duration, job: UiJob) {
        self.post(Instant::now() + delay, job);
    }
}

impl std::fmt::Debug for UiHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiHandle").finish_non_exhaustive()
    }
}

/// The UI-thread side of the dispatcher.
///
/// The first thread that pumps the loop becomes its UI thread; pumping it from
/// any other thread afterwards panics.
pub struct UiEventLoop {
    handle: UiHandle,
    receiver: Receiver<Envelope>,
    queue: Mutex<BinaryHeap<QueueEntry>>,
    loop_thread: OnceLock<ThreadId>,
}

impl UiEventLoop {
    /// Create a new, empty event loop.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            handle: UiHandle {
                sender,
                next_seq: Arc::new(AtomicU64::new(0)),
            },
            receiver,
            queue: Mutex::new(BinaryHeap::new()),
            loop_thread: OnceLock::new(),
        }
    }

    /// Get a handle for posting jobs to this loop.
    pub fn handle(&self) -> UiHandle {
        self.handle.clone()
    }

    /// Check if the current thread is the one pumping this loop.
    ///
    /// Returns `true` before the loop has been pumped for the first time.
    pub fn is_loop_thread(&self) -> bool {
        match self.loop_thread.get() {
            Some(&id) => std::thread::current().id() == id,
            None => true,
        }
    }

    fn bind_thread(&self) {
        let current = std::thread::current().id();
        let bound = *self.loop_thread.get_or_init(|| current);
        assert!(
            bound == current,
            "UiEventLoop pumped from a different thread than the one it is bound to"
        );
    }

    /// Move everything posted so far into the local queue.
    fn drain_incoming(&self) {
        let mut queue = self.queue.lock();
        for envelope in self.receiver.try_iter() {
            queue.push(QueueEntry(envelope));
        }
    }

    /// Run every job that is due now.
    ///
    /// Jobs posted while processing with no delay run on the next call, so a
    /// job that re-posts itself cannot starve the caller.
    ///
    /// Returns the number of jobs executed.
    #[tracing::instrument(skip(self), target = "loadpulse_core::event_loop", level = "trace")]
    pub fn process_ready(&self) -> usize {
        self.bind_thread();
        let now = Instant::now();
        let seq_limit = self.handle.next_seq.load(Ordering::Acquire);
        let mut executed = 0;

        loop {
            self.drain_incoming();
            let job = {
                let mut queue = self.queue.lock();
                match queue.peek() {
                    Some(entry) if entry.0.run_at <= now && entry.0.seq < seq_limit => {
                        queue.pop().map(|entry| entry.0.job)
                    }
                    _ => None,
                }
            };
            let Some(job) = job else {
                break;
            };
            job();
            executed += 1;
        }

        if executed > 0 {
            tracing::trace!(target: targets::EVENT_LOOP, executed, "processed UI jobs");
        }
        executed
    }

    /// Get the duration until the next queued job is due, if any.
    pub fn time_until_next(&self) -> Option<Duration> {
        self.drain_incoming();
        self.queue
            .lock()
            .peek()
            .map(|entry| entry.0.run_at.saturating_duration_since(Instant::now()))
    }

    /// Get the number of jobs waiting in the loop.
    pub fn pending_count(&self) -> usize {
        self.drain_incoming();
        self.queue.lock().len()
    }

    /// Pump the loop until `condition` holds or `timeout` elapses.
    ///
    /// The condition is checked after every processing pass. Returns whether
    /// it was met.
    pub fn run_until<F>(&self, timeout: Duration, mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_ready();
            if condition() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let remaining = deadline - now;
            let wait = self
                .time_until_next()
                .map_or(remaining, |next| next.min(remaining));
            match self.receiver.recv_timeout(wait) {
                Ok(envelope) => self.queue.lock().push(QueueEntry(envelope)),
                Err(RecvTimeoutError::Timeout) => {}
                // Unreachable while `self` owns a sender; keep pumping regardless.
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(wait),
            }
        }
    }

    /// Pump the loop for `duration`, running jobs as they become due.
    pub fn run_for(&self, duration: Duration) {
        self.run_until(duration, || false);
    }
}

impl Default for UiEventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UiEventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiEventLoop")
            .field("pending", &self.queue.lock().len())
            .field("loop_thread", &self.loop_thread.get())
            .finish()
    }
}
