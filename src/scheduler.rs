//! Min-heap task scheduler used by the server engine, client engine, and
//! connection state machines to drive periodic auto-transmit, `on_timer`,
//! select-timeout expiry, and T1/T2/T3 bookkeeping off of one clock.
//!
//! Grounded on `types.h`'s `Task`, whose `operator<` inverts the natural
//! ordering so a `std::priority_queue` (a max-heap) pops the earliest
//! `schedule_time` first. `std::collections::BinaryHeap` is likewise a
//! max-heap, so [`Entry`] applies the same inversion.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

/// If a task fires this much later than its scheduled time, the caller
/// should log a delay warning. Mirrors `TASK_DELAY_THRESHOLD`.
pub const TASK_DELAY_THRESHOLD: Duration = Duration::from_millis(100);

/// Opaque handle returned by [`Scheduler::schedule`], usable with
/// [`Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

struct Entry<T> {
    due: Instant,
    id: TaskId,
    payload: Option<T>,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}
impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want earliest `due` first.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

/// A single due task, returned by [`Scheduler::pop_ready`].
pub struct Due<T> {
    /// The task's identity, usable to recognize which task fired.
    pub id: TaskId,
    /// How late this task fired relative to its scheduled time.
    pub delay: Duration,
    /// The task's payload.
    pub payload: T,
}

/// A min-heap of scheduled payloads, ordered by due time. Generic over the
/// payload so the server engine, client engine, and connection state
/// machines can each schedule their own task enum without this module
/// knowing about any of them.
pub struct Scheduler<T> {
    heap: BinaryHeap<Entry<T>>,
    next_id: AtomicU64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> Scheduler<T> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `payload` to fire at `due`, returning a handle that can
    /// later be passed to [`Scheduler::cancel`].
    pub fn schedule(&mut self, due: Instant, payload: T) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, AtomicOrdering::Relaxed));
        self.heap.push(Entry {
            due,
            id,
            payload: Some(payload),
        });
        id
    }

    /// Schedule `payload` to fire `delay` from now.
    pub fn schedule_after(&mut self, delay: Duration, payload: T) -> TaskId {
        self.schedule(Instant::now() + delay, payload)
    }

    /// Cancel a previously scheduled task. Returns true if it was still
    /// pending (lazily removed: the slot is tombstoned, not re-heapified).
    pub fn cancel(&mut self, id: TaskId) -> bool {
        for entry in self.heap.iter_mut() {
            if entry.id == id && entry.payload.is_some() {
                entry.payload = None;
                return true;
            }
        }
        false
    }

    /// When the next pending task is due, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.due)
    }

    /// Pop every task due at or before `now`, in due-time order, skipping
    /// cancelled entries.
    pub fn pop_ready(&mut self, now: Instant) -> Vec<Due<T>> {
        let mut ready = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.due > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry must pop");
            if let Some(payload) = entry.payload {
                ready.push(Due {
                    id: entry.id,
                    delay: now.saturating_duration_since(entry.due),
                    payload,
                });
            }
        }
        ready
    }

    /// Number of pending tasks, including lazily-cancelled tombstones not
    /// yet popped.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if there are no pending tasks.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
