//! Thread-safe time-ordered event queue
//!
//! A `BinaryHeap` with reversed `Ord` acts as a min-heap keyed by
//! `(time, sequence)`. Sequence numbers increase with every insertion, so
//! events at the same time come out in insertion order and a run with a fixed
//! seed always dispatches in the same order.
//!
//! The heap sits behind a mutex. A condition variable paired with a
//! generation counter lets the scheduler sleep until another thread inserts
//! something.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::simulation::{SimulationError, SimulationResult};

/// Anything with a position on the virtual timeline
pub trait Timed {
    /// Time in epoch seconds
    fn time(&self) -> f64;

    /// Move to a different time
    fn set_time(&mut self, t: f64);
}

struct Entry<E> {
    time: f64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the smallest (time, seq) is the heap's maximum
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState<E> {
    heap: BinaryHeap<Entry<E>>,
    next_seq: u64,
    generation: u64,
    frontier: f64,
    closed: bool,
}

/// Pending events ordered by time, safe to share between threads
pub struct EventQueue<E> {
    state: Mutex<QueueState<E>>,
    changed: Condvar,
}

impl<E> std::fmt::Debug for EventQueue<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventQueue")
            .field("len", &state.heap.len())
            .field("generation", &state.generation)
            .field("frontier", &state.frontier)
            .field("closed", &state.closed)
            .finish()
    }
}

impl<E> EventQueue<E> {
    fn lock(&self) -> MutexGuard<'_, QueueState<E>> {
        // Recover from poisoning; no critical section leaves the heap torn
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Timed> EventQueue<E> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                generation: 0,
                frontier: f64::NEG_INFINITY,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Add an event
    ///
    /// Returns `false`, dropping the event, when the queue is closed or the
    /// event's time is not a number.
    pub fn insert(&self, event: E) -> bool {
        let time = event.time();
        let mut state = self.lock();
        if state.closed || time.is_nan() {
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry { time, seq, event });
        state.generation = state.generation.wrapping_add(1);
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Add an event no earlier than the last event popped
    ///
    /// Used for events arriving from outside the scheduler thread, which may
    /// race with dispatch. The check and the insertion happen under one lock.
    pub fn insert_not_before_frontier(&self, mut event: E) -> bool {
        let mut state = self.lock();
        if state.closed || event.time().is_nan() {
            return false;
        }
        if event.time() < state.frontier {
            let frontier = state.frontier;
            event.set_time(frontier);
        }
        let time = event.time();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry { time, seq, event });
        state.generation = state.generation.wrapping_add(1);
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Remove and return the earliest event
    pub fn pop_earliest(&self) -> SimulationResult<E> {
        let mut state = self.lock();
        let entry = state.heap.pop().ok_or(SimulationError::EmptyQueue)?;
        if entry.time > state.frontier {
            state.frontier = entry.time;
        }
        Ok(entry.event)
    }

    /// Time of the earliest event
    pub fn peek_next_time(&self) -> Option<f64> {
        self.lock().heap.peek().map(|e| e.time)
    }

    /// Time of the earliest event together with the current generation
    ///
    /// Pass the generation to [`wait_for_change`](Self::wait_for_change) to
    /// sleep until something newer arrives.
    pub fn peek_with_generation(&self) -> (Option<f64>, u64) {
        let state = self.lock();
        (state.heap.peek().map(|e| e.time), state.generation)
    }

    /// Block until the queue changes after generation `seen`, it is closed,
    /// or `timeout` passes
    ///
    /// Returns `true` if woken by a change.
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.generation != seen || state.closed {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Wake any waiter without adding an event
    pub fn wake(&self) {
        let mut state = self.lock();
        state.generation = state.generation.wrapping_add(1);
        drop(state);
        self.changed.notify_all();
    }

    /// Refuse further insertions and wake any waiter
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    /// Whether the queue refuses insertions
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Whether no event is pending
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Remove every pending event in dispatch order
    pub fn drain_ordered(&self) -> Vec<E> {
        let mut state = self.lock();
        let mut events = Vec::with_capacity(state.heap.len());
        while let Some(entry) = state.heap.pop() {
            events.push(entry.event);
        }
        events
    }
}

impl<E: Timed> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, PartialEq)]
    struct Marker {
        at: f64,
        tag: &'static str,
    }

    impl Timed for Marker {
        fn time(&self) -> f64 {
            self.at
        }

        fn set_time(&mut self, t: f64) {
            self.at = t;
        }
    }

    fn marker(at: f64, tag: &'static str) -> Marker {
        Marker { at, tag }
    }

    #[test]
    fn test_pops_in_time_order() {
        let queue = EventQueue::new();
        queue.insert(marker(30.0, "c"));
        queue.insert(marker(10.0, "a"));
        queue.insert(marker(20.0, "b"));

        assert_eq!(queue.peek_next_time(), Some(10.0));
        let tags: Vec<_> = queue.drain_ordered().into_iter().map(|m| m.tag).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_fifo_at_same_time() {
        let queue = EventQueue::new();
        queue.insert(marker(10.0, "first"));
        queue.insert(marker(10.0, "second"));
        queue.insert(marker(5.0, "early"));
        queue.insert(marker(10.0, "third"));

        let tags: Vec<_> = queue.drain_ordered().into_iter().map(|m| m.tag).collect();
        assert_eq!(tags, vec!["early", "first", "second", "third"]);
    }

    #[test]
    fn test_pop_empty_is_error() {
        let queue: EventQueue<Marker> = EventQueue::new();
        assert!(queue.is_empty());
        assert!(matches!(queue.pop_earliest(), Err(SimulationError::EmptyQueue)));
        assert_eq!(queue.peek_next_time(), None);
    }

    #[test]
    fn test_nan_time_rejected() {
        let queue = EventQueue::new();
        assert!(!queue.insert(marker(f64::NAN, "bad")));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_closed_queue_rejects_inserts() {
        let queue = EventQueue::new();
        queue.close();
        assert!(queue.is_closed());
        assert!(!queue.insert(marker(1.0, "late")));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_insert_not_before_frontier_clamps() {
        let queue = EventQueue::new();
        queue.insert(marker(100.0, "dispatched"));
        queue.pop_earliest().unwrap();

        queue.insert_not_before_frontier(marker(40.0, "stale"));
        let event = queue.pop_earliest().unwrap();
        assert_eq!(event.tag, "stale");
        assert_eq!(event.at, 100.0);
    }

    #[test]
    fn test_wait_for_change_times_out() {
        let queue: EventQueue<Marker> = EventQueue::new();
        let (_, generation) = queue.peek_with_generation();
        assert!(!queue.wait_for_change(generation, Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_for_change_wakes_on_insert() {
        let queue = Arc::new(EventQueue::new());
        let (_, generation) = queue.peek_with_generation();

        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.insert(marker(1.0, "wake"));
        });

        assert!(queue.wait_for_change(generation, Duration::from_secs(5)));
        handle.join().unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_wait_returns_immediately_after_missed_insert() {
        let queue = EventQueue::new();
        let (_, generation) = queue.peek_with_generation();
        queue.insert(marker(1.0, "already here"));
        assert!(queue.wait_for_change(generation, Duration::from_secs(5)));
    }

    #[test]
    fn test_concurrent_inserts_keep_every_event() {
        let queue = Arc::new(EventQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.insert(marker((i * 4 + worker) as f64, "x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let times: Vec<f64> = queue.drain_ordered().iter().map(|m| m.at).collect();
        assert_eq!(times.len(), 1000);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
