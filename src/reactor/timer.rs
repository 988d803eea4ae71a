use super::{Ready, TimerId, Token};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

/// An entry in the timer queue.
///
/// Entries are ordered by deadline, then by id so that timers sharing a
/// deadline fire in the order they were armed.
struct TimerEntry {
    deadline: Instant,
    id: TimerId,
    token: Token,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap<TimerEntry>` pops the earliest deadline.
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Heap size below which stale entries are left for `prune`.
const COMPACT_FLOOR: usize = 64;

/// One-shot timers keyed by deadline.
///
/// Cancellation is lazy: cancelled ids leave the live set at once and their
/// heap entries are skipped when they reach the top. Once stale entries
/// outnumber live ones the heap is rebuilt.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    live: HashSet<TimerId>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: Token, deadline: Instant) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.live.insert(id);
        self.heap.push(TimerEntry { deadline, id, token });
        id
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let removed = self.live.remove(&id);
        if self.heap.len() > COMPACT_FLOOR && self.heap.len() > 2 * self.live.len() {
            let live = &self.live;
            self.heap.retain(|entry| live.contains(&entry.id));
        }
        removed
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.prune();
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Moves every timer due at `now` into `ready`, earliest first.
    pub fn expire(&mut self, now: Instant, ready: &mut Vec<Ready>) -> usize {
        let mut fired = 0;
        loop {
            self.prune();
            match self.heap.peek() {
                Some(entry) if entry.deadline <= now => {}
                _ => break,
            }
            if let Some(entry) = self.heap.pop() {
                self.live.remove(&entry.id);
                ready.push(Ready::Timer { token: entry.token, timer: entry.id });
                fired += 1;
            }
        }
        fired
    }

    fn prune(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.live.contains(&entry.id) {
                break;
            }
            self.heap.pop();
        }
    }
}
