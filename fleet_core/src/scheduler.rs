//! Cancellable deferred tasks on a virtual millisecond clock.
//!
//! Every animation frame, burst step, poll and replay tick is a [`Task`]
//! scheduled here. The owner drains due tasks with [`Scheduler::pop_due`] and
//! dispatches them; nothing runs on its own, so tests control time exactly and
//! can count what is outstanding.

use crate::types::VehicleId;
use std::collections::{BTreeMap, HashMap};

/// Handle returned by [`Scheduler::schedule`]; pass it to [`Scheduler::cancel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

/// Deferred work items understood by the controllers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Task {
    /// Next animation frame of a marker's tween
    Frame(VehicleId),
    /// Apply the next point of the current live burst
    BurstStep,
    /// Fetch a fresh snapshot batch
    Poll,
    /// Advance replay by one recorded point
    ReplayTick,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now: u64,
    next_seq: u64,
    /// (due, seq) orders ties by scheduling order
    queue: BTreeMap<(u64, u64), (TaskHandle, Task)>,
    index: HashMap<TaskHandle, (u64, u64)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule `task` to run `delay_ms` after the current time.
    pub fn schedule(&mut self, delay_ms: u64, task: Task) -> TaskHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let handle = TaskHandle(seq);
        let key = (self.now.saturating_add(delay_ms), seq);
        self.queue.insert(key, (handle, task));
        self.index.insert(handle, key);
        handle
    }

    /// Cancel a pending task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.index.remove(&handle) {
            Some(key) => self.queue.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.index.contains_key(&handle)
    }

    /// Number of outstanding tasks.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of outstanding tasks matching `pred`.
    pub fn pending_where(&self, pred: impl Fn(&Task) -> bool) -> usize {
        self.queue.values().filter(|(_, t)| pred(t)).count()
    }

    /// Due time of the earliest pending task.
    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|&(due, _)| due)
    }

    /// Remove and return the earliest task due at or before `until`, moving
    /// the clock to its due time. Tasks scheduled while dispatching are seen
    /// by later calls, so a chain runs to `until` in one drain loop.
    pub fn pop_due(&mut self, until: u64) -> Option<(TaskHandle, Task)> {
        let (&key, _) = self.queue.iter().next()?;
        if key.0 > until {
            return None;
        }
        let (handle, task) = self.queue.remove(&key)?;
        self.index.remove(&handle);
        self.now = self.now.max(key.0);
        Some((handle, task))
    }

    /// Move the clock forward after draining. Never moves backwards.
    pub fn advance_to(&mut self, now: u64) {
        self.now = self.now.max(now);
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_in_due_then_schedule_order() {
        let mut s = Scheduler::new();
        s.schedule(20, Task::Poll);
        s.schedule(10, Task::BurstStep);
        s.schedule(10, Task::ReplayTick);
        let order: Vec<Task> = std::iter::from_fn(|| s.pop_due(100).map(|(_, t)| t)).collect();
        assert_eq!(order, vec![Task::BurstStep, Task::ReplayTick, Task::Poll]);
        assert_eq!(s.now(), 20);
    }

    #[test]
    fn cancel_removes_exactly_one() {
        let mut s = Scheduler::new();
        let a = s.schedule(5, Task::Poll);
        let b = s.schedule(5, Task::Poll);
        assert!(s.cancel(a));
        assert!(!s.cancel(a), "second cancel is a no-op");
        assert_eq!(s.pending(), 1);
        assert!(s.is_pending(b));
        assert!(!s.is_pending(a));
    }

    #[test]
    fn pop_due_respects_horizon() {
        let mut s = Scheduler::new();
        s.schedule(50, Task::Poll);
        assert!(s.pop_due(49).is_none());
        s.advance_to(49);
        assert_eq!(s.now(), 49);
        assert!(s.pop_due(50).is_some());
    }

    #[test]
    fn delays_are_relative_to_clock() {
        let mut s = Scheduler::new();
        s.advance_to(1000);
        s.schedule(10, Task::Poll);
        assert_eq!(s.next_due(), Some(1010));
        assert_eq!(s.pending_where(|t| *t == Task::Poll), 1);
        assert_eq!(s.pending_where(|t| *t == Task::BurstStep), 0);
    }
}
