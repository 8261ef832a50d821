//! Scheduler - timer abstraction and the virtual-time implementation

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::world::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Timer interface the engine is written against.
///
/// Tasks are plain values handed back by [`Scheduler::fire_next`] when they
/// come due; the owner decides how to dispatch them.
pub trait Scheduler<T> {
    fn now(&self) -> Millis;
    fn schedule_once(&mut self, delay: Millis, task: T) -> TimerId;
    fn schedule_periodic(&mut self, period: Millis, task: T) -> TimerId;
    /// Returns false if the timer already fired (one-shot) or was cancelled.
    fn cancel(&mut self, id: TimerId) -> bool;
    fn pending(&self) -> usize;
    /// Pops the earliest task due at or before `until`, moving the clock to
    /// its due time. Ties fire in the order they were queued.
    fn fire_next(&mut self, until: Millis) -> Option<T>;
    /// Moves the clock forward to `until` once nothing more is due.
    fn settle(&mut self, until: Millis);
}

struct Timer<T> {
    task: T,
    period: Option<Millis>,
}

/// Deterministic scheduler whose clock only moves when driven.
pub struct VirtualScheduler<T> {
    now: Millis,
    next_id: u64,
    sequence: u64,
    queue: BinaryHeap<Reverse<(Millis, u64, TimerId)>>,
    timers: HashMap<TimerId, Timer<T>>,
}

impl<T> Default for VirtualScheduler<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> VirtualScheduler<T> {
    pub fn new(start: Millis) -> Self {
        Self {
            now: start,
            next_id: 0,
            sequence: 0,
            queue: BinaryHeap::new(),
            timers: HashMap::new(),
        }
    }

    fn insert(&mut self, delay: Millis, task: T, period: Option<Millis>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(id, Timer { task, period });
        self.enqueue(self.now.saturating_add(delay.max(0)), id);
        id
    }

    fn enqueue(&mut self, due: Millis, id: TimerId) {
        self.queue.push(Reverse((due, self.sequence, id)));
        self.sequence += 1;
    }
}

impl<T: Clone> Scheduler<T> for VirtualScheduler<T> {
    fn now(&self) -> Millis {
        self.now
    }

    fn schedule_once(&mut self, delay: Millis, task: T) -> TimerId {
        self.insert(delay, task, None)
    }

    fn schedule_periodic(&mut self, period: Millis, task: T) -> TimerId {
        let period = period.max(1);
        self.insert(period, task, Some(period))
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    fn pending(&self) -> usize {
        self.timers.len()
    }

    fn fire_next(&mut self, until: Millis) -> Option<T> {
        loop {
            let Reverse((due, _, id)) = *self.queue.peek()?;
            if due > until {
                return None;
            }
            self.queue.pop();
            // Cancelled timers leave stale queue entries behind.
            let Some(period) = self.timers.get(&id).map(|timer| timer.period) else {
                continue;
            };
            self.now = self.now.max(due);
            match period {
                Some(period) => {
                    let task = self.timers.get(&id).map(|timer| timer.task.clone());
                    self.enqueue(due.saturating_add(period), id);
                    return task;
                }
                None => return self.timers.remove(&id).map(|timer| timer.task),
            }
        }
    }

    fn settle(&mut self, until: Millis) {
        self.now = self.now.max(until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(
        scheduler: &mut VirtualScheduler<&'static str>,
        until: Millis,
    ) -> Vec<(Millis, &'static str)> {
        let mut fired = Vec::new();
        while let Some(task) = scheduler.fire_next(until) {
            fired.push((scheduler.now(), task));
        }
        scheduler.settle(until);
        fired
    }

    #[test]
    fn one_shot_fires_once_at_due_time() {
        let mut scheduler = VirtualScheduler::new(0);
        scheduler.schedule_once(800, "remove");
        assert!(drain(&mut scheduler, 799).is_empty());
        assert_eq!(drain(&mut scheduler, 800), vec![(800, "remove")]);
        assert!(drain(&mut scheduler, 5_000).is_empty());
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.now(), 5_000);
    }

    #[test]
    fn periodic_timers_interleave_in_order() {
        let mut scheduler = VirtualScheduler::new(0);
        scheduler.schedule_periodic(500, "aging");
        scheduler.schedule_periodic(1_000, "reaper");
        let fired = drain(&mut scheduler, 2_000);
        assert_eq!(
            fired,
            vec![
                (500, "aging"),
                (1_000, "reaper"),
                (1_000, "aging"),
                (1_500, "aging"),
                (2_000, "reaper"),
                (2_000, "aging"),
            ]
        );
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut scheduler = VirtualScheduler::new(0);
        let periodic = scheduler.schedule_periodic(100, "tick");
        let once = scheduler.schedule_once(50, "once");
        assert!(scheduler.cancel(once));
        assert_eq!(drain(&mut scheduler, 250).len(), 2);
        assert!(scheduler.cancel(periodic));
        assert!(!scheduler.cancel(periodic));
        assert!(drain(&mut scheduler, 1_000).is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn huge_delays_saturate_instead_of_overflowing() {
        let mut scheduler = VirtualScheduler::new(10);
        scheduler.schedule_once(Millis::MAX, "never");
        scheduler.schedule_periodic(Millis::MAX - 5, "rare");
        assert!(drain(&mut scheduler, Millis::MAX - 1).is_empty());
        assert_eq!(scheduler.pending(), 2);
        assert_eq!(scheduler.now(), Millis::MAX - 1);
    }

    #[test]
    fn negative_delay_fires_immediately() {
        let mut scheduler = VirtualScheduler::new(100);
        scheduler.schedule_once(-20, "late");
        assert_eq!(drain(&mut scheduler, 100), vec![(100, "late")]);
    }
}
