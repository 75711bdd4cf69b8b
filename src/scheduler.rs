use std::time::{Duration, Instant};

use crate::constants::MAX_SCHEDULER_TASKS;

#[derive(Clone, Copy, Debug)]
struct Task<T: Copy> {
    name: &'static str,
    run_at: Instant,
    period: Duration,
    task: T,
}

/// Fixed-capacity table of periodic timers keyed by task name.
///
/// Tasks are plain values; the owner pops the ones that are due and acts on
/// them. A task whose deadline has fallen more than one period behind
/// skips the missed firings instead of bursting to catch up.
pub struct Scheduler<T: Copy> {
    tasks: [Option<Task<T>>; MAX_SCHEDULER_TASKS],
}

impl<T: Copy> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T>
where
    T: Copy,
{
    pub fn new() -> Self {
        Self {
            tasks: [None; MAX_SCHEDULER_TASKS],
        }
    }

    /// Schedules a task that first fires after one `period` and then every
    /// `period` after that.
    pub fn add_periodic(&mut self, name: &'static str, period: Duration, task: T, now: Instant) -> bool {
        self.insert(Task {
            name,
            run_at: now + period,
            period,
            task,
        })
    }

    fn insert(&mut self, new_task: Task<T>) -> bool {
        self.cancel(new_task.name);

        match self.tasks.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(new_task);
                true
            }
            None => false,
        }
    }

    pub fn cancel(&mut self, name: &str) -> bool {
        let mut removed = false;
        for slot in self.tasks.iter_mut() {
            if matches!(slot, Some(task) if task.name == name) {
                *slot = None;
                removed = true;
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        self.tasks = [None; MAX_SCHEDULER_TASKS];
    }

    /// Earliest deadline in the table.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().flatten().map(|task| task.run_at).min()
    }

    /// Returns the earliest task that is due at `now` and advances its
    /// deadline. Tasks stay in the table until cancelled.
    pub fn pop_due(&mut self, now: Instant) -> Option<(&'static str, T)> {
        let slot = self
            .tasks
            .iter_mut()
            .filter(|slot| matches!(slot, Some(task) if task.run_at <= now))
            .min_by_key(|slot| slot.map(|task| task.run_at))?;

        let task = slot.as_mut()?;
        let fired = (task.name, task.task);

        let period = task.period;
        task.run_at += period;
        if task.run_at <= now {
            let behind = now.duration_since(task.run_at);
            let missed = behind.as_nanos() / period.as_nanos().max(1) + 1;
            task.run_at += period * missed as u32;
        }

        Some(fired)
    }
}
