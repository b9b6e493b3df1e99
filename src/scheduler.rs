//! Scheduled-task queue.
//!
//! All deferred work (session timers, UI handoffs, notification draining,
//! auto-save) is an entry in a [`Scheduler`]. Nothing runs by itself: the
//! owner asks for due tasks with [`Scheduler::pop_due`] and dispatches them.
//! Tasks due at the same instant come out in scheduling order.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};

/// Handle to a scheduled task, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

/// Work the application schedules for later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Post-login handoff: leave the login screen.
    ShowMainApp,
    /// Post-logout handoff: back to the login screen.
    ShowLoginScreen,
    SessionWarning,
    SessionExpired,
    DrainNotifications,
    DismissNotification(u64),
    RememberMeCheck,
    AutoSave,
    HealthCheck,
    WelcomeNotice,
}

#[derive(Debug)]
pub struct Scheduler<T> {
    next_seq: u64,
    queue: BTreeMap<(DateTime<Utc>, u64), T>,
    due_by_seq: HashMap<u64, DateTime<Utc>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Scheduler {
            next_seq: 0,
            queue: BTreeMap::new(),
            due_by_seq: HashMap::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, due: DateTime<Utc>, task: T) -> TaskHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((due, seq), task);
        self.due_by_seq.insert(seq, due);
        TaskHandle(seq)
    }

    pub fn schedule_after(&mut self, now: DateTime<Utc>, delay: Duration, task: T) -> TaskHandle {
        self.schedule_at(now + delay, task)
    }

    /// Cancel a pending task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.due_by_seq.remove(&handle.0) {
            Some(due) => self.queue.remove(&(due, handle.0)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.due_by_seq.contains_key(&handle.0)
    }

    pub fn due_time(&self, handle: TaskHandle) -> Option<DateTime<Utc>> {
        self.due_by_seq.get(&handle.0).copied()
    }

    /// Remove and return the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(TaskHandle, DateTime<Utc>, T)> {
        let (&(due, seq), _) = self.queue.iter().next()?;
        if due > now {
            return None;
        }
        let task = self.queue.remove(&(due, seq))?;
        self.due_by_seq.remove(&seq);
        Some((TaskHandle(seq), due, task))
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = (&DateTime<Utc>, &T)> {
        self.queue.iter().map(|((due, _), task)| (due, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_pop_due_respects_time() {
        let mut sched = Scheduler::new();
        sched.schedule_after(t0(), Duration::seconds(10), "later");
        sched.schedule_after(t0(), Duration::seconds(1), "sooner");

        assert!(sched.pop_due(t0()).is_none());
        let (_, _, task) = sched.pop_due(t0() + Duration::seconds(5)).unwrap();
        assert_eq!(task, "sooner");
        assert!(sched.pop_due(t0() + Duration::seconds(5)).is_none());
        let (_, _, task) = sched.pop_due(t0() + Duration::seconds(10)).unwrap();
        assert_eq!(task, "later");
        assert!(sched.is_empty());
    }

    #[test]
    fn test_same_instant_keeps_insertion_order() {
        let mut sched = Scheduler::new();
        sched.schedule_at(t0(), 1);
        sched.schedule_at(t0(), 2);
        sched.schedule_at(t0(), 3);

        let order: Vec<i32> = std::iter::from_fn(|| sched.pop_due(t0()).map(|(_, _, t)| t)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_cancel() {
        let mut sched = Scheduler::new();
        let handle = sched.schedule_at(t0(), "x");
        assert!(sched.is_pending(handle));
        assert!(sched.cancel(handle));
        assert!(!sched.is_pending(handle));
        assert!(!sched.cancel(handle));
        assert!(sched.pop_due(t0()).is_none());
    }

    #[test]
    fn test_cancel_after_run_is_noop() {
        let mut sched = Scheduler::new();
        let handle = sched.schedule_at(t0(), "x");
        sched.pop_due(t0()).unwrap();
        assert!(!sched.cancel(handle));
    }

    #[test]
    fn test_next_due() {
        let mut sched: Scheduler<()> = Scheduler::new();
        assert_eq!(sched.next_due(), None);
        sched.schedule_after(t0(), Duration::minutes(3), ());
        sched.schedule_after(t0(), Duration::minutes(1), ());
        assert_eq!(sched.next_due(), Some(t0() + Duration::minutes(1)));
    }

    proptest! {
        #[test]
        fn prop_tasks_come_out_sorted(delays in proptest::collection::vec(0i64..10_000, 1..50)) {
            let mut sched = Scheduler::new();
            for (i, d) in delays.iter().enumerate() {
                sched.schedule_after(t0(), Duration::milliseconds(*d), i);
            }
            let end = t0() + Duration::seconds(10);
            let mut last = None;
            let mut count = 0;
            while let Some((_, due, _)) = sched.pop_due(end) {
                if let Some(prev) = last {
                    prop_assert!(prev <= due);
                }
                last = Some(due);
                count += 1;
            }
            prop_assert_eq!(count, delays.len());
        }
    }
}
