//! Test Scheduler for deterministic testing.
//!
//! Provides virtual time that only advances when explicitly instructed, so
//! tests can observe the state of a pipeline between two scheduler ticks.
//!
//! # Usage
//!
//! ```rust
//! use rxbackpressure::scheduler::{Duration, Scheduler, TestScheduler};
//!
//! let scheduler = TestScheduler::new();
//! scheduler.schedule(Box::new(|| println!("deferred")));
//! assert_eq!(scheduler.pending_count(), 1);
//!
//! // Run everything due within the next tick
//! scheduler.advance_by(Duration::from_millis(1));
//! assert!(scheduler.is_empty());
//! ```
//!
//! Clones share the same clock and queue, and the scheduler is `Send +
//! Sync`, so a clone can be handed to a pipeline while the test keeps
//! another one to drive time.

use std::{cmp::Ordering, collections::BinaryHeap};

use super::{Duration, Scheduler, Task};
use crate::rc::MutArc;

// ==================== Internal State ====================

#[derive(Default)]
struct TestSchedulerState {
  virtual_time: Duration,
  task_queue: BinaryHeap<ScheduledTask>,
  next_task_id: usize,
}

struct ScheduledTask {
  scheduled_time: Duration,
  task_id: usize,
  task: Task,
}

impl PartialEq for ScheduledTask {
  fn eq(&self, other: &Self) -> bool {
    self.scheduled_time == other.scheduled_time && self.task_id == other.task_id
  }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ScheduledTask {
  fn cmp(&self, other: &Self) -> Ordering {
    // Min-heap: earlier times first, then FIFO by task_id
    other
      .scheduled_time
      .cmp(&self.scheduled_time)
      .then_with(|| other.task_id.cmp(&self.task_id))
  }
}

// ==================== TestScheduler ====================

/// A virtual time scheduler for deterministic testing.
#[derive(Clone, Default)]
pub struct TestScheduler(MutArc<TestSchedulerState>);

impl TestScheduler {
  pub fn new() -> Self { Self::default() }

  /// Get the current virtual time.
  pub fn now(&self) -> Duration { self.0.rc_deref_mut().virtual_time }

  /// Get the number of pending tasks in the queue.
  pub fn pending_count(&self) -> usize { self.0.rc_deref_mut().task_queue.len() }

  /// Check if there are no pending tasks.
  pub fn is_empty(&self) -> bool { self.0.rc_deref_mut().task_queue.is_empty() }

  /// Queue `task` to run once virtual time reached `now() + delay`.
  pub fn schedule_after(&self, delay: Duration, task: Task) {
    let mut state = self.0.rc_deref_mut();
    let task_id = state.next_task_id;
    let scheduled_time = state.virtual_time + delay;
    state.next_task_id += 1;
    state.task_queue.push(ScheduledTask { scheduled_time, task_id, task });
  }

  fn execute_tasks_until(&self, target_time: Option<Duration>) {
    loop {
      let task = {
        let mut state = self.0.rc_deref_mut();

        // Check if we should stop (no tasks or past target time)
        let due = state
          .task_queue
          .peek()
          .is_some_and(|peek| target_time.is_none_or(|limit| peek.scheduled_time <= limit));
        if !due {
          break;
        }

        let Some(scheduled_task) = state.task_queue.pop() else {
          break;
        };
        state.virtual_time = state.virtual_time.max(scheduled_task.scheduled_time);
        scheduled_task.task
      };

      // the lock is released, tasks may schedule more work
      task();
    }
  }

  /// Advance virtual time by the specified duration and execute due tasks.
  ///
  /// Tasks are executed in order of their scheduled time, with FIFO ordering
  /// for tasks scheduled at the same time. Tasks scheduled while advancing
  /// run in the same call if they are due.
  pub fn advance_by(&self, duration: Duration) {
    let target_time = self.now() + duration;
    self.execute_tasks_until(Some(target_time));
    self.0.rc_deref_mut().virtual_time = target_time;
  }

  /// Execute all pending tasks, advancing time to each task's scheduled
  /// time.
  pub fn flush(&self) { self.execute_tasks_until(None); }
}

impl Scheduler for TestScheduler {
  #[inline]
  fn schedule(&self, task: Task) { self.schedule_after(Duration::ZERO, task) }
}
