//! Scheduling contract.
//!
//! The core never spawns threads itself. Every deferred piece of work is
//! handed to a [`Scheduler`] that runs it at some later point, possibly
//! immediately and possibly on another thread. Adapters for the
//! `futures` thread pool and tokio runtime handles are provided behind the
//! `futures-scheduler` and `tokio-scheduler` features.

use std::sync::Arc;

mod test_scheduler;
pub use test_scheduler::TestScheduler;

pub use std::time::Duration;

/// A unit of scheduled work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Accepts actions and guarantees to run each of them eventually.
pub trait Scheduler: Send + Sync {
  fn schedule(&self, task: Task);
}

/// Type-erased scheduler handed through subscriptions.
pub type SharedScheduler = Arc<dyn Scheduler>;

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
  #[inline]
  fn schedule(&self, task: Task) { (**self).schedule(task) }
}

/// Runs every task inline, on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
  #[inline]
  fn schedule(&self, task: Task) { task() }
}

#[cfg(feature = "futures-scheduler")]
mod thread_pool {
  use futures::executor::ThreadPool;
  use once_cell::sync::Lazy;

  use super::{Scheduler, Task};

  static DEFAULT_POOL: Lazy<Option<ThreadPool>> = Lazy::new(|| {
    ThreadPool::new()
      .map_err(|err| tracing::error!(%err, "failed to create the default thread pool"))
      .ok()
  });

  /// The lazily created process-wide thread pool, `None` if the pool could
  /// not be started.
  pub fn thread_pool() -> Option<ThreadPool> { DEFAULT_POOL.clone() }

  impl Scheduler for ThreadPool {
    fn schedule(&self, task: Task) { self.spawn_ok(async move { task() }); }
  }
}

#[cfg(feature = "futures-scheduler")]
pub use thread_pool::thread_pool;

#[cfg(feature = "tokio-scheduler")]
impl Scheduler for tokio::runtime::Handle {
  fn schedule(&self, task: Task) {
    // detached, the task owns everything it needs
    drop(self.spawn(async move { task() }));
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};

  use super::*;

  #[test]
  fn immediate_runs_inline() {
    let ran = Arc::new(AtomicBool::new(false));
    let c_ran = ran.clone();
    ImmediateScheduler.schedule(Box::new(move || c_ran.store(true, Ordering::SeqCst)));
    assert!(ran.load(Ordering::SeqCst));
  }

  #[test]
  fn shared_scheduler_delegates() {
    let shared: SharedScheduler = Arc::new(ImmediateScheduler);
    let ran = Arc::new(AtomicBool::new(false));
    let c_ran = ran.clone();
    shared.schedule(Box::new(move || c_ran.store(true, Ordering::SeqCst)));
    assert!(ran.load(Ordering::SeqCst));
  }

  #[cfg(feature = "futures-scheduler")]
  #[test]
  fn thread_pool_runs_elsewhere() {
    let pool = thread_pool().unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    pool.schedule(Box::new(move || tx.send(std::thread::current().id()).unwrap()));
    let id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_ne!(id, std::thread::current().id());
  }

  #[cfg(feature = "tokio-scheduler")]
  #[tokio::test(flavor = "multi_thread")]
  async fn tokio_handle_runs_task() {
    let (tx, rx) = futures::channel::oneshot::channel();
    tokio::runtime::Handle::current().schedule(Box::new(move || {
      let _ = tx.send(1);
    }));
    assert_eq!(rx.await, Ok(1));
  }
}
