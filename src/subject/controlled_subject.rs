//! Buffering subject that replays to each observer at its own pace.
//!
//! Every pushed value is appended to a [`DequeuableBuffer`]. Each observer
//! owns a cursor into that buffer and only moves it forward when its
//! acknowledgment for the element under the cursor resolves `Continue`.
//! Elements every observer moved past are dequeued, so the buffer holds
//! exactly the gap between the producer and the slowest observer.
//!
//! ```text
//!   first_idx             slow cursor      fast cursor   last_idx
//!      |                       |                |            |
//!      [  reclaimed ...        |  x  |  x  |  x |  x  |  x  ]
//! ```

use super::{subscribers::Subscribers, Terminal};
use crate::{
  ack::{continue_ack, stop_ack, Ack, Outcome},
  buffer::DequeuableBuffer,
  error::{fail_fast, ProtocolViolation},
  observable::Observable,
  observer::{BoxedObserver, Observer},
  rc::MutArc,
  scheduler::SharedScheduler,
  subscription::{SharedSubscription, Teardown},
};

type SharedObserver<Item, Err> = MutArc<BoxedObserver<Item, Err>>;

struct Slot<Item, Err> {
  observer: SharedObserver<Item, Err>,
  /// Index of the next element to deliver.
  cursor: usize,
  /// The element under the cursor was sent and is not acknowledged yet.
  in_flight: bool,
}

struct ControlledState<Item, Err> {
  buffer: DequeuableBuffer<Item>,
  subscribers: Subscribers<Slot<Item, Err>>,
  capacity: Option<usize>,
  terminal: Option<Terminal<Err>>,
  /// Every observer answered `Stop`.
  stopped: bool,
  /// Acknowledgment handed to the producer while the buffer is full.
  blocked: Option<Ack>,
}

impl<Item, Err> ControlledState<Item, Err> {
  /// Drop the elements every observer has moved past.
  fn reclaim(&mut self) {
    let watermark = self
      .subscribers
      .iter()
      .map(|slot| slot.cursor)
      .min()
      .unwrap_or_else(|| self.buffer.last_idx());
    if watermark > 0 {
      self.buffer.dequeue(watermark - 1);
    }
  }

  fn release_producer(&mut self) -> Option<(Ack, Outcome)> {
    let outcome = if self.stopped {
      Outcome::Stop
    } else if self.capacity.is_none_or(|capacity| self.buffer.len() < capacity) {
      Outcome::Continue
    } else {
      return None;
    };
    self.blocked.take().map(|ack| (ack, outcome))
  }
}

enum Step<Item, Err> {
  Deliver(SharedObserver<Item, Err>, Item),
  Complete(SharedObserver<Item, Err>),
  Idle,
}

/// A hot source gated by the acknowledgments of its observers.
///
/// The subject is hot: an observer receives the values pushed after it
/// subscribed. Values are retained until every current observer
/// acknowledged them. With [`with_capacity`](Self::with_capacity) the
/// producer is answered with a pending acknowledgment once that many values
/// are retained, and released when the slowest observer catches up.
///
/// Completion is delivered to each observer after it drained the buffer;
/// errors are delivered immediately and discard the buffer.
pub struct ControlledSubject<Item, Err>(MutArc<ControlledState<Item, Err>>);

impl<Item, Err> Clone for ControlledSubject<Item, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item, Err> Default for ControlledSubject<Item, Err> {
  fn default() -> Self { Self::build(None) }
}

impl<Item, Err> ControlledSubject<Item, Err> {
  /// A subject that retains as many values as the slowest observer needs.
  pub fn new() -> Self { Self::default() }

  /// A subject that holds the producer back once `capacity` values are
  /// retained.
  ///
  /// # Panics
  ///
  /// Panics if `capacity` is zero.
  pub fn with_capacity(capacity: usize) -> Self {
    assert!(capacity > 0, "controlled subject capacity must be positive");
    Self::build(Some(capacity))
  }

  fn build(capacity: Option<usize>) -> Self {
    Self(MutArc::own(ControlledState {
      buffer: DequeuableBuffer::new(),
      subscribers: Subscribers::default(),
      capacity,
      terminal: None,
      stopped: false,
      blocked: None,
    }))
  }

  /// Number of values waiting for at least one observer.
  pub fn buffered_len(&self) -> usize { self.0.rc_deref_mut().buffer.len() }

  pub fn observer_count(&self) -> usize { self.0.rc_deref_mut().subscribers.len() }

  /// True once every observer answered `Stop`; pushes are refused from
  /// then on.
  pub fn is_stopped(&self) -> bool { self.0.rc_deref_mut().stopped }

  fn acknowledge(&self, id: usize, outcome: Outcome) {
    let release = {
      let mut state = self.0.rc_deref_mut();
      match outcome {
        Outcome::Continue => {
          if let Some(slot) = state.subscribers.get_mut(id) {
            slot.cursor += 1;
            slot.in_flight = false;
          }
        }
        Outcome::Stop => {
          if state.subscribers.remove(id).is_some() {
            tracing::debug!(id, "controlled subject observer stopped");
            if state.subscribers.is_empty() {
              state.stopped = true;
            }
          }
        }
      }
      state.reclaim();
      state.release_producer()
    };
    if let Some((ack, outcome)) = release {
      ack.resolve(outcome);
    }
  }

  fn detach(&self, id: usize) {
    let release = {
      let mut state = self.0.rc_deref_mut();
      let _removed = state.subscribers.remove(id);
      state.reclaim();
      state.release_producer()
    };
    if let Some((ack, outcome)) = release {
      ack.resolve(outcome);
    }
  }
}

impl<Item, Err> ControlledSubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Send + 'static,
{
  /// Send buffered values to observer `id` until it is caught up or an
  /// acknowledgment is pending.
  fn drain(&self, id: usize) {
    loop {
      let step = {
        let mut state = self.0.rc_deref_mut();
        let state = &mut *state;
        let Some(slot) = state.subscribers.get_mut(id) else {
          return;
        };
        if slot.in_flight {
          Step::Idle
        } else if slot.cursor < state.buffer.last_idx() {
          let value = match state.buffer.get(slot.cursor) {
            Ok(value) => value.clone(),
            Err(err) => fail_fast(err.into()),
          };
          slot.in_flight = true;
          Step::Deliver(slot.observer.clone(), value)
        } else if matches!(state.terminal, Some(Terminal::Completed)) {
          let observer = slot.observer.clone();
          let _removed = state.subscribers.remove(id);
          Step::Complete(observer)
        } else {
          Step::Idle
        }
      };

      match step {
        Step::Deliver(observer, value) => {
          let ack = observer.rc_deref_mut().on_next(value);
          match ack.value() {
            Some(outcome) => self.acknowledge(id, outcome),
            None => {
              let subject = self.clone();
              ack.on_resolved(move |outcome| {
                subject.acknowledge(id, outcome);
                subject.drain(id);
              });
              return;
            }
          }
        }
        Step::Complete(observer) => {
          tracing::debug!(id, "controlled subject observer completed");
          observer.rc_deref_mut().on_completed();
          return;
        }
        Step::Idle => return,
      }
    }
  }
}

impl<Item, Err> Observer<Item, Err> for ControlledSubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn on_next(&mut self, value: Item) -> Ack {
    let (ids, ack) = {
      let mut state = self.0.rc_deref_mut();
      if state.terminal.is_some() || state.stopped {
        return stop_ack();
      }
      if state.blocked.is_some() {
        drop(state);
        fail_fast(ProtocolViolation::EmissionBeforeAck {
          operator: "controlled_subject",
          side: "producer",
        });
      }
      state.buffer.append(value);
      if state.subscribers.is_empty() {
        state.reclaim();
      }
      let ack = match state.capacity {
        Some(capacity) if state.buffer.len() >= capacity => {
          let ack = Ack::new();
          state.blocked = Some(ack.clone());
          ack
        }
        _ => continue_ack(),
      };
      (state.subscribers.ids(), ack)
    };

    for id in ids {
      self.drain(id);
    }
    ack
  }

  fn on_error(&mut self, err: Err) {
    let (observers, blocked) = {
      let mut state = self.0.rc_deref_mut();
      if state.terminal.is_some() {
        return;
      }
      state.terminal = Some(Terminal::Error(err.clone()));
      let last_idx = state.buffer.last_idx();
      if last_idx > 0 {
        state.buffer.dequeue(last_idx - 1);
      }
      let observers: Vec<_> = state.subscribers.drain().into_iter().map(|slot| slot.observer).collect();
      (observers, state.blocked.take())
    };
    tracing::debug!(observers = observers.len(), "controlled subject errored");
    if let Some(blocked) = blocked {
      blocked.resolve(Outcome::Stop);
    }
    for observer in observers {
      observer.rc_deref_mut().on_error(err.clone());
    }
  }

  fn on_completed(&mut self) {
    let ids = {
      let mut state = self.0.rc_deref_mut();
      if state.terminal.is_some() {
        return;
      }
      state.terminal = Some(Terminal::Completed);
      state.subscribers.ids()
    };
    tracing::debug!(observers = ids.len(), "controlled subject completed");
    for id in ids {
      self.drain(id);
    }
  }
}

impl<Item, Err> Observable<Item, Err> for ControlledSubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn actual_subscribe(
    &self, mut observer: BoxedObserver<Item, Err>, _scheduler: &SharedScheduler,
    _subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let mut state = self.0.rc_deref_mut();
    match (&state.terminal, state.stopped) {
      (Some(Terminal::Error(err)), _) => {
        let err = err.clone();
        drop(state);
        observer.on_error(err);
        return SharedSubscription::default();
      }
      (Some(Terminal::Completed), _) | (None, true) => {
        drop(state);
        observer.on_completed();
        return SharedSubscription::default();
      }
      (None, false) => {}
    }
    let cursor = state.buffer.last_idx();
    let id = state
      .subscribers
      .add(Slot { observer: MutArc::own(observer), cursor, in_flight: false });
    drop(state);
    tracing::debug!(id, cursor, "controlled subject subscribed");

    let subject = self.clone();
    let subscription = SharedSubscription::default();
    subscription.add(Teardown::new(move || subject.detach(id)));
    subscription
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    observable::ObservableExt,
    scheduler::ImmediateScheduler,
    subscription::SubscriptionLike,
    testing::{AckMode, TestObserver},
  };

  #[test]
  fn replays_at_observer_pace() {
    let mut subject = ControlledSubject::<i32, ()>::new();
    let observer = TestObserver::manual();
    subject.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);

    for v in 1..=3 {
      assert_eq!(subject.on_next(v).value(), Some(Outcome::Continue));
    }
    assert_eq!(observer.received(), vec![1]);
    assert_eq!(subject.buffered_len(), 3);

    observer.ack_next(Outcome::Continue);
    assert_eq!(observer.received(), vec![1, 2]);
    assert_eq!(subject.buffered_len(), 2);

    observer.ack_next(Outcome::Continue);
    observer.ack_next(Outcome::Continue);
    assert_eq!(observer.received(), vec![1, 2, 3]);
    assert_eq!(subject.buffered_len(), 0);
  }

  #[test]
  fn slowest_observer_holds_the_buffer() {
    let mut subject = ControlledSubject::<i32, ()>::new();
    let fast = TestObserver::auto();
    let slow = TestObserver::manual();
    subject.subscribe(fast.clone(), ImmediateScheduler, ImmediateScheduler);
    subject.subscribe(slow.clone(), ImmediateScheduler, ImmediateScheduler);

    subject.on_next(1);
    subject.on_next(2);
    assert_eq!(fast.received(), vec![1, 2]);
    assert_eq!(slow.received(), vec![1]);
    assert_eq!(subject.buffered_len(), 2);

    slow.ack_next(Outcome::Continue);
    assert_eq!(subject.buffered_len(), 1);
    slow.ack_next(Outcome::Continue);
    assert_eq!(subject.buffered_len(), 0);
  }

  #[test]
  fn capacity_bounds_the_buffer() {
    let mut subject = ControlledSubject::<i32, ()>::with_capacity(2);
    let observer = TestObserver::manual();
    subject.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);

    assert_eq!(subject.on_next(1).value(), Some(Outcome::Continue));
    let blocked = subject.on_next(2);
    assert!(!blocked.has_value());
    assert_eq!(subject.buffered_len(), 2);

    observer.ack_next(Outcome::Continue);
    assert_eq!(blocked.value(), Some(Outcome::Continue));
    assert_eq!(subject.buffered_len(), 1);
  }

  #[test]
  #[should_panic(expected = "emitted before its previous acknowledgment resolved")]
  fn pushing_while_blocked_fails_fast() {
    let mut subject = ControlledSubject::<i32, ()>::with_capacity(1);
    subject.subscribe(TestObserver::manual(), ImmediateScheduler, ImmediateScheduler);
    subject.on_next(1);
    subject.on_next(2);
  }

  #[test]
  fn all_observers_stopping_stops_the_producer() {
    let mut subject = ControlledSubject::<i32, ()>::with_capacity(1);
    let observer = TestObserver::manual();
    subject.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);

    let blocked = subject.on_next(1);
    observer.ack_next(Outcome::Stop);
    assert_eq!(blocked.value(), Some(Outcome::Stop));
    assert!(subject.is_stopped());
    assert_eq!(subject.on_next(2).value(), Some(Outcome::Stop));

    let late = TestObserver::auto();
    subject.subscribe(late.clone(), ImmediateScheduler, ImmediateScheduler);
    assert!(late.is_completed());
  }

  #[test]
  fn completion_waits_for_the_buffer() {
    let mut subject = ControlledSubject::<i32, ()>::new();
    let observer = TestObserver::manual();
    subject.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);
    subject.on_next(1);
    subject.on_next(2);
    subject.on_completed();
    assert!(!observer.is_completed());

    observer.ack_next(Outcome::Continue);
    assert!(!observer.is_completed());
    observer.ack_next(Outcome::Continue);
    assert_eq!(observer.completed_count(), 1);
    assert_eq!(observer.received(), vec![1, 2]);
  }

  #[test]
  fn error_is_immediate() {
    let mut subject = ControlledSubject::<i32, &'static str>::new();
    let observer = TestObserver::manual();
    subject.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);
    subject.on_next(1);
    subject.on_next(2);
    subject.on_error("boom");
    assert_eq!(observer.errors(), vec!["boom"]);
    assert_eq!(subject.buffered_len(), 0);
  }

  #[test]
  fn hot_subscription_and_unsubscribe() {
    let mut subject = ControlledSubject::<i32, ()>::new();
    subject.on_next(1);
    assert_eq!(subject.buffered_len(), 0);

    let observer = TestObserver::new(AckMode::Manual);
    let mut subscription =
      subject.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);
    subject.on_next(2);
    subject.on_next(3);
    assert_eq!(observer.received(), vec![2]);

    subscription.unsubscribe();
    assert_eq!(subject.observer_count(), 0);
    assert_eq!(subject.buffered_len(), 0);
    assert!(!subject.is_stopped());
  }
}
