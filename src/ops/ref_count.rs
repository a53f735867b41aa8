//! Make a [`ConnectableObservable`] behave like an ordinary observable.
//!
//! Internally it counts the subscriptions and connects the source (only
//! once) when the count goes from zero to one. When the last subscription
//! is released it disconnects from the source. Everything before the
//! `ref_count` thus has a single subscription regardless of the number of
//! observers downstream.

use crate::{
  observable::{ConnectableObservable, Observable},
  observer::BoxedObserver,
  rc::MutArc,
  scheduler::SharedScheduler,
  subject::Subject,
  subscription::{SharedSubscription, SubscriptionLike, Teardown},
};

#[derive(Default)]
struct RefCountState {
  count: usize,
  connection: Option<SharedSubscription>,
}

pub struct RefCount<S, Sub> {
  connectable: ConnectableObservable<S, Sub>,
  state: MutArc<RefCountState>,
}

impl<S, Sub: Clone> Clone for RefCount<S, Sub> {
  fn clone(&self) -> Self {
    RefCount { connectable: self.connectable.clone(), state: self.state.clone() }
  }
}

impl<S, Sub> RefCount<S, Sub> {
  pub(crate) fn new(connectable: ConnectableObservable<S, Sub>) -> Self {
    RefCount { connectable, state: MutArc::default() }
  }

  /// Number of live subscriptions.
  pub fn ref_count(&self) -> usize { self.state.rc_deref_mut().count }
}

impl<Item, Err, S, Sub> Observable<Item, Err> for RefCount<S, Sub>
where
  S: Observable<Item, Err>,
  Sub: Subject<Item, Err>,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<Item, Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let subscription = SharedSubscription::default();
    subscription.add(self.connectable.actual_subscribe(observer, scheduler, subscribe_scheduler));

    let first = {
      let mut state = self.state.rc_deref_mut();
      state.count += 1;
      state.count == 1
    };
    if first {
      tracing::debug!("ref_count: first subscriber, connecting");
      let connection = self.connectable.connect_with(scheduler, subscribe_scheduler);
      let stale = {
        let mut state = self.state.rc_deref_mut();
        if state.count == 0 {
          Some(connection)
        } else {
          state.connection = Some(connection);
          None
        }
      };
      // every subscriber left while connecting
      if let Some(mut stale) = stale {
        stale.unsubscribe();
      }
    }

    let state = self.state.clone();
    subscription.add(Teardown::new(move || {
      let disconnect = {
        let mut state = state.rc_deref_mut();
        state.count -= 1;
        if state.count == 0 { state.connection.take() } else { None }
      };
      if let Some(mut connection) = disconnect {
        tracing::debug!("ref_count: last subscriber left, disconnecting");
        connection.unsubscribe();
      }
    }));
    subscription
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    ack::Outcome,
    observable::{from_iter, ObservableExt},
    scheduler::ImmediateScheduler,
    testing::{TestObservable, TestObserver},
  };

  #[test]
  fn connects_on_first_subscription() {
    let source = TestObservable::<i32, ()>::new();
    let shared = source.clone().publish().ref_count();
    assert!(!source.is_subscribed());

    let first = TestObserver::auto();
    let second = TestObserver::auto();
    shared.subscribe(first.clone(), ImmediateScheduler, ImmediateScheduler);
    assert!(source.is_subscribed());
    shared.subscribe(second.clone(), ImmediateScheduler, ImmediateScheduler);
    assert_eq!(shared.ref_count(), 2);

    assert_eq!(source.on_next(1).value(), Some(Outcome::Continue));
    assert_eq!(first.received(), vec![1]);
    assert_eq!(second.received(), vec![1]);
  }

  #[test]
  fn disconnects_after_the_last_unsubscribe() {
    let source = TestObservable::<i32, ()>::new();
    let shared = source.clone().publish().ref_count();
    let mut first =
      shared.subscribe(TestObserver::auto(), ImmediateScheduler, ImmediateScheduler);
    let mut second =
      shared.subscribe(TestObserver::auto(), ImmediateScheduler, ImmediateScheduler);

    first.unsubscribe();
    assert!(source.is_subscribed());
    second.unsubscribe();
    assert!(!source.is_subscribed());
    assert_eq!(shared.ref_count(), 0);

    shared.subscribe(TestObserver::auto(), ImmediateScheduler, ImmediateScheduler);
    assert!(source.is_subscribed());
  }

  #[test]
  fn synchronous_source_reaches_the_first_subscriber() {
    let shared = from_iter(vec![1, 2, 3]).publish().ref_count();
    let observer = TestObserver::<i32, ()>::auto();
    shared.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);
    assert_eq!(observer.received(), vec![1, 2, 3]);
    assert!(observer.is_completed());
  }
}
