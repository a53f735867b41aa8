//! Multicasting through a subject.
//!
//! A [`ConnectableObservable`] bridges a source and a subject. Subscribing
//! to it attaches the observer to the subject; nothing flows until
//! [`connect`](ConnectableObservable::connect) subscribes the subject to the
//! source. Every observer then shares that single source execution, and the
//! source sees the combined backpressure of all of them through the
//! subject's acknowledgments.
//!
//! # Example
//!
//! ```rust
//! use rxbackpressure::prelude::*;
//!
//! let connectable = from_iter(vec![1, 2]).publish();
//! let first = TestObserver::<i32, ()>::auto();
//! let second = TestObserver::<i32, ()>::auto();
//! connectable.subscribe(first.clone(), ImmediateScheduler, ImmediateScheduler);
//! connectable.subscribe(second.clone(), ImmediateScheduler, ImmediateScheduler);
//!
//! connectable.connect(ImmediateScheduler, ImmediateScheduler);
//! assert_eq!(first.received(), vec![1, 2]);
//! assert_eq!(second.received(), vec![1, 2]);
//! ```

use std::sync::Arc;

use crate::{
  observable::Observable,
  observer::BoxedObserver,
  ops::ref_count::RefCount,
  rc::MutArc,
  scheduler::{Scheduler, SharedScheduler},
  subject::Subject,
  subscription::{SharedSubscription, SubscriptionLike},
};

/// An observable that shares one source subscription among all its
/// observers once connected.
pub struct ConnectableObservable<S, Sub> {
  source: Arc<S>,
  subject: Sub,
  connection: MutArc<Option<SharedSubscription>>,
}

impl<S, Sub: Clone> Clone for ConnectableObservable<S, Sub> {
  fn clone(&self) -> Self {
    ConnectableObservable {
      source: self.source.clone(),
      subject: self.subject.clone(),
      connection: self.connection.clone(),
    }
  }
}

impl<S, Sub: Clone> ConnectableObservable<S, Sub> {
  pub fn new(source: S, subject: Sub) -> Self {
    ConnectableObservable { source: Arc::new(source), subject, connection: MutArc::own(None) }
  }

  /// The subject observers are attached to.
  pub fn fork(&self) -> Sub { self.subject.clone() }

  pub fn is_connected(&self) -> bool {
    self.connection.rc_deref_mut().as_ref().is_some_and(|c| !c.is_closed())
  }

  /// Subscribe the subject to the source.
  ///
  /// Connecting again while connected returns the existing connection.
  /// Unsubscribing the returned subscription disconnects the source.
  pub fn connect<Item, Err, SD, SS>(&self, scheduler: SD, subscribe_scheduler: SS) -> SharedSubscription
  where
    S: Observable<Item, Err>,
    Sub: Subject<Item, Err>,
    SD: Scheduler + 'static,
    SS: Scheduler + 'static,
  {
    let scheduler: SharedScheduler = Arc::new(scheduler);
    let subscribe_scheduler: SharedScheduler = Arc::new(subscribe_scheduler);
    self.connect_with(&scheduler, &subscribe_scheduler)
  }

  pub(crate) fn connect_with<Item, Err>(
    &self, scheduler: &SharedScheduler, subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription
  where
    S: Observable<Item, Err>,
    Sub: Subject<Item, Err>,
  {
    let connection = {
      let mut current = self.connection.rc_deref_mut();
      if let Some(connection) = current.as_ref().filter(|c| !c.is_closed()) {
        return connection.clone();
      }
      let connection = SharedSubscription::default();
      *current = Some(connection.clone());
      connection
    };

    tracing::debug!("connectable: connecting to the source");
    let observer: BoxedObserver<Item, Err> = Box::new(self.subject.clone());
    connection.add(self.source.actual_subscribe(observer, scheduler, subscribe_scheduler));
    connection
  }

  /// Connect on the first subscription and disconnect when the last one
  /// unsubscribes.
  pub fn ref_count(self) -> RefCount<S, Sub> { RefCount::new(self) }
}

impl<Item, Err, S, Sub> Observable<Item, Err> for ConnectableObservable<S, Sub>
where
  S: Send + Sync,
  Sub: Subject<Item, Err>,
{
  #[inline]
  fn actual_subscribe(
    &self, observer: BoxedObserver<Item, Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    self.subject.actual_subscribe(observer, scheduler, subscribe_scheduler)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    ack::Outcome,
    observable::ObservableExt,
    scheduler::ImmediateScheduler,
    subject::ControlledSubject,
    testing::{TestObservable, TestObserver},
  };

  #[test]
  fn nothing_flows_before_connect() {
    let source = TestObservable::<i32, ()>::new();
    let connectable = source.clone().publish();
    let observer = TestObserver::auto();
    connectable.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);
    assert!(!source.is_subscribed());

    connectable.connect(ImmediateScheduler, ImmediateScheduler);
    assert!(connectable.is_connected());
    assert_eq!(source.on_next(1).value(), Some(Outcome::Continue));
    assert_eq!(observer.received(), vec![1]);
  }

  #[test]
  fn connect_is_idempotent_while_connected() {
    let source = TestObservable::<i32, ()>::new();
    let connectable = source.clone().publish();
    let mut first = connectable.connect(ImmediateScheduler, ImmediateScheduler);
    let second = connectable.connect(ImmediateScheduler, ImmediateScheduler);
    first.unsubscribe();
    assert!(second.is_closed());
    assert!(!source.is_subscribed());
  }

  #[test]
  fn disconnect_and_reconnect() {
    let source = TestObservable::<i32, ()>::new();
    let connectable = source.clone().publish();
    let mut connection = connectable.connect(ImmediateScheduler, ImmediateScheduler);
    assert!(source.is_subscribed());

    connection.unsubscribe();
    assert!(!source.is_subscribed());
    assert!(!connectable.is_connected());

    connectable.connect(ImmediateScheduler, ImmediateScheduler);
    assert!(source.is_subscribed());
  }

  #[test]
  fn source_waits_for_the_slowest_observer() {
    let source = TestObservable::<i32, ()>::new();
    let connectable = source.clone().multicast(ControlledSubject::with_capacity(1));
    let fast = TestObserver::auto();
    let slow = TestObserver::manual();
    connectable.subscribe(fast.clone(), ImmediateScheduler, ImmediateScheduler);
    connectable.subscribe(slow.clone(), ImmediateScheduler, ImmediateScheduler);
    connectable.connect(ImmediateScheduler, ImmediateScheduler);

    let ack = source.on_next(1);
    assert_eq!(fast.received(), vec![1]);
    assert!(!ack.has_value());
    slow.ack_next(Outcome::Continue);
    assert_eq!(ack.value(), Some(Outcome::Continue));
  }
}
