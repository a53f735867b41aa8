//! Hand-driven sources and recording sinks for tests.
//!
//! [`TestObservable`] lets a test push values one by one and inspect the
//! acknowledgment each push receives. [`TestObserver`] records everything it
//! is sent and either acknowledges immediately or keeps the acknowledgments
//! pending until the test resolves them.

use std::collections::VecDeque;

use crate::{
  ack::{continue_ack, stop_ack, Ack, Outcome},
  observable::Observable,
  observer::{BoxedObserver, Observer},
  rc::MutArc,
  scheduler::SharedScheduler,
  subscription::SharedSubscription,
};

type SharedObserver<Item, Err> = MutArc<BoxedObserver<Item, Err>>;

/// A source driven by the test.
///
/// Only the most recent subscriber receives values. Pushing without a
/// subscriber answers `Stop`.
pub struct TestObservable<Item, Err>(MutArc<Option<SharedObserver<Item, Err>>>);

impl<Item, Err> Clone for TestObservable<Item, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item, Err> Default for TestObservable<Item, Err> {
  fn default() -> Self { Self(MutArc::own(None)) }
}

impl<Item, Err> TestObservable<Item, Err> {
  pub fn new() -> Self { Self::default() }

  pub fn is_subscribed(&self) -> bool { self.0.rc_deref_mut().is_some() }

  fn observer(&self) -> Option<SharedObserver<Item, Err>> { self.0.rc_deref_mut().clone() }

  pub fn on_next(&self, value: Item) -> Ack {
    match self.observer() {
      Some(observer) => observer.rc_deref_mut().on_next(value),
      None => stop_ack(),
    }
  }

  pub fn on_error(&self, err: Err) {
    if let Some(observer) = self.observer() {
      observer.rc_deref_mut().on_error(err);
    }
  }

  pub fn on_completed(&self) {
    if let Some(observer) = self.observer() {
      observer.rc_deref_mut().on_completed();
    }
  }
}

impl<Item, Err> Observable<Item, Err> for TestObservable<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<Item, Err>, _scheduler: &SharedScheduler,
    _subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    *self.0.rc_deref_mut() = Some(MutArc::own(observer));
    let subscribed = self.0.clone();
    let subscription = SharedSubscription::default();
    subscription.add(crate::subscription::Teardown::new(move || {
      subscribed.rc_deref_mut().take();
    }));
    subscription
  }
}

/// How a [`TestObserver`] answers `on_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
  /// Answer `Continue` synchronously.
  Auto,
  /// Keep every acknowledgment pending until [`TestObserver::ack_next`].
  Manual,
  /// Answer `Continue` to the first `n` values, `Stop` afterwards.
  StopAfter(usize),
}

struct Record<Item, Err> {
  mode: AckMode,
  values: Vec<Item>,
  errors: Vec<Err>,
  completed: usize,
  pending: VecDeque<Ack>,
  last_ack: Option<Ack>,
}

/// A recording observer, clones share the record.
pub struct TestObserver<Item, Err>(MutArc<Record<Item, Err>>);

impl<Item, Err> Clone for TestObserver<Item, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item, Err> TestObserver<Item, Err> {
  pub fn new(mode: AckMode) -> Self {
    Self(MutArc::own(Record {
      mode,
      values: vec![],
      errors: vec![],
      completed: 0,
      pending: VecDeque::new(),
      last_ack: None,
    }))
  }

  pub fn auto() -> Self { Self::new(AckMode::Auto) }

  pub fn manual() -> Self { Self::new(AckMode::Manual) }

  pub fn received(&self) -> Vec<Item>
  where
    Item: Clone,
  {
    self.0.rc_deref_mut().values.clone()
  }

  pub fn received_count(&self) -> usize { self.0.rc_deref_mut().values.len() }

  pub fn errors(&self) -> Vec<Err>
  where
    Err: Clone,
  {
    self.0.rc_deref_mut().errors.clone()
  }

  pub fn completed_count(&self) -> usize { self.0.rc_deref_mut().completed }

  pub fn is_completed(&self) -> bool { self.completed_count() > 0 }

  /// Acknowledgments handed out in manual mode and not resolved yet.
  pub fn pending_acks(&self) -> usize { self.0.rc_deref_mut().pending.len() }

  /// The acknowledgment returned by the latest `on_next`.
  pub fn last_ack(&self) -> Option<Ack> { self.0.rc_deref_mut().last_ack.clone() }

  /// Resolve the oldest pending acknowledgment, `false` if none is pending.
  pub fn ack_next(&self, outcome: Outcome) -> bool {
    let ack = self.0.rc_deref_mut().pending.pop_front();
    match ack {
      Some(ack) => {
        ack.resolve(outcome);
        true
      }
      None => false,
    }
  }
}

impl<Item, Err> Observer<Item, Err> for TestObserver<Item, Err> {
  fn on_next(&mut self, value: Item) -> Ack {
    let mut record = self.0.rc_deref_mut();
    record.values.push(value);
    let ack = match record.mode {
      AckMode::Auto => continue_ack(),
      AckMode::Manual => {
        let ack = Ack::new();
        record.pending.push_back(ack.clone());
        ack
      }
      AckMode::StopAfter(n) if record.values.len() <= n => continue_ack(),
      AckMode::StopAfter(_) => stop_ack(),
    };
    record.last_ack = Some(ack.clone());
    ack
  }

  fn on_error(&mut self, err: Err) { self.0.rc_deref_mut().errors.push(err); }

  fn on_completed(&mut self) { self.0.rc_deref_mut().completed += 1; }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::{observable::ObservableExt, scheduler::ImmediateScheduler};

  #[test]
  fn manual_observer_holds_acks() {
    let source = TestObservable::<i32, ()>::new();
    let observer = TestObserver::manual();
    source.subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);

    let ack = source.on_next(1);
    assert!(!ack.has_value());
    assert_eq!(observer.pending_acks(), 1);
    assert!(observer.ack_next(Outcome::Continue));
    assert_eq!(ack.value(), Some(Outcome::Continue));
    assert!(!observer.ack_next(Outcome::Continue));
  }

  #[test]
  fn stop_after() {
    let mut observer = TestObserver::<i32, ()>::new(AckMode::StopAfter(1));
    assert!(observer.last_ack().is_none());
    assert_eq!(observer.on_next(1).value(), Some(Outcome::Continue));
    assert_eq!(observer.on_next(2).value(), Some(Outcome::Stop));
    assert_eq!(observer.last_ack().and_then(|ack| ack.value()), Some(Outcome::Stop));
  }

  #[test]
  fn last_ack_follows_manual_resolution() {
    let mut observer = TestObserver::<i32, ()>::manual();
    observer.on_next(1);
    let last = observer.last_ack();
    assert!(last.as_ref().is_some_and(|ack| !ack.has_value()));

    observer.ack_next(Outcome::Continue);
    assert_eq!(last.and_then(|ack| ack.value()), Some(Outcome::Continue));
  }

  #[test]
  fn unsubscribe_detaches() {
    let source = TestObservable::<i32, ()>::new();
    let scheduler: SharedScheduler = Arc::new(ImmediateScheduler);
    let mut subscription =
      source.actual_subscribe(Box::new(TestObserver::auto()), &scheduler, &scheduler);
    assert!(source.is_subscribed());
    crate::subscription::SubscriptionLike::unsubscribe(&mut subscription);
    assert!(!source.is_subscribed());
    assert_eq!(source.on_next(1).value(), Some(Outcome::Stop));
  }
}
