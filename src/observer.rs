//! Observer trait and implementations
//!
//! The Observer is the consumer side of the protocol. Every `on_next`
//! returns an [`Ack`] that tells the producer when, and whether, it may
//! emit the next value.

use std::convert::Infallible;

use crate::{
  ack::{continue_ack, Ack},
  rc::MutArc,
};

// ============================================================================
// Observer Trait
// ============================================================================

/// Observer trait: The consumer of data in reactive programming
///
/// A producer calls `on_next` at most once per resolved acknowledgment:
/// after a value was sent, the next one may only follow once the returned
/// [`Ack`] resolved to `Continue`. `on_error` and `on_completed` are
/// terminal; no further call follows either of them.
pub trait Observer<Item, Err> {
  /// Receive the next value and answer when the next one may follow.
  fn on_next(&mut self, value: Item) -> Ack;

  /// Handle an error from the observable
  fn on_error(&mut self, err: Err);

  /// Handle completion of the observable
  fn on_completed(&mut self);
}

/// Type-erased observer that can cross threads.
pub type BoxedObserver<Item, Err> = Box<dyn Observer<Item, Err> + Send>;

impl<Item, Err, O> Observer<Item, Err> for Box<O>
where
  O: Observer<Item, Err> + ?Sized,
{
  #[inline]
  fn on_next(&mut self, value: Item) -> Ack { (**self).on_next(value) }

  #[inline]
  fn on_error(&mut self, err: Err) { (**self).on_error(err) }

  #[inline]
  fn on_completed(&mut self) { (**self).on_completed() }
}

// ============================================================================
// Observer implementations for Option and shared wrappers
// ============================================================================

/// Option observer - None acknowledges every value with `Continue` and
/// ignores terminal events, Some delegates to inner
impl<O, Item, Err> Observer<Item, Err> for Option<O>
where
  O: Observer<Item, Err>,
{
  fn on_next(&mut self, value: Item) -> Ack {
    match self {
      Some(inner) => inner.on_next(value),
      None => continue_ack(),
    }
  }

  fn on_error(&mut self, err: Err) {
    if let Some(inner) = self {
      inner.on_error(err);
    }
  }

  fn on_completed(&mut self) {
    if let Some(inner) = self {
      inner.on_completed();
    }
  }
}

/// MutArc<O> - shared ownership observer, the lock is held for the duration
/// of each call
impl<O, Item, Err> Observer<Item, Err> for MutArc<O>
where
  O: Observer<Item, Err>,
{
  #[inline]
  fn on_next(&mut self, value: Item) -> Ack { self.rc_deref_mut().on_next(value) }

  #[inline]
  fn on_error(&mut self, err: Err) { self.rc_deref_mut().on_error(err); }

  #[inline]
  fn on_completed(&mut self) { self.rc_deref_mut().on_completed(); }
}

// ============================================================================
// FnMutObserver - Closure adapter
// ============================================================================

/// Closure adapter for streams that cannot fail.
///
/// The closure answers every value with its own acknowledgment; completion
/// is ignored.
#[derive(Clone)]
pub struct FnMutObserver<F>(pub F);

impl<F, Item> Observer<Item, Infallible> for FnMutObserver<F>
where
  F: FnMut(Item) -> Ack,
{
  #[inline]
  fn on_next(&mut self, v: Item) -> Ack { (self.0)(v) }

  #[inline]
  fn on_error(&mut self, _err: Infallible) {}

  #[inline]
  fn on_completed(&mut self) {}
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ack::{stop_ack, Outcome};

  struct TestObserver {
    values: Vec<i32>,
    completed: bool,
  }

  impl Observer<i32, ()> for TestObserver {
    fn on_next(&mut self, value: i32) -> Ack {
      self.values.push(value);
      if value < 0 { stop_ack() } else { continue_ack() }
    }

    fn on_error(&mut self, _: ()) {}

    fn on_completed(&mut self) { self.completed = true; }
  }

  #[test]
  fn observer_trait() {
    let mut obs = TestObserver { values: vec![], completed: false };
    assert_eq!(obs.on_next(1).value(), Some(Outcome::Continue));
    assert_eq!(obs.on_next(-1).value(), Some(Outcome::Stop));
    obs.on_completed();
    assert_eq!(obs.values, vec![1, -1]);
    assert!(obs.completed);
  }

  #[test]
  fn boxed_and_shared() {
    let shared = MutArc::own(TestObserver { values: vec![], completed: false });
    let mut boxed: BoxedObserver<i32, ()> = Box::new(shared.clone());
    boxed.on_next(7);
    boxed.on_completed();
    assert_eq!(shared.rc_deref_mut().values, vec![7]);
    assert!(shared.rc_deref_mut().completed);
  }

  #[test]
  fn none_observer_continues() {
    let mut none: Option<TestObserver> = None;
    assert_eq!(Observer::<i32, ()>::on_next(&mut none, 1).value(), Some(Outcome::Continue));
  }

  #[test]
  fn closure_as_observer() {
    let mut count = 0;
    let mut closure_obs = FnMutObserver(|v: i32| {
      count += v;
      continue_ack()
    });

    closure_obs.on_next(10);
    closure_obs.on_next(20);
    assert_eq!(count, 30);
  }
}
