use std::{
  any::Any,
  fmt::{Debug, Formatter},
};

use smallvec::SmallVec;

use crate::rc::MutArc;

/// Subscription returns from `Observable::actual_subscribe` to allow
/// unsubscribing.
pub trait SubscriptionLike {
  /// Release the resources held by the subscription. Calling it again is a
  /// no-op.
  fn unsubscribe(&mut self);

  fn is_closed(&self) -> bool;
}

/// Composite subscription shared between threads.
///
/// Clones share the same teardown list. Adding to a closed subscription
/// unsubscribes the added one immediately.
#[derive(Clone, Default)]
pub struct SharedSubscription(MutArc<Inner<Box<dyn SubscriptionLike + Send>>>);

impl SharedSubscription {
  pub fn add<S: SubscriptionLike + Send + 'static>(&self, subscription: S) {
    if !self.is_same(&subscription) {
      let rejected = self.0.rc_deref_mut().add(Box::new(subscription));
      // unsubscribe outside the lock, the teardown may reach back into us
      if let Some(mut rejected) = rejected {
        rejected.unsubscribe();
      }
    }
  }

  /// Activates RAII behavior: the returned guard unsubscribes on drop.
  pub fn unsubscribe_when_dropped(self) -> SubscriptionGuard<Self> { SubscriptionGuard(self) }

  pub(crate) fn teardown_size(&self) -> usize { self.0.rc_deref_mut().teardown.len() }

  fn is_same(&self, other: &dyn Any) -> bool {
    other.downcast_ref::<Self>().is_some_and(|other| self.0.ptr_eq(&other.0))
  }
}

impl SubscriptionLike for SharedSubscription {
  fn unsubscribe(&mut self) {
    let teardown = {
      let mut inner = self.0.rc_deref_mut();
      if inner.closed {
        return;
      }
      inner.closed = true;
      std::mem::take(&mut inner.teardown)
    };
    for mut v in teardown {
      v.unsubscribe();
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.0.rc_deref_mut().closed }
}

impl Debug for SharedSubscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let inner = self.0.rc_deref_mut();
    f.debug_struct("SharedSubscription")
      .field("closed", &inner.closed)
      .field("teardown_count", &inner.teardown.len())
      .finish()
  }
}

struct Inner<T> {
  closed: bool,
  teardown: SmallVec<[T; 1]>,
}

impl<T: SubscriptionLike> Inner<T> {
  fn add(&mut self, v: T) -> Option<T> {
    if self.closed {
      Some(v)
    } else {
      self.teardown.retain(|v| !v.is_closed());
      self.teardown.push(v);
      None
    }
  }
}

impl<T> Default for Inner<T> {
  fn default() -> Self { Inner { closed: false, teardown: SmallVec::new() } }
}

impl<T: ?Sized> SubscriptionLike for Box<T>
where
  T: SubscriptionLike,
{
  #[inline]
  fn unsubscribe(&mut self) { (**self).unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { (**self).is_closed() }
}

/// Runs a closure once on unsubscribe.
pub struct Teardown<F>(Option<F>);

impl<F: FnOnce()> Teardown<F> {
  pub fn new(f: F) -> Self { Teardown(Some(f)) }
}

impl<F: FnOnce()> SubscriptionLike for Teardown<F> {
  fn unsubscribe(&mut self) {
    if let Some(f) = self.0.take() {
      f()
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.0.is_none() }
}

/// An RAII implementation of a "scoped subscribed" of a subscription.
/// When this structure is dropped (falls out of scope), the subscription will
/// be unsubscribed.
///
/// If you want to drop it immediately, wrap it in its own scope
#[derive(Debug)]
#[must_use]
pub struct SubscriptionGuard<T: SubscriptionLike>(pub(crate) T);

impl<T: SubscriptionLike> SubscriptionGuard<T> {
  /// Wraps an existing subscription with a guard to enable RAII behavior for
  /// it.
  pub fn new(subscription: T) -> SubscriptionGuard<T> { SubscriptionGuard(subscription) }
}

impl<T: SubscriptionLike> Drop for SubscriptionGuard<T> {
  #[inline]
  fn drop(&mut self) { self.0.unsubscribe() }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use super::*;

  fn counting_teardown(hits: &Arc<AtomicUsize>) -> Teardown<impl FnOnce()> {
    let hits = hits.clone();
    Teardown::new(move || {
      hits.fetch_add(1, Ordering::SeqCst);
    })
  }

  #[test]
  fn add_remove() {
    let shared = SharedSubscription::default();
    let mut l1 = SharedSubscription::default();
    shared.add(l1.clone());
    shared.add(SharedSubscription::default());
    shared.add(SharedSubscription::default());
    assert_eq!(shared.teardown_size(), 3);

    l1.unsubscribe();
    shared.add(SharedSubscription::default());
    assert_eq!(shared.teardown_size(), 3);
  }

  #[test]
  fn ignores_self() {
    let shared = SharedSubscription::default();
    shared.add(shared.clone());
    assert_eq!(shared.teardown_size(), 0);
  }

  #[test]
  fn unsubscribe_is_idempotent() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut shared = SharedSubscription::default();
    shared.add(counting_teardown(&hits));
    shared.unsubscribe();
    shared.unsubscribe();
    assert!(shared.is_closed());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn add_after_close_tears_down() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut shared = SharedSubscription::default();
    shared.unsubscribe();
    shared.add(counting_teardown(&hits));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn guard_unsubscribes_on_drop() {
    let hits = Arc::new(AtomicUsize::new(0));
    let shared = SharedSubscription::default();
    shared.add(counting_teardown(&hits));
    {
      let _guard = shared.clone().unsubscribe_when_dropped();
    }
    assert!(shared.is_closed());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }
}
