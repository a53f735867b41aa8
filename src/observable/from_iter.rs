use std::{marker::PhantomData, sync::Arc};

use crate::{
  ack::Outcome,
  observable::Observable,
  observer::BoxedObserver,
  rc::MutArc,
  scheduler::SharedScheduler,
  subscription::{SharedSubscription, SubscriptionLike},
};

/// Creates an observable that emits the items of an iterator, one per
/// acknowledgment.
///
/// The source is cold: every subscription iterates its own clone of `iter`.
/// The first item is emitted on the subscribe scheduler. Items acknowledged
/// synchronously are emitted in a loop; after an asynchronous `Continue` the
/// next item is emitted on the emission scheduler.
///
/// # Example
///
/// ```rust
/// use rxbackpressure::prelude::*;
///
/// let observer = TestObserver::<i32, ()>::auto();
/// from_iter(0..3).subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);
/// assert_eq!(observer.received(), vec![0, 1, 2]);
/// assert!(observer.is_completed());
/// ```
pub fn from_iter<I: IntoIterator, Err>(iter: I) -> FromIter<I, Err> {
  FromIter(iter, PhantomData)
}

/// An iterator source; `Err` is fixed by the observer it is subscribed with.
pub struct FromIter<I, Err>(I, PhantomData<fn() -> Err>);

impl<I: Clone, Err> Clone for FromIter<I, Err> {
  fn clone(&self) -> Self { FromIter(self.0.clone(), PhantomData) }
}

struct IterRun<It: Iterator, Err> {
  iter: MutArc<It>,
  observer: MutArc<BoxedObserver<It::Item, Err>>,
  scheduler: SharedScheduler,
  subscription: SharedSubscription,
}

impl<It, Err> IterRun<It, Err>
where
  It: Iterator + Send + 'static,
  It::Item: Send + 'static,
  Err: Send + 'static,
{
  fn drive(self: Arc<Self>) {
    loop {
      if self.subscription.is_closed() {
        return;
      }
      let next = self.iter.rc_deref_mut().next();
      let Some(value) = next else {
        self.observer.rc_deref_mut().on_completed();
        self.subscription.clone().unsubscribe();
        return;
      };

      let ack = self.observer.rc_deref_mut().on_next(value);
      match ack.value() {
        Some(Outcome::Continue) => {}
        Some(Outcome::Stop) => return,
        None => {
          ack.on_resolved(move |outcome| {
            if outcome.is_continue() {
              let scheduler = self.scheduler.clone();
              scheduler.schedule(Box::new(move || self.drive()));
            }
          });
          return;
        }
      }
    }
  }
}

impl<I, Err> Observable<I::Item, Err> for FromIter<I, Err>
where
  I: IntoIterator + Clone + Send + Sync,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
  Err: Send + 'static,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<I::Item, Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let subscription = SharedSubscription::default();
    let run = Arc::new(IterRun {
      iter: MutArc::own(self.0.clone().into_iter()),
      observer: MutArc::own(observer),
      scheduler: scheduler.clone(),
      subscription: subscription.clone(),
    });
    subscribe_scheduler.schedule(Box::new(move || run.drive()));
    subscription
  }
}
