//! Observable trait and the operator extension trait.
//!
//! An [`Observable`] is anything an [`Observer`] can be attached to. The
//! attachment receives two schedulers: `subscribe_scheduler` decides where
//! the initial subscription side effects run, `scheduler` decides where
//! later emissions driven by acknowledgments run. Keeping them apart lets a
//! pipeline register every observer synchronously before any data flows,
//! even when emissions are deferred.

use std::{marker::PhantomData, sync::Arc};

mod connectable;
mod from_iter;
pub use connectable::*;
pub use from_iter::*;

use crate::{
  observer::{BoxedObserver, Observer},
  ops::{
    flat_map::FlatMapOp,
    flat_zip::FlatZipOp,
    observe_on::ObserveOnOp,
    window::{window, WindowLeft, WindowRight},
    zip::ZipOp,
    KeyOrder, MatchAll,
  },
  scheduler::{Scheduler, SharedScheduler},
  subject::{PublishSubject, Subject},
  subscription::SharedSubscription,
};

/// A source of values that honours the acknowledgment protocol.
pub trait Observable<Item, Err>: Send + Sync {
  /// Attach `observer` and start producing.
  ///
  /// Sources must not call `observer.on_next` again before the `Ack`
  /// returned by the previous call resolved to `Continue`.
  fn actual_subscribe(
    &self, observer: BoxedObserver<Item, Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription;
}

/// Type-erased observable, cheap to clone.
pub type BoxedObservable<Item, Err> = Arc<dyn Observable<Item, Err>>;

impl<Item, Err, T> Observable<Item, Err> for Arc<T>
where
  T: Observable<Item, Err> + ?Sized,
{
  #[inline]
  fn actual_subscribe(
    &self, observer: BoxedObserver<Item, Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    (**self).actual_subscribe(observer, scheduler, subscribe_scheduler)
  }
}

/// Operators available on every observable.
pub trait ObservableExt<Item, Err>: Observable<Item, Err> + Sized {
  /// Subscribe `observer`, emitting on `scheduler` and running the initial
  /// subscription on `subscribe_scheduler`.
  fn subscribe<O, S, SS>(&self, observer: O, scheduler: S, subscribe_scheduler: SS) -> SharedSubscription
  where
    O: Observer<Item, Err> + Send + 'static,
    S: Scheduler + 'static,
    SS: Scheduler + 'static,
  {
    let scheduler: SharedScheduler = Arc::new(scheduler);
    let subscribe_scheduler: SharedScheduler = Arc::new(subscribe_scheduler);
    self.actual_subscribe(Box::new(observer), &scheduler, &subscribe_scheduler)
  }

  fn box_it(self) -> BoxedObservable<Item, Err>
  where
    Self: 'static,
  {
    Arc::new(self)
  }

  /// Deliver every notification through `scheduler`.
  fn observe_on<SD: Scheduler + 'static>(self, scheduler: SD) -> ObserveOnOp<Self> {
    ObserveOnOp { source: self, scheduler: Arc::new(scheduler) }
  }

  /// Pair the n-th value of `self` with the n-th value of `other`.
  fn zip<R, S2>(self, other: S2) -> ZipOp<Self, S2, MatchAll>
  where
    S2: Observable<R, Err>,
  {
    ZipOp { left: self, right: other, policy: Arc::new(MatchAll) }
  }

  /// Merge-join two ordered streams, emitting the pairs whose keys match.
  ///
  /// `is_lower(left, right)` tells that `right` sorts before `left`,
  /// `is_higher(left, right)` that it sorts after; neither means a match.
  fn zip_by<R, S2, Lo, Hi>(
    self, other: S2, is_lower: Lo, is_higher: Hi,
  ) -> ZipOp<Self, S2, KeyOrder<Lo, Hi>>
  where
    S2: Observable<R, Err>,
    Lo: Fn(&Item, &R) -> bool + Send + Sync + 'static,
    Hi: Fn(&Item, &R) -> bool + Send + Sync + 'static,
  {
    ZipOp { left: self, right: other, policy: Arc::new(KeyOrder { is_lower, is_higher }) }
  }

  /// Group the values of `right` into one window per value of `self`.
  ///
  /// See [`window`](crate::ops::window::window).
  fn window<R, S2, Lo, Hi>(
    self, right: S2, is_lower: Lo, is_higher: Hi,
  ) -> (WindowLeft<Item, R, Err>, WindowRight<Item, R, Err>)
  where
    Self: 'static,
    S2: Observable<R, Err> + 'static,
    Item: Clone + Send + 'static,
    R: Clone + Send + 'static,
    Err: Clone + Send + 'static,
    Lo: Fn(&Item, &R) -> bool + Send + Sync + 'static,
    Hi: Fn(&Item, &R) -> bool + Send + Sync + 'static,
  {
    window(self, right, is_lower, is_higher)
  }

  /// Open `selector(value)` for each value of `self` and pair every value of
  /// that inner observable with the matching value of `right`.
  fn flat_zip<R, S2, F, Inner>(self, right: S2, selector: F) -> FlatZipOp<Self, S2, F, Item>
  where
    S2: Observable<R, Err>,
    F: Fn(Item) -> Inner + Send + Sync + 'static,
  {
    FlatZipOp { left: self, right, selector: Arc::new(selector), _p: PhantomData }
  }

  /// Concatenate the inner observables produced by `selector`, one at a
  /// time.
  fn flat_map<F, Inner>(self, selector: F) -> FlatMapOp<Self, F, Item>
  where
    F: Fn(Item) -> Inner + Send + Sync + 'static,
  {
    FlatMapOp { source: self, selector: Arc::new(selector), _p: PhantomData }
  }

  /// Share one subscription to `self` through `subject`.
  fn multicast<Sub>(self, subject: Sub) -> ConnectableObservable<Self, Sub>
  where
    Sub: Subject<Item, Err>,
  {
    ConnectableObservable::new(self, subject)
  }

  /// [`multicast`](ObservableExt::multicast) through a fresh
  /// [`PublishSubject`].
  fn publish(self) -> ConnectableObservable<Self, PublishSubject<Item, Err>>
  where
    PublishSubject<Item, Err>: Subject<Item, Err>,
  {
    self.multicast(PublishSubject::new())
  }
}

impl<Item, Err, T> ObservableExt<Item, Err> for T where T: Observable<Item, Err> {}
