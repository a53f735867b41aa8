//! FlatZip operator implementation
//!
//! Every left value is turned into an inner observable by the selector, and
//! every inner observable is paired with exactly one right value: each
//! element `x` of the n-th inner is emitted as `(x, r)` where `r` is the
//! n-th right value. One inner is open at a time; the next left value is
//! requested only once the current inner completed.
//!
//! Inner elements wait for their right value, and the right value is held
//! until the inner completes. An inner that completes before its right
//! value arrived releases the left side immediately; the right value is then
//! acknowledged on arrival without output.
//!
//! Acknowledgments of inner elements are resolved on the emission
//! scheduler, one hop after the downstream acknowledged the pair.

use std::{marker::PhantomData, sync::Arc};

use super::Pending;
use crate::{
  ack::{continue_ack, stop_ack, Ack, Outcome},
  error::{fail_fast, ProtocolViolation},
  observable::{BoxedObservable, Observable},
  observer::{BoxedObserver, Observer},
  rc::MutArc,
  scheduler::SharedScheduler,
  subscription::{SharedSubscription, SubscriptionLike, Teardown},
};

/// FlatZip operator, see
/// [`ObservableExt::flat_zip`](crate::observable::ObservableExt::flat_zip).
pub struct FlatZipOp<S1, S2, F, L> {
  pub(crate) left: S1,
  pub(crate) right: S2,
  pub(crate) selector: Arc<F>,
  pub(crate) _p: PhantomData<fn(L)>,
}

type Selector<L, X, Err> = Arc<dyn Fn(L) -> BoxedObservable<X, Err> + Send + Sync>;

struct Outer {
  ack: Ack,
  inner_completed: bool,
}

struct FlatZipState<X, R> {
  /// The left value whose inner is open.
  outer: Option<Outer>,
  right: Option<Pending<R>>,
  /// Inner element waiting for the right value.
  inner: Option<Pending<X>>,
  /// A pair is waiting for the downstream acknowledgment.
  inner_in_flight: bool,
  /// Right values whose inner completed empty before they arrived.
  owed_rights: usize,
  /// Bumped for every inner, events of older inners are ignored.
  generation: usize,
  left_completed: bool,
  right_completed: bool,
  emitting: usize,
  finished: bool,
}

impl<X, R> FlatZipState<X, R> {
  fn should_finish(&self) -> bool {
    !self.finished
      && self.emitting == 0
      && ((self.left_completed && self.outer.is_none())
        || (self.right_completed && self.right.is_none()))
  }

  fn finish(&mut self) -> Vec<Ack> {
    self.finished = true;
    let outer = self.outer.take().map(|o| o.ack);
    let right = self.right.take().map(|p| p.ack);
    let inner = self.inner.take().map(|p| p.ack);
    outer.into_iter().chain(right).chain(inner).collect()
  }

  /// Release the left side once the open inner is done, consuming the right
  /// value paired with it.
  fn release_inner(&mut self) -> Vec<(Ack, Outcome)> {
    let done = self
      .outer
      .as_ref()
      .is_some_and(|o| o.inner_completed && self.inner.is_none() && !self.inner_in_flight);
    if !done {
      return vec![];
    }
    let mut released = vec![];
    if let Some(outer) = self.outer.take() {
      released.push((outer.ack, Outcome::Continue));
    }
    match self.right.take() {
      Some(right) => released.push((right.ack, Outcome::Continue)),
      None => self.owed_rights += 1,
    }
    released
  }
}

struct FlatZipCore<L, X, R, Err> {
  state: MutArc<FlatZipState<X, R>>,
  downstream: MutArc<BoxedObserver<(X, R), Err>>,
  selector: Selector<L, X, Err>,
  scheduler: SharedScheduler,
  subscribe_scheduler: SharedScheduler,
  inner_subscription: MutArc<Option<(usize, SharedSubscription)>>,
}

impl<L, X, R, Err> FlatZipCore<L, X, R, Err>
where
  L: Send + 'static,
  X: Send + 'static,
  R: Clone + Send + 'static,
  Err: Send + 'static,
{
  fn on_left(self: &Arc<Self>, value: L) -> Ack {
    let (ack, generation) = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return stop_ack();
      }
      if state.outer.is_some() {
        drop(state);
        fail_fast(ProtocolViolation::EmissionBeforeAck { operator: "flat_zip", side: "left" });
      }
      let ack = Ack::new();
      state.outer = Some(Outer { ack: ack.clone(), inner_completed: false });
      state.generation += 1;
      (ack, state.generation)
    };

    tracing::debug!(generation, "flat_zip: inner opened");
    let inner = (self.selector)(value);
    let observer = Box::new(FlatZipInnerObserver { core: self.clone(), generation });
    let subscription =
      inner.actual_subscribe(observer, &self.scheduler, &self.subscribe_scheduler);
    let mut current = self.inner_subscription.rc_deref_mut();
    // a synchronous inner may already have been replaced by a later one
    if current.as_ref().is_none_or(|(open, _)| *open < generation) {
      *current = Some((generation, subscription));
    }
    ack
  }

  fn on_right(self: &Arc<Self>, value: R) -> Ack {
    let (ack, held) = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return stop_ack();
      }
      if state.right.is_some() {
        drop(state);
        fail_fast(ProtocolViolation::EmissionBeforeAck { operator: "flat_zip", side: "right" });
      }
      if state.owed_rights > 0 {
        state.owed_rights -= 1;
        tracing::trace!("flat_zip: right value consumed by an empty inner");
        return continue_ack();
      }
      let (pending, ack) = Pending::hold(value);
      let held = state.inner.take().map(|inner| {
        state.inner_in_flight = true;
        state.emitting += 1;
        (inner, pending.value.clone())
      });
      state.right = Some(pending);
      (ack, held)
    };

    if let Some((inner, right)) = held {
      self.forward((inner.value, right), inner.ack);
    }
    ack
  }

  fn on_inner(self: &Arc<Self>, generation: usize, value: X) -> Ack {
    let right = {
      let mut state = self.state.rc_deref_mut();
      if state.finished || state.generation != generation {
        return stop_ack();
      }
      if state.inner.is_some() || state.inner_in_flight {
        drop(state);
        fail_fast(ProtocolViolation::EmissionBeforeAck { operator: "flat_zip", side: "inner" });
      }
      match state.right.as_ref().map(|right| right.value.clone()) {
        Some(right) => {
          state.inner_in_flight = true;
          state.emitting += 1;
          right
        }
        None => {
          let (pending, ack) = Pending::hold(value);
          state.inner = Some(pending);
          return ack;
        }
      }
    };

    let ack = Ack::new();
    self.forward((value, right), ack.clone());
    ack
  }

  /// Emit a pair; `inner_ack` is resolved on the emission scheduler once the
  /// downstream acknowledged.
  fn forward(self: &Arc<Self>, pair: (X, R), inner_ack: Ack) {
    tracing::trace!("flat_zip: pair emitted");
    let downstream_ack = self.downstream.rc_deref_mut().on_next(pair);
    self.emitted();

    let core = self.clone();
    downstream_ack.on_resolved(move |outcome| {
      let scheduler = core.scheduler.clone();
      scheduler.schedule(Box::new(move || core.inner_acknowledged(outcome, inner_ack)));
    });
  }

  fn inner_acknowledged(self: &Arc<Self>, outcome: Outcome, inner_ack: Ack) {
    if outcome.is_stop() {
      self.cancel();
      inner_ack.resolve(Outcome::Stop);
      return;
    }
    let released = {
      let mut state = self.state.rc_deref_mut();
      state.inner_in_flight = false;
      state.release_inner()
    };
    inner_ack.resolve(Outcome::Continue);
    self.release(released);
  }

  fn complete_inner(self: &Arc<Self>, generation: usize) {
    let released = {
      let mut state = self.state.rc_deref_mut();
      if state.finished || state.generation != generation {
        return;
      }
      let Some(outer) = state.outer.as_mut() else {
        return;
      };
      outer.inner_completed = true;
      state.release_inner()
    };
    tracing::debug!(generation, "flat_zip: inner completed");
    self.release(released);
  }

  fn release(&self, released: Vec<(Ack, Outcome)>) {
    for (ack, outcome) in released {
      ack.resolve(outcome);
    }
    self.try_finish();
  }

  fn emitted(&self) {
    self.state.rc_deref_mut().emitting -= 1;
    self.try_finish();
  }

  fn try_finish(&self) {
    let owed = {
      let mut state = self.state.rc_deref_mut();
      if !state.should_finish() {
        return;
      }
      state.finish()
    };
    tracing::debug!("flat_zip: completed");
    self.downstream.rc_deref_mut().on_completed();
    self.stop_all(owed);
  }

  /// The downstream answered `Stop`.
  fn cancel(&self) {
    let owed = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return;
      }
      state.finish()
    };
    tracing::debug!("flat_zip: cancelled by downstream");
    self.stop_all(owed);
  }

  fn error(&self, err: Err) {
    let owed = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return;
      }
      state.finish()
    };
    tracing::debug!("flat_zip: errored");
    self.downstream.rc_deref_mut().on_error(err);
    self.stop_all(owed);
  }

  fn stop_all(&self, owed: Vec<Ack>) {
    for ack in owed {
      ack.resolve(Outcome::Stop);
    }
    let inner = self.inner_subscription.rc_deref_mut().take();
    if let Some((_, mut inner)) = inner {
      inner.unsubscribe();
    }
  }
}

struct FlatZipLeftObserver<L, X, R, Err>(Arc<FlatZipCore<L, X, R, Err>>);

struct FlatZipRightObserver<L, X, R, Err>(Arc<FlatZipCore<L, X, R, Err>>);

struct FlatZipInnerObserver<L, X, R, Err> {
  core: Arc<FlatZipCore<L, X, R, Err>>,
  generation: usize,
}

impl<L, X, R, Err> Observer<L, Err> for FlatZipLeftObserver<L, X, R, Err>
where
  L: Send + 'static,
  X: Send + 'static,
  R: Clone + Send + 'static,
  Err: Send + 'static,
{
  fn on_next(&mut self, value: L) -> Ack { self.0.on_left(value) }

  fn on_error(&mut self, err: Err) { self.0.error(err) }

  fn on_completed(&mut self) {
    self.0.state.rc_deref_mut().left_completed = true;
    self.0.try_finish();
  }
}

impl<L, X, R, Err> Observer<R, Err> for FlatZipRightObserver<L, X, R, Err>
where
  L: Send + 'static,
  X: Send + 'static,
  R: Clone + Send + 'static,
  Err: Send + 'static,
{
  fn on_next(&mut self, value: R) -> Ack { self.0.on_right(value) }

  fn on_error(&mut self, err: Err) { self.0.error(err) }

  fn on_completed(&mut self) {
    self.0.state.rc_deref_mut().right_completed = true;
    self.0.try_finish();
  }
}

impl<L, X, R, Err> Observer<X, Err> for FlatZipInnerObserver<L, X, R, Err>
where
  L: Send + 'static,
  X: Send + 'static,
  R: Clone + Send + 'static,
  Err: Send + 'static,
{
  fn on_next(&mut self, value: X) -> Ack { self.core.on_inner(self.generation, value) }

  fn on_error(&mut self, err: Err) { self.core.error(err) }

  fn on_completed(&mut self) { self.core.complete_inner(self.generation) }
}

impl<L, X, R, Err, S1, S2, F, Inner> Observable<(X, R), Err> for FlatZipOp<S1, S2, F, L>
where
  S1: Observable<L, Err>,
  S2: Observable<R, Err>,
  F: Fn(L) -> Inner + Send + Sync + 'static,
  Inner: Observable<X, Err> + 'static,
  L: Send + 'static,
  X: Send + 'static,
  R: Clone + Send + 'static,
  Err: Send + 'static,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<(X, R), Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let selector = self.selector.clone();
    let core = Arc::new(FlatZipCore {
      state: MutArc::own(FlatZipState {
        outer: None,
        right: None,
        inner: None,
        inner_in_flight: false,
        owed_rights: 0,
        generation: 0,
        left_completed: false,
        right_completed: false,
        emitting: 0,
        finished: false,
      }),
      downstream: MutArc::own(observer),
      selector: Arc::new(move |v| -> BoxedObservable<X, Err> { Arc::new(selector(v)) }),
      scheduler: scheduler.clone(),
      subscribe_scheduler: subscribe_scheduler.clone(),
      inner_subscription: MutArc::own(None),
    });

    let subscription = SharedSubscription::default();
    let right = Box::new(FlatZipRightObserver(core.clone()));
    subscription.add(self.right.actual_subscribe(right, scheduler, subscribe_scheduler));
    let left = Box::new(FlatZipLeftObserver(core.clone()));
    subscription.add(self.left.actual_subscribe(left, scheduler, subscribe_scheduler));
    let inner = core.inner_subscription.clone();
    subscription.add(Teardown::new(move || {
      let current = inner.rc_deref_mut().take();
      if let Some((_, mut current)) = current {
        current.unsubscribe();
      }
    }));
    subscription
  }
}
