//! FlatMap operator implementation
//!
//! Each source value is mapped to an inner observable whose elements are
//! forwarded downstream. Inners are concatenated: the next source value is
//! requested only once the current inner completed and its last element was
//! acknowledged.

use std::{marker::PhantomData, sync::Arc};

use crate::{
  ack::{continue_ack, stop_ack, Ack, Outcome},
  error::{fail_fast, ProtocolViolation},
  observable::{BoxedObservable, Observable},
  observer::{BoxedObserver, Observer},
  rc::MutArc,
  scheduler::SharedScheduler,
  subscription::{SharedSubscription, SubscriptionLike, Teardown},
};

/// FlatMap operator, see
/// [`ObservableExt::flat_map`](crate::observable::ObservableExt::flat_map).
pub struct FlatMapOp<S, F, L> {
  pub(crate) source: S,
  pub(crate) selector: Arc<F>,
  pub(crate) _p: PhantomData<fn(L)>,
}

type Selector<L, X, Err> = Arc<dyn Fn(L) -> BoxedObservable<X, Err> + Send + Sync>;

struct FlatMapState {
  /// Acknowledgment of the source value whose inner is open.
  outer: Option<Ack>,
  /// Acknowledgment of the last element forwarded from the open inner.
  last: Ack,
  generation: usize,
  source_completed: bool,
  finished: bool,
}

struct FlatMapCore<L, X, Err> {
  state: MutArc<FlatMapState>,
  downstream: MutArc<BoxedObserver<X, Err>>,
  selector: Selector<L, X, Err>,
  scheduler: SharedScheduler,
  subscribe_scheduler: SharedScheduler,
  inner_subscription: MutArc<Option<(usize, SharedSubscription)>>,
}

impl<L, X, Err> FlatMapCore<L, X, Err>
where
  L: Send + 'static,
  X: Send + 'static,
  Err: Send + 'static,
{
  fn on_source(self: &Arc<Self>, value: L) -> Ack {
    let (ack, generation) = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return stop_ack();
      }
      if state.outer.is_some() {
        drop(state);
        fail_fast(ProtocolViolation::EmissionBeforeAck { operator: "flat_map", side: "source" });
      }
      let ack = Ack::new();
      state.outer = Some(ack.clone());
      state.last = continue_ack();
      state.generation += 1;
      (ack, state.generation)
    };

    let inner = (self.selector)(value);
    let observer = Box::new(FlatMapInnerObserver { core: self.clone(), generation });
    let subscription =
      inner.actual_subscribe(observer, &self.scheduler, &self.subscribe_scheduler);
    let mut current = self.inner_subscription.rc_deref_mut();
    if current.as_ref().is_none_or(|(open, _)| *open < generation) {
      *current = Some((generation, subscription));
    }
    ack
  }

  fn on_inner(self: &Arc<Self>, generation: usize, value: X) -> Ack {
    {
      let state = self.state.rc_deref_mut();
      if state.finished || state.generation != generation {
        return stop_ack();
      }
    }
    let ack = self.downstream.rc_deref_mut().on_next(value);
    self.state.rc_deref_mut().last = ack.clone();

    let core = self.clone();
    ack.on_resolved(move |outcome| {
      if outcome.is_stop() {
        core.cancel();
      }
    });
    ack
  }

  fn complete_inner(self: &Arc<Self>, generation: usize) {
    let last = {
      let state = self.state.rc_deref_mut();
      if state.finished || state.generation != generation {
        return;
      }
      state.last.clone()
    };
    let core = self.clone();
    last.on_resolved(move |outcome| {
      if outcome.is_continue() {
        core.release(generation);
      }
    });
  }

  fn release(&self, generation: usize) {
    let outer = {
      let mut state = self.state.rc_deref_mut();
      if state.finished || state.generation != generation {
        return;
      }
      state.outer.take()
    };
    tracing::debug!(generation, "flat_map: inner completed");
    if let Some(outer) = outer {
      outer.resolve(Outcome::Continue);
    }
    self.try_finish();
  }

  fn complete_source(&self) {
    self.state.rc_deref_mut().source_completed = true;
    self.try_finish();
  }

  fn try_finish(&self) {
    {
      let mut state = self.state.rc_deref_mut();
      if state.finished || !state.source_completed || state.outer.is_some() {
        return;
      }
      state.finished = true;
    }
    tracing::debug!("flat_map: completed");
    self.downstream.rc_deref_mut().on_completed();
  }

  fn cancel(&self) {
    let outer = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return;
      }
      state.finished = true;
      state.outer.take()
    };
    tracing::debug!("flat_map: cancelled by downstream");
    self.stop_all(outer);
  }

  fn error(&self, err: Err) {
    let outer = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return;
      }
      state.finished = true;
      state.outer.take()
    };
    self.downstream.rc_deref_mut().on_error(err);
    self.stop_all(outer);
  }

  fn stop_all(&self, outer: Option<Ack>) {
    if let Some(outer) = outer {
      outer.resolve(Outcome::Stop);
    }
    let inner = self.inner_subscription.rc_deref_mut().take();
    if let Some((_, mut inner)) = inner {
      inner.unsubscribe();
    }
  }
}

struct FlatMapSourceObserver<L, X, Err>(Arc<FlatMapCore<L, X, Err>>);

struct FlatMapInnerObserver<L, X, Err> {
  core: Arc<FlatMapCore<L, X, Err>>,
  generation: usize,
}

impl<L, X, Err> Observer<L, Err> for FlatMapSourceObserver<L, X, Err>
where
  L: Send + 'static,
  X: Send + 'static,
  Err: Send + 'static,
{
  fn on_next(&mut self, value: L) -> Ack { self.0.on_source(value) }

  fn on_error(&mut self, err: Err) { self.0.error(err) }

  fn on_completed(&mut self) { self.0.complete_source() }
}

impl<L, X, Err> Observer<X, Err> for FlatMapInnerObserver<L, X, Err>
where
  L: Send + 'static,
  X: Send + 'static,
  Err: Send + 'static,
{
  fn on_next(&mut self, value: X) -> Ack { self.core.on_inner(self.generation, value) }

  fn on_error(&mut self, err: Err) { self.core.error(err) }

  fn on_completed(&mut self) { self.core.complete_inner(self.generation) }
}

impl<L, X, Err, S, F, Inner> Observable<X, Err> for FlatMapOp<S, F, L>
where
  S: Observable<L, Err>,
  F: Fn(L) -> Inner + Send + Sync + 'static,
  Inner: Observable<X, Err> + 'static,
  L: Send + 'static,
  X: Send + 'static,
  Err: Send + 'static,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<X, Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let selector = self.selector.clone();
    let core = Arc::new(FlatMapCore {
      state: MutArc::own(FlatMapState {
        outer: None,
        last: continue_ack(),
        generation: 0,
        source_completed: false,
        finished: false,
      }),
      downstream: MutArc::own(observer),
      selector: Arc::new(move |v| -> BoxedObservable<X, Err> { Arc::new(selector(v)) }),
      scheduler: scheduler.clone(),
      subscribe_scheduler: subscribe_scheduler.clone(),
      inner_subscription: MutArc::own(None),
    });

    let subscription = SharedSubscription::default();
    let source = Box::new(FlatMapSourceObserver(core.clone()));
    subscription.add(self.source.actual_subscribe(source, scheduler, subscribe_scheduler));
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
