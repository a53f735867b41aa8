//! Window operator implementation
//!
//! `window` joins a stream of keys (left) with an ordered stream of values
//! (right). Every left value opens a window, a [`PublishSubject`] carrying
//! the right values that match it, and the window closes as soon as a
//! right value sorts after the left key:
//!
//! ```text
//!   left:   1 ------------- 2 ------- 3 -----|
//!   right:  --- 1 -- 1 -- 3 ------------------|
//!
//!   left half:  (1, [1, 1]) (2, []) (3, [3])
//!   right half: (true, 1) (true, 1) (true, 3)
//! ```
//!
//! The operator yields two observables. The left half emits
//! `(key, window)`; the right half emits `(matched, value)` for every right
//! value, `matched` being false for values that sorted before every key.
//! Both upstreams are subscribed when the first half is subscribed and
//! released once both halves unsubscribed; subscribing again reconnects
//! them. A half nobody subscribed to acknowledges everything with
//! `Continue`.
//!
//! Windows are hot: subscribe to a window from within the left half's
//! `on_next` to see all of its values.

use std::sync::Arc;

use super::{Alignment, JoinPolicy, KeyOrder, Pending};
use crate::{
  ack::{stop_ack, Ack, Outcome},
  error::{fail_fast, ProtocolViolation},
  observable::{BoxedObservable, Observable},
  observer::{BoxedObserver, Observer},
  rc::MutArc,
  scheduler::SharedScheduler,
  subject::PublishSubject,
  subscription::{SharedSubscription, SubscriptionLike, Teardown},
};

type LeftOut<L, R, Err> = MutArc<Option<BoxedObserver<(L, PublishSubject<R, Err>), Err>>>;
type RightOut<R, Err> = MutArc<Option<BoxedObserver<(bool, R), Err>>>;

struct OpenWindow<L, R, Err> {
  key: L,
  ack: Ack,
  window: PublishSubject<R, Err>,
}

struct WindowState<L, R, Err> {
  left: Option<OpenWindow<L, R, Err>>,
  right: Option<Pending<R>>,
  left_completed: bool,
  right_completed: bool,
  emitting: usize,
  finished: bool,
}

impl<L, R, Err> WindowState<L, R, Err> {
  fn new() -> Self {
    WindowState {
      left: None,
      right: None,
      left_completed: false,
      right_completed: false,
      emitting: 0,
      finished: false,
    }
  }

  fn should_finish(&self) -> bool {
    !self.finished
      && self.emitting == 0
      && ((self.left_completed && self.left.is_none())
        || (self.right_completed && self.right.is_none()))
  }
}

struct WindowCore<L, R, Err> {
  state: MutArc<WindowState<L, R, Err>>,
  policy: Arc<dyn JoinPolicy<L, R>>,
  left_out: LeftOut<L, R, Err>,
  right_out: RightOut<R, Err>,
}

impl<L, R, Err> WindowCore<L, R, Err>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn on_left(&self, key: L) -> Ack {
    {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return stop_ack();
      }
      if state.left.is_some() {
        drop(state);
        fail_fast(ProtocolViolation::EmissionBeforeAck { operator: "window", side: "left" });
      }
      state.emitting += 1;
    }

    let mut window = PublishSubject::new();
    let outer = self.left_out.rc_deref_mut().on_next((key.clone(), window.clone()));

    let mut state = self.state.rc_deref_mut();
    state.emitting -= 1;
    if state.finished {
      drop(state);
      window.on_completed();
      return stop_ack();
    }

    let Some(right) = state.right.take() else {
      let (open, ack) = hold(key, window);
      state.left = Some(open);
      drop(state);
      // a completion may have arrived while the window was being emitted
      self.try_finish();
      return ack.merge(&outer);
    };

    match self.policy.align(&key, &right.value) {
      Alignment::RightHigher => {
        tracing::trace!("window: empty window closed");
        state.right = Some(right);
        drop(state);
        window.on_completed();
        self.try_finish();
        outer
      }
      Alignment::RightLower => {
        tracing::trace!("window: right value skipped");
        let (open, ack) = hold(key, window);
        state.left = Some(open);
        state.emitting += 1;
        drop(state);
        let skipped = self.right_out.rc_deref_mut().on_next((false, right.value));
        self.emitted();
        skipped.chain(&right.ack);
        ack.merge(&outer)
      }
      Alignment::Match => {
        let (open, ack) = hold(key, window.clone());
        state.left = Some(open);
        state.emitting += 1;
        drop(state);
        let inner = window.on_next(right.value.clone());
        let matched = self.right_out.rc_deref_mut().on_next((true, right.value));
        self.emitted();
        inner.chain_pair(&matched, &right.ack);
        ack.merge(&outer)
      }
    }
  }

  fn on_right(&self, value: R) -> Ack {
    let mut state = self.state.rc_deref_mut();
    if state.finished {
      return stop_ack();
    }
    if state.right.is_some() {
      drop(state);
      fail_fast(ProtocolViolation::EmissionBeforeAck { operator: "window", side: "right" });
    }

    let Some(open) = state.left.take() else {
      let (pending, ack) = Pending::hold(value);
      state.right = Some(pending);
      return ack;
    };

    match self.policy.align(&open.key, &value) {
      Alignment::RightHigher => {
        tracing::trace!("window: window closed");
        let (pending, ack) = Pending::hold(value);
        state.right = Some(pending);
        drop(state);
        let OpenWindow { ack: left_ack, mut window, .. } = open;
        window.on_completed();
        left_ack.resolve(Outcome::Continue);
        self.try_finish();
        ack
      }
      Alignment::RightLower => {
        tracing::trace!("window: right value skipped");
        state.left = Some(open);
        state.emitting += 1;
        drop(state);
        let ack = self.right_out.rc_deref_mut().on_next((false, value));
        self.emitted();
        ack
      }
      Alignment::Match => {
        let mut window = open.window.clone();
        state.left = Some(open);
        state.emitting += 1;
        drop(state);
        let inner = window.on_next(value.clone());
        let matched = self.right_out.rc_deref_mut().on_next((true, value));
        self.emitted();
        inner.merge(&matched)
      }
    }
  }

  fn emitted(&self) {
    self.state.rc_deref_mut().emitting -= 1;
    self.try_finish();
  }

  fn try_finish(&self) {
    let (left, right) = {
      let mut state = self.state.rc_deref_mut();
      if !state.should_finish() {
        return;
      }
      state.finished = true;
      (state.left.take(), state.right.take())
    };
    tracing::debug!("window: completed");
    if let Some(OpenWindow { ack, mut window, .. }) = left {
      window.on_completed();
      ack.resolve(Outcome::Stop);
    }
    if let Some(right) = right {
      right.ack.resolve(Outcome::Stop);
    }
    self.left_out.rc_deref_mut().on_completed();
    self.right_out.rc_deref_mut().on_completed();
  }

  fn complete_left(&self) {
    self.state.rc_deref_mut().left_completed = true;
    self.try_finish();
  }

  fn complete_right(&self) {
    self.state.rc_deref_mut().right_completed = true;
    self.try_finish();
  }

  fn error(&self, err: Err) {
    let (left, right) = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return;
      }
      state.finished = true;
      (state.left.take(), state.right.take())
    };
    tracing::debug!("window: errored");
    if let Some(OpenWindow { ack, mut window, .. }) = left {
      window.on_error(err.clone());
      ack.resolve(Outcome::Stop);
    }
    if let Some(right) = right {
      right.ack.resolve(Outcome::Stop);
    }
    self.left_out.rc_deref_mut().on_error(err.clone());
    self.right_out.rc_deref_mut().on_error(err);
  }
}

fn hold<L, R, Err>(key: L, window: PublishSubject<R, Err>) -> (OpenWindow<L, R, Err>, Ack) {
  let ack = Ack::new();
  (OpenWindow { key, ack: ack.clone(), window }, ack)
}

struct WindowLeftObserver<L, R, Err>(Arc<WindowCore<L, R, Err>>);

struct WindowRightObserver<L, R, Err>(Arc<WindowCore<L, R, Err>>);

impl<L, R, Err> Observer<L, Err> for WindowLeftObserver<L, R, Err>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn on_next(&mut self, value: L) -> Ack { self.0.on_left(value) }

  fn on_error(&mut self, err: Err) { self.0.error(err) }

  fn on_completed(&mut self) { self.0.complete_left() }
}

impl<L, R, Err> Observer<R, Err> for WindowRightObserver<L, R, Err>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn on_next(&mut self, value: R) -> Ack { self.0.on_right(value) }

  fn on_error(&mut self, err: Err) { self.0.error(err) }

  fn on_completed(&mut self) { self.0.complete_right() }
}

// ==================== Output halves ====================

#[derive(Default)]
struct Link {
  started: bool,
  active: usize,
}

struct WindowShared<L, R, Err> {
  left: BoxedObservable<L, Err>,
  right: BoxedObservable<R, Err>,
  core: Arc<WindowCore<L, R, Err>>,
  link: MutArc<Link>,
  upstream: MutArc<SharedSubscription>,
}

impl<L, R, Err> WindowShared<L, R, Err>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  /// Count a new half subscriber and connect the upstreams on the first
  /// one.
  fn attach(
    self: &Arc<Self>, detach_out: impl FnOnce() + Send + 'static, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let start = {
      let mut link = self.link.rc_deref_mut();
      link.active += 1;
      !std::mem::replace(&mut link.started, true)
    };
    if start {
      tracing::debug!("window: connecting upstreams");
      *self.core.state.rc_deref_mut() = WindowState::new();
      let upstream = SharedSubscription::default();
      *self.upstream.rc_deref_mut() = upstream.clone();
      let left = Box::new(WindowLeftObserver(self.core.clone()));
      upstream.add(self.left.actual_subscribe(left, scheduler, subscribe_scheduler));
      let right = Box::new(WindowRightObserver(self.core.clone()));
      upstream.add(self.right.actual_subscribe(right, scheduler, subscribe_scheduler));
    }

    let shared = self.clone();
    let subscription = SharedSubscription::default();
    subscription.add(Teardown::new(move || {
      detach_out();
      let last = {
        let mut link = shared.link.rc_deref_mut();
        link.active -= 1;
        if link.active == 0 {
          link.started = false;
        }
        link.active == 0
      };
      if last {
        tracing::debug!("window: disconnecting upstreams");
        let mut upstream = shared.upstream.rc_deref_mut().clone();
        upstream.unsubscribe();
      }
    }));
    subscription
  }
}

/// Left half of [`window`]: `(key, window)` per left value.
pub struct WindowLeft<L, R, Err>(Arc<WindowShared<L, R, Err>>);

/// Right half of [`window`]: `(matched, value)` per right value.
pub struct WindowRight<L, R, Err>(Arc<WindowShared<L, R, Err>>);

impl<L, R, Err> Clone for WindowLeft<L, R, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<L, R, Err> Clone for WindowRight<L, R, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<L, R, Err> Observable<(L, PublishSubject<R, Err>), Err> for WindowLeft<L, R, Err>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<(L, PublishSubject<R, Err>), Err>,
    scheduler: &SharedScheduler, subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let out = self.0.core.left_out.clone();
    *out.rc_deref_mut() = Some(observer);
    self.0.attach(move || drop(out.rc_deref_mut().take()), scheduler, subscribe_scheduler)
  }
}

impl<L, R, Err> Observable<(bool, R), Err> for WindowRight<L, R, Err>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<(bool, R), Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let out = self.0.core.right_out.clone();
    *out.rc_deref_mut() = Some(observer);
    self.0.attach(move || drop(out.rc_deref_mut().take()), scheduler, subscribe_scheduler)
  }
}

/// Split `right` into windows keyed by the values of `left`.
///
/// `is_lower(key, value)` tells that `value` sorts before `key` and belongs
/// to no window; `is_higher(key, value)` that it sorts after `key`, which
/// closes the current window. Anything else is a match.
pub fn window<L, R, Err, S1, S2, Lo, Hi>(
  left: S1, right: S2, is_lower: Lo, is_higher: Hi,
) -> (WindowLeft<L, R, Err>, WindowRight<L, R, Err>)
where
  S1: Observable<L, Err> + 'static,
  S2: Observable<R, Err> + 'static,
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Err: Clone + Send + 'static,
  Lo: Fn(&L, &R) -> bool + Send + Sync + 'static,
  Hi: Fn(&L, &R) -> bool + Send + Sync + 'static,
{
  let core = Arc::new(WindowCore {
    state: MutArc::own(WindowState::new()),
    policy: Arc::new(KeyOrder { is_lower, is_higher }),
    left_out: MutArc::own(None),
    right_out: MutArc::own(None),
  });
  let shared = Arc::new(WindowShared {
    left: Arc::new(left),
    right: Arc::new(right),
    core,
    link: MutArc::own(Link::default()),
    upstream: MutArc::default(),
  });
  (WindowLeft(shared.clone()), WindowRight(shared))
}
