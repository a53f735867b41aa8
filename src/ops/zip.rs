//! Zip operator implementation
//!
//! Zip combines two observables pairwise under backpressure. Each side holds
//! at most one value: a value that cannot be paired yet stays pending and
//! its acknowledgment stays unresolved, which holds that side back until the
//! other side catches up.
//!
//! With a [`KeyOrder`](super::KeyOrder) policy the operator is a merge join
//! over two sorted streams: a value that sorts before the other side's
//! pending value can never be matched and is skipped.

use std::sync::Arc;

use super::{Alignment, JoinPolicy, Pending};
use crate::{
  ack::{continue_ack, stop_ack, Ack, Outcome},
  error::{fail_fast, ProtocolViolation},
  observable::Observable,
  observer::{BoxedObserver, Observer},
  rc::MutArc,
  scheduler::SharedScheduler,
  subscription::SharedSubscription,
};

/// Zip operator, see [`ObservableExt::zip`](crate::observable::ObservableExt::zip)
/// and [`ObservableExt::zip_by`](crate::observable::ObservableExt::zip_by).
pub struct ZipOp<S1, S2, P> {
  pub(crate) left: S1,
  pub(crate) right: S2,
  pub(crate) policy: Arc<P>,
}

// ==================== Shared State ====================

struct ZipState<L, R> {
  left: Option<Pending<L>>,
  right: Option<Pending<R>>,
  left_completed: bool,
  right_completed: bool,
  /// A pair is being handed downstream.
  emitting: bool,
  finished: bool,
}

impl<L, R> ZipState<L, R> {
  fn should_finish(&self) -> bool {
    !self.finished
      && !self.emitting
      && ((self.left_completed && self.left.is_none())
        || (self.right_completed && self.right.is_none()))
  }

  /// Mark the operator finished and collect the acknowledgments still
  /// owed to the two sources.
  fn finish(&mut self) -> Vec<Ack> {
    self.finished = true;
    let left = self.left.take().map(|p| p.ack);
    let right = self.right.take().map(|p| p.ack);
    left.into_iter().chain(right).collect()
  }
}

enum Arrival<L, R> {
  Emit(L, R, Ack),
  Hold(Ack),
  Skip { released: Option<Ack>, ack: Ack },
  Refuse,
  Violation,
}

struct ZipCore<L, R, Err, P> {
  state: MutArc<ZipState<L, R>>,
  downstream: MutArc<BoxedObserver<(L, R), Err>>,
  policy: Arc<P>,
}

impl<L, R, Err, P> ZipCore<L, R, Err, P>
where
  P: JoinPolicy<L, R>,
{
  fn on_left(&self, value: L) -> Ack {
    let arrival = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        Arrival::Refuse
      } else if state.left.is_some() {
        Arrival::Violation
      } else {
        match state.right.take() {
          None => {
            let (pending, ack) = Pending::hold(value);
            state.left = Some(pending);
            Arrival::Hold(ack)
          }
          Some(right) => match self.policy.align(&value, &right.value) {
            Alignment::Match => {
              state.emitting = true;
              Arrival::Emit(value, right.value, right.ack)
            }
            Alignment::RightLower => {
              tracing::trace!("zip: right value skipped");
              let (pending, ack) = Pending::hold(value);
              state.left = Some(pending);
              Arrival::Skip { released: Some(right.ack), ack }
            }
            Alignment::RightHigher => {
              tracing::trace!("zip: left value skipped");
              state.right = Some(right);
              Arrival::Skip { released: None, ack: continue_ack() }
            }
          },
        }
      }
    };

    match arrival {
      Arrival::Emit(l, r, other) => self.emit((l, r), other),
      Arrival::Hold(ack) => ack,
      Arrival::Skip { released, ack } => {
        if let Some(released) = released {
          released.resolve(Outcome::Continue);
        }
        self.try_finish();
        ack
      }
      Arrival::Refuse => stop_ack(),
      Arrival::Violation => {
        fail_fast(ProtocolViolation::EmissionBeforeAck { operator: "zip", side: "left" })
      }
    }
  }

  fn on_right(&self, value: R) -> Ack {
    let arrival = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        Arrival::Refuse
      } else if state.right.is_some() {
        Arrival::Violation
      } else {
        match state.left.take() {
          None => {
            let (pending, ack) = Pending::hold(value);
            state.right = Some(pending);
            Arrival::Hold(ack)
          }
          Some(left) => match self.policy.align(&left.value, &value) {
            Alignment::Match => {
              state.emitting = true;
              Arrival::Emit(left.value, value, left.ack)
            }
            Alignment::RightLower => {
              tracing::trace!("zip: right value skipped");
              state.left = Some(left);
              Arrival::Skip { released: None, ack: continue_ack() }
            }
            Alignment::RightHigher => {
              tracing::trace!("zip: left value skipped");
              let (pending, ack) = Pending::hold(value);
              state.right = Some(pending);
              Arrival::Skip { released: Some(left.ack), ack }
            }
          },
        }
      }
    };

    match arrival {
      Arrival::Emit(l, r, other) => self.emit((l, r), other),
      Arrival::Hold(ack) => ack,
      Arrival::Skip { released, ack } => {
        if let Some(released) = released {
          released.resolve(Outcome::Continue);
        }
        self.try_finish();
        ack
      }
      Arrival::Refuse => stop_ack(),
      Arrival::Violation => {
        fail_fast(ProtocolViolation::EmissionBeforeAck { operator: "zip", side: "right" })
      }
    }
  }

  /// Send a pair downstream; the downstream acknowledgment answers the
  /// arriving side and is forwarded to the side that was waiting.
  fn emit(&self, pair: (L, R), waiting: Ack) -> Ack {
    tracing::trace!("zip: pair emitted");
    let ack = self.downstream.rc_deref_mut().on_next(pair);
    self.state.rc_deref_mut().emitting = false;
    self.try_finish();
    ack.chain(&waiting);
    ack
  }

  fn try_finish(&self) {
    let owed = {
      let mut state = self.state.rc_deref_mut();
      if !state.should_finish() {
        return;
      }
      state.finish()
    };
    tracing::debug!("zip: completed");
    self.downstream.rc_deref_mut().on_completed();
    for ack in owed {
      ack.resolve(Outcome::Stop);
    }
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
    let owed = {
      let mut state = self.state.rc_deref_mut();
      if state.finished {
        return;
      }
      state.finish()
    };
    tracing::debug!("zip: errored");
    self.downstream.rc_deref_mut().on_error(err);
    for ack in owed {
      ack.resolve(Outcome::Stop);
    }
  }
}

// ==================== Observer Structs ====================

/// Observer for the left source
struct ZipLeftObserver<L, R, Err, P>(Arc<ZipCore<L, R, Err, P>>);

/// Observer for the right source
struct ZipRightObserver<L, R, Err, P>(Arc<ZipCore<L, R, Err, P>>);

impl<L, R, Err, P> Observer<L, Err> for ZipLeftObserver<L, R, Err, P>
where
  P: JoinPolicy<L, R>,
{
  fn on_next(&mut self, value: L) -> Ack { self.0.on_left(value) }

  fn on_error(&mut self, err: Err) { self.0.error(err) }

  fn on_completed(&mut self) { self.0.complete_left() }
}

impl<L, R, Err, P> Observer<R, Err> for ZipRightObserver<L, R, Err, P>
where
  P: JoinPolicy<L, R>,
{
  fn on_next(&mut self, value: R) -> Ack { self.0.on_right(value) }

  fn on_error(&mut self, err: Err) { self.0.error(err) }

  fn on_completed(&mut self) { self.0.complete_right() }
}

// ==================== Observable Implementation ====================

impl<L, R, Err, S1, S2, P> Observable<(L, R), Err> for ZipOp<S1, S2, P>
where
  S1: Observable<L, Err>,
  S2: Observable<R, Err>,
  P: JoinPolicy<L, R> + 'static,
  L: Send + 'static,
  R: Send + 'static,
  Err: Send + 'static,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<(L, R), Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let core = Arc::new(ZipCore {
      state: MutArc::own(ZipState {
        left: None,
        right: None,
        left_completed: false,
        right_completed: false,
        emitting: false,
        finished: false,
      }),
      downstream: MutArc::own(observer),
      policy: self.policy.clone(),
    });

    let subscription = SharedSubscription::default();
    let right = Box::new(ZipRightObserver(core.clone()));
    subscription.add(self.right.actual_subscribe(right, scheduler, subscribe_scheduler));
    let left = Box::new(ZipLeftObserver(core));
    subscription.add(self.left.actual_subscribe(left, scheduler, subscribe_scheduler));
    subscription
  }
}
