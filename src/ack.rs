//! Acknowledgments: the backpressure signal returned by every `on_next`.
//!
//! An [`Ack`] is a single-assignment cell. The consumer resolves it to
//! [`Outcome::Continue`] once it is ready for the next element, or to
//! [`Outcome::Stop`] to cancel the stream. Producers must not emit again
//! before the previous `Ack` resolved to `Continue`.
//!
//! ```rust
//! use rxbackpressure::prelude::*;
//!
//! let downstream = Ack::new();
//! let upstream = Ack::new();
//! downstream.chain(&upstream);
//!
//! assert!(!upstream.has_value());
//! downstream.resolve(Outcome::Continue);
//! assert_eq!(upstream.value(), Some(Outcome::Continue));
//! ```

use std::{
  fmt::{Debug, Formatter},
  future::{Future, IntoFuture},
  pin::Pin,
  task::{Context, Poll},
};

use futures::{channel::oneshot, ready};
use pin_project_lite::pin_project;
use smallvec::SmallVec;

use crate::{
  error::{fail_fast, ProtocolViolation},
  rc::MutArc,
};

/// The value an [`Ack`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
  /// Request the next element.
  Continue,
  /// Cease emission.
  Stop,
}

impl Outcome {
  /// `Continue` only if both are `Continue`.
  #[inline]
  pub fn and(self, other: Outcome) -> Outcome {
    match (self, other) {
      (Outcome::Continue, Outcome::Continue) => Outcome::Continue,
      _ => Outcome::Stop,
    }
  }

  #[inline]
  pub fn is_continue(self) -> bool { self == Outcome::Continue }

  #[inline]
  pub fn is_stop(self) -> bool { self == Outcome::Stop }
}

type Callback = Box<dyn FnOnce(Outcome) + Send>;

enum AckState {
  Pending(SmallVec<[Callback; 1]>),
  Resolved(Outcome),
}

/// A single-assignment acknowledgment.
///
/// Cloning an `Ack` yields another handle to the same cell. An `Ack` built
/// with [`Ack::resolved`] carries its outcome inline and never allocates.
#[derive(Clone)]
pub struct Ack(Inner);

#[derive(Clone)]
enum Inner {
  Resolved(Outcome),
  Pending(MutArc<AckState>),
}

/// An already resolved `Continue` acknowledgment.
#[inline]
pub fn continue_ack() -> Ack { Ack::resolved(Outcome::Continue) }

/// An already resolved `Stop` acknowledgment.
#[inline]
pub fn stop_ack() -> Ack { Ack::resolved(Outcome::Stop) }

impl Default for Ack {
  fn default() -> Self { Self::new() }
}

impl From<Outcome> for Ack {
  #[inline]
  fn from(outcome: Outcome) -> Self { Ack::resolved(outcome) }
}

impl Ack {
  /// Create an unresolved acknowledgment.
  pub fn new() -> Self { Ack(Inner::Pending(MutArc::own(AckState::Pending(SmallVec::new())))) }

  #[inline]
  pub fn resolved(outcome: Outcome) -> Self { Ack(Inner::Resolved(outcome)) }

  /// Resolve the acknowledgment and run every registered continuation.
  ///
  /// Continuations run on the calling thread, after the internal lock has
  /// been released.
  pub fn try_resolve(&self, outcome: Outcome) -> Result<(), ProtocolViolation> {
    let state = match &self.0 {
      Inner::Resolved(existing) => {
        return Err(ProtocolViolation::AckAlreadyResolved {
          existing: *existing,
          attempted: outcome,
        });
      }
      Inner::Pending(state) => state,
    };

    let callbacks = {
      let mut state = state.rc_deref_mut();
      match std::mem::replace(&mut *state, AckState::Resolved(outcome)) {
        AckState::Pending(callbacks) => callbacks,
        AckState::Resolved(existing) => {
          *state = AckState::Resolved(existing);
          return Err(ProtocolViolation::AckAlreadyResolved { existing, attempted: outcome });
        }
      }
    };
    for callback in callbacks {
      callback(outcome);
    }
    Ok(())
  }

  /// Resolve the acknowledgment.
  ///
  /// # Panics
  ///
  /// Panics if the acknowledgment was already resolved.
  #[track_caller]
  pub fn resolve(&self, outcome: Outcome) {
    if let Err(violation) = self.try_resolve(outcome) {
      fail_fast(violation);
    }
  }

  pub fn value(&self) -> Option<Outcome> {
    match &self.0 {
      Inner::Resolved(outcome) => Some(*outcome),
      Inner::Pending(state) => match &*state.rc_deref_mut() {
        AckState::Resolved(outcome) => Some(*outcome),
        AckState::Pending(_) => None,
      },
    }
  }

  #[inline]
  pub fn has_value(&self) -> bool { self.value().is_some() }

  /// Run `f` once the acknowledgment resolves, immediately if it already has.
  pub fn on_resolved(&self, f: impl FnOnce(Outcome) + Send + 'static) {
    let resolved = match &self.0 {
      Inner::Resolved(outcome) => *outcome,
      Inner::Pending(state) => {
        let mut state = state.rc_deref_mut();
        match &mut *state {
          AckState::Pending(callbacks) => {
            callbacks.push(Box::new(f));
            return;
          }
          AckState::Resolved(outcome) => *outcome,
        }
      }
    };
    f(resolved);
  }

  /// Forward this acknowledgment's outcome to `next`.
  pub fn chain(&self, next: &Ack) {
    let next = next.clone();
    self.on_resolved(move |outcome| next.resolve(outcome));
  }

  /// Resolve `next` once both `self` and `other` resolved, to `Stop` if
  /// either of them is `Stop`.
  pub fn chain_pair(&self, other: &Ack, next: &Ack) { self.merge(other).chain(next); }

  /// An acknowledgment that resolves once both inputs resolved, to `Stop` if
  /// either of them is `Stop`.
  pub fn merge(&self, other: &Ack) -> Ack {
    if let (Some(a), Some(b)) = (self.value(), other.value()) {
      return Ack::resolved(a.and(b));
    }

    let merged = Ack::new();
    let result = merged.clone();
    let other = other.clone();
    self.on_resolved(move |a| other.on_resolved(move |b| result.resolve(a.and(b))));
    merged
  }
}

impl Debug for Ack {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Ack").field(&self.value()).finish()
  }
}

pin_project! {
  /// Future resolving to the outcome of an [`Ack`].
  ///
  /// Resolves to `Stop` if every handle to a pending `Ack` is dropped before
  /// it was resolved.
  pub struct AckFuture {
    #[pin]
    rx: oneshot::Receiver<Outcome>,
  }
}

impl Future for AckFuture {
  type Output = Outcome;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
    let outcome = ready!(self.project().rx.poll(cx));
    Poll::Ready(outcome.unwrap_or(Outcome::Stop))
  }
}

impl IntoFuture for Ack {
  type Output = Outcome;
  type IntoFuture = AckFuture;

  fn into_future(self) -> AckFuture {
    let (tx, rx) = oneshot::channel();
    self.on_resolved(move |outcome| {
      let _ = tx.send(outcome);
    });
    AckFuture { rx }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use futures::executor::block_on;

  use super::*;

  #[test]
  fn resolves_once() {
    let ack = Ack::new();
    assert!(!ack.has_value());
    assert_eq!(ack.try_resolve(Outcome::Continue), Ok(()));
    assert_eq!(
      ack.try_resolve(Outcome::Stop),
      Err(ProtocolViolation::AckAlreadyResolved {
        existing: Outcome::Continue,
        attempted: Outcome::Stop
      })
    );
    assert_eq!(ack.value(), Some(Outcome::Continue));
  }

  #[test]
  fn resolved_ack_rejects_resolution() {
    assert!(continue_ack().try_resolve(Outcome::Continue).is_err());
    assert_eq!(stop_ack().value(), Some(Outcome::Stop));
  }

  #[test]
  #[should_panic(expected = "already resolved")]
  fn resolve_twice_panics() {
    let ack = Ack::new();
    ack.resolve(Outcome::Stop);
    ack.resolve(Outcome::Stop);
  }

  #[test]
  fn callbacks_fire_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let ack = Ack::new();
    for _ in 0..3 {
      let hits = hits.clone();
      ack.on_resolved(move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
      });
    }
    ack.resolve(Outcome::Continue);
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let c_hits = hits.clone();
    ack.on_resolved(move |_| {
      c_hits.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(hits.load(Ordering::SeqCst), 4);
  }

  #[test]
  fn chain_forwards_outcome() {
    let source = Ack::new();
    let next = Ack::new();
    source.chain(&next);
    assert!(!next.has_value());
    source.resolve(Outcome::Stop);
    assert_eq!(next.value(), Some(Outcome::Stop));
  }

  #[test]
  fn chain_pair_waits_for_both() {
    let a = Ack::new();
    let b = Ack::new();
    let next = Ack::new();
    a.chain_pair(&b, &next);

    a.resolve(Outcome::Continue);
    assert!(!next.has_value());
    b.resolve(Outcome::Continue);
    assert_eq!(next.value(), Some(Outcome::Continue));
  }

  #[test]
  fn merge_is_stop_if_either_stops() {
    let a = Ack::new();
    let b = Ack::new();
    let merged = a.merge(&b);
    b.resolve(Outcome::Stop);
    assert!(!merged.has_value());
    a.resolve(Outcome::Continue);
    assert_eq!(merged.value(), Some(Outcome::Stop));

    assert_eq!(continue_ack().merge(&continue_ack()).value(), Some(Outcome::Continue));
    assert_eq!(continue_ack().merge(&stop_ack()).value(), Some(Outcome::Stop));
  }

  #[test]
  fn await_outcome() {
    let ack = Ack::new();
    let c_ack = ack.clone();
    let handle = std::thread::spawn(move || c_ack.resolve(Outcome::Continue));
    assert_eq!(block_on(ack.into_future()), Outcome::Continue);
    handle.join().unwrap();

    assert_eq!(block_on(stop_ack().into_future()), Outcome::Stop);
  }

  #[test]
  fn dropped_ack_reads_as_stop() {
    let future = Ack::new().into_future();
    assert_eq!(block_on(future), Outcome::Stop);
  }
}
