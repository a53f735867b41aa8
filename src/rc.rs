//! Shared mutable cells used by every stateful operator.
//!
//! Acknowledgments may resolve on any thread, so all shared state lives
//! behind an `Arc<Mutex<_>>`. A poisoned lock is recovered instead of
//! propagated: the state it guards is still consistent because no critical
//! section in this crate calls back into user code while holding it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
pub struct MutArc<T>(Arc<Mutex<T>>);

impl<T> MutArc<T> {
  pub fn own(t: T) -> Self { Self(Arc::new(Mutex::new(t))) }

  /// Lock the cell for the duration of the returned guard.
  #[inline]
  pub fn rc_deref_mut(&self) -> MutexGuard<'_, T> {
    self.0.lock().unwrap_or_else(PoisonError::into_inner)
  }

  #[inline]
  pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl<T> Clone for MutArc<T> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> From<T> for MutArc<T> {
  #[inline]
  fn from(t: T) -> Self { Self::own(t) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clones_share_state() {
    let a = MutArc::own(1);
    let b = a.clone();
    *b.rc_deref_mut() += 1;
    assert_eq!(*a.rc_deref_mut(), 2);
    assert!(a.ptr_eq(&b));
    assert!(!a.ptr_eq(&MutArc::own(2)));
  }

  #[test]
  fn recovers_from_poison() {
    let a = MutArc::own(vec![1]);
    let b = a.clone();
    let _ = std::thread::spawn(move || {
      let _guard = b.rc_deref_mut();
      panic!("poison the lock");
    })
    .join();
    a.rc_deref_mut().push(2);
    assert_eq!(*a.rc_deref_mut(), vec![1, 2]);
  }
}
