pub mod flat_map;
pub mod flat_zip;
pub mod observe_on;
pub mod ref_count;
pub mod window;
pub mod zip;

use crate::ack::Ack;

/// A value held back by an operator together with the acknowledgment its
/// producer is waiting on.
pub(crate) struct Pending<T> {
  pub value: T,
  pub ack: Ack,
}

impl<T> Pending<T> {
  /// Hold `value` back; the returned acknowledgment is handed to the
  /// producer.
  pub fn hold(value: T) -> (Self, Ack) {
    let ack = Ack::new();
    (Pending { value, ack: ack.clone() }, ack)
  }
}

/// Where the right value sorts relative to the left value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
  /// Same key: the two values belong together.
  Match,
  /// The right value sorts before the left one and can never match it or
  /// any later left value.
  RightLower,
  /// The right value sorts after the left one; the left value can never
  /// match it or any later right value.
  RightHigher,
}

/// Decides how a pending left value and a pending right value relate.
pub trait JoinPolicy<L, R>: Send + Sync {
  fn align(&self, left: &L, right: &R) -> Alignment;
}

/// Pairs values by arrival position.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl<L, R> JoinPolicy<L, R> for MatchAll {
  #[inline]
  fn align(&self, _: &L, _: &R) -> Alignment { Alignment::Match }
}

/// Pairs values of two ordered streams by key.
///
/// `is_lower(l, r)` holds when `r` sorts before `l`, `is_higher(l, r)` when
/// `r` sorts after `l`. When both hold, `is_higher` wins.
#[derive(Clone)]
pub struct KeyOrder<Lo, Hi> {
  pub is_lower: Lo,
  pub is_higher: Hi,
}

impl<L, R, Lo, Hi> JoinPolicy<L, R> for KeyOrder<Lo, Hi>
where
  Lo: Fn(&L, &R) -> bool + Send + Sync,
  Hi: Fn(&L, &R) -> bool + Send + Sync,
{
  fn align(&self, left: &L, right: &R) -> Alignment {
    if (self.is_higher)(left, right) {
      Alignment::RightHigher
    } else if (self.is_lower)(left, right) {
      Alignment::RightLower
    } else {
      Alignment::Match
    }
  }
}
