//! Error taxonomy.
//!
//! Upstream errors are not listed here: they travel through the `Err` type
//! parameter of [`Observer`](crate::observer::Observer). Negotiated
//! termination through [`Outcome::Stop`] is not an error either.

use thiserror::Error;

use crate::ack::Outcome;

/// Out-of-range access into a [`DequeuableBuffer`](crate::buffer::DequeuableBuffer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
  /// The element was already dequeued.
  #[error("index {idx} is smaller than first index {first_idx}")]
  IndexTooOld { idx: usize, first_idx: usize },
  /// The element has not been appended yet.
  #[error("index {idx} is not yet available, last index is {last_idx}")]
  IndexNotYetAvailable { idx: usize, last_idx: usize },
}

/// A caller broke the acknowledgment protocol.
///
/// These are never recovered from: continuing would either double-request
/// elements from a source or corrupt buffer indices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
  #[error("ack already resolved to {existing:?}, cannot resolve it to {attempted:?}")]
  AckAlreadyResolved { existing: Outcome, attempted: Outcome },
  #[error("{operator}: {side} emitted before its previous acknowledgment resolved")]
  EmissionBeforeAck { operator: &'static str, side: &'static str },
  #[error(transparent)]
  Buffer(#[from] BufferError),
}

/// Report a protocol violation and abort the current call.
#[cold]
#[track_caller]
pub(crate) fn fail_fast(violation: ProtocolViolation) -> ! {
  tracing::error!(%violation, "protocol violation");
  panic!("{violation}")
}
