//! Index-addressed queue backing [`ControlledSubject`].
//!
//! Every element keeps the absolute index it was appended at. Readers walk
//! the buffer with their own cursors while the owner reclaims everything
//! below the slowest cursor with [`DequeuableBuffer::dequeue`].
//!
//! [`ControlledSubject`]: crate::subject::ControlledSubject

use std::collections::VecDeque;

use crate::error::BufferError;

#[derive(Debug, Clone)]
pub struct DequeuableBuffer<T> {
  first_idx: usize,
  queue: VecDeque<T>,
}

impl<T> Default for DequeuableBuffer<T> {
  fn default() -> Self { Self::new() }
}

impl<T> DequeuableBuffer<T> {
  pub fn new() -> Self { Self { first_idx: 0, queue: VecDeque::new() } }

  /// Index of the oldest retained element.
  #[inline]
  pub fn first_idx(&self) -> usize { self.first_idx }

  /// Index the next appended element will get.
  #[inline]
  pub fn last_idx(&self) -> usize { self.first_idx + self.queue.len() }

  #[inline]
  pub fn len(&self) -> usize { self.queue.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.queue.is_empty() }

  /// True up to and including the next index to be appended.
  #[inline]
  pub fn has_element_at(&self, idx: usize) -> bool { idx <= self.last_idx() }

  #[inline]
  pub fn append(&mut self, value: T) { self.queue.push_back(value); }

  pub fn get(&self, idx: usize) -> Result<&T, BufferError> {
    if idx < self.first_idx {
      return Err(BufferError::IndexTooOld { idx, first_idx: self.first_idx });
    }
    self
      .queue
      .get(idx - self.first_idx)
      .ok_or(BufferError::IndexNotYetAvailable { idx, last_idx: self.last_idx() })
  }

  /// Discard every element with an index lower or equal to `idx`.
  pub fn dequeue(&mut self, idx: usize) {
    while self.first_idx <= idx && self.queue.pop_front().is_some() {
      self.first_idx += 1;
    }
  }
}
