//! Hot multicast sources.
//!
//! A subject is both an [`Observer`] and an [`Observable`]: values pushed
//! into it are forwarded to every subscribed observer.
//!
//! - [`PublishSubject`] forwards without buffering and answers the producer
//!   with the combined acknowledgment of its observers.
//! - [`ControlledSubject`] buffers pushed values and releases them to each
//!   observer only as fast as that observer acknowledges.

mod controlled_subject;
mod publish_subject;
mod subscribers;

pub use controlled_subject::ControlledSubject;
pub use publish_subject::PublishSubject;

use crate::{observable::Observable, observer::Observer};

/// Anything that can sit between a source and several observers.
pub trait Subject<Item, Err>:
  Observer<Item, Err> + Observable<Item, Err> + Clone + Send + 'static
{
}

impl<Item, Err, T> Subject<Item, Err> for T where
  T: Observer<Item, Err> + Observable<Item, Err> + Clone + Send + 'static
{
}

/// How a subject terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Terminal<Err> {
  Completed,
  Error(Err),
}
